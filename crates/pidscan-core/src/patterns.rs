use std::collections::{BTreeMap, BTreeSet};

use regex::{Regex, RegexBuilder};

use crate::Category;
use crate::config::{ConfigError, ExtractionSettings};

/// Compile one pattern the way every category pattern is matched:
/// case-insensitive.
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Collect the deduplicated union of all matches of `patterns` in `text`.
///
/// A pattern with exactly one capture group contributes that group's text;
/// any other pattern contributes the whole match. Empty matches are dropped.
pub fn extract_patterns(text: &str, patterns: &[Regex]) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    if text.is_empty() {
        return found;
    }

    for re in patterns {
        // captures_len() counts the implicit whole-match group
        let single_group = re.captures_len() == 2;
        for caps in re.captures_iter(text) {
            let m = if single_group {
                caps.get(1)
            } else {
                caps.get(0)
            };
            if let Some(m) = m {
                if !m.as_str().is_empty() {
                    found.insert(m.as_str().to_string());
                }
            }
        }
    }
    found
}

/// Patterns of every enabled category, compiled once per configuration.
#[derive(Debug, Clone, Default)]
pub struct CompiledPatterns {
    categories: BTreeMap<Category, Vec<Regex>>,
}

impl CompiledPatterns {
    /// Compile the enabled categories of `settings`. Blank pattern strings are
    /// skipped.
    pub fn compile(settings: &ExtractionSettings) -> Result<Self, ConfigError> {
        let mut categories = BTreeMap::new();
        for (category, cat_settings) in settings.iter() {
            // Disabled categories are still validated so a later enable can't fail.
            let mut compiled = Vec::with_capacity(cat_settings.patterns.len());
            for pattern in &cat_settings.patterns {
                if pattern.trim().is_empty() {
                    continue;
                }
                let re = compile_pattern(pattern).map_err(|e| ConfigError::InvalidPattern {
                    category,
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })?;
                compiled.push(re);
            }
            if cat_settings.enabled {
                categories.insert(category, compiled);
            }
        }
        Ok(Self { categories })
    }

    /// Enabled categories, in declaration order.
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.categories.keys().copied()
    }

    /// Run every enabled category over `text`.
    pub fn extract_all(&self, text: &str) -> BTreeMap<Category, BTreeSet<String>> {
        self.categories
            .iter()
            .map(|(cat, patterns)| (*cat, extract_patterns(text, patterns)))
            .collect()
    }
}
