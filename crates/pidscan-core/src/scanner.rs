use std::collections::BTreeMap;
use std::path::Path;

use crate::acquire::TextAcquirer;
use crate::config::{ConfigError, ConfigUpdate, ScannerConfig};
use crate::export::{ExportFormat, export_record};
use crate::patterns::{CompiledPatterns, compile_pattern};
use crate::{Category, ExtractionResult, ScanError, ScanRecord, text_preview};

/// Scans P&ID PDFs and keeps the record of the most recent scan.
///
/// Owns its configuration. Config changes apply to the next [`scan`](Self::scan)
/// and never touch a record that was already produced.
pub struct PidScanner {
    config: ScannerConfig,
    patterns: CompiledPatterns,
    acquirer: TextAcquirer,
    last: Option<ScanRecord>,
}

impl PidScanner {
    /// Create a scanner, validating `config` up front.
    pub fn new(config: ScannerConfig, acquirer: TextAcquirer) -> Result<Self, ConfigError> {
        let patterns = config.compile()?;
        Ok(Self {
            config,
            patterns,
            acquirer,
            last: None,
        })
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// The record of the last scan, if any.
    pub fn last_record(&self) -> Option<&ScanRecord> {
        self.last.as_ref()
    }

    /// Scan a PDF and replace the stored record.
    ///
    /// Fails only when `path` does not exist. Extraction problems degrade to
    /// an empty (but well-formed) record.
    pub fn scan(&mut self, path: &Path) -> Result<&ScanRecord, ScanError> {
        if !path.exists() {
            return Err(ScanError::NotFound(path.to_path_buf()));
        }

        tracing::info!(path = %path.display(), "scanning");
        let acquisition = self.acquirer.acquire(path, &self.config.ocr_settings);
        let combined = acquisition.combined_text();

        let extraction_results: BTreeMap<Category, ExtractionResult> = self
            .patterns
            .extract_all(&combined)
            .into_iter()
            .map(|(cat, items)| (cat, ExtractionResult::from_items(items)))
            .collect();

        for (cat, result) in &extraction_results {
            tracing::debug!(category = cat.key(), count = result.count, "extracted");
        }

        let record = ScanRecord {
            source_path: path.to_path_buf(),
            extraction_results,
            total_pages: acquisition.pages.len(),
            text_preview: text_preview(&combined),
            text_source: acquisition.source,
            warnings: acquisition.warnings,
        };
        tracing::info!(
            path = %path.display(),
            pages = record.total_pages,
            items = record.total_items(),
            "scan complete"
        );

        Ok(&*self.last.insert(record))
    }

    /// `{category -> count}` of the last scan; empty before any scan.
    pub fn summary(&self) -> BTreeMap<Category, usize> {
        self.last.as_ref().map(|r| r.summary()).unwrap_or_default()
    }

    /// Results of the last scan, restricted to `category` (when given) and to
    /// categories with at least `min_count` items. Empty before any scan.
    pub fn filter(
        &self,
        category: Option<Category>,
        min_count: usize,
    ) -> BTreeMap<Category, ExtractionResult> {
        let Some(record) = &self.last else {
            return BTreeMap::new();
        };
        record
            .extraction_results
            .iter()
            .filter(|(cat, _)| category.is_none_or(|wanted| **cat == wanted))
            .filter(|(_, result)| result.count >= min_count)
            .map(|(cat, result)| (*cat, result.clone()))
            .collect()
    }

    /// Export the last record. Fails if nothing has been scanned yet.
    pub fn export(&self, format: ExportFormat, path: &Path) -> Result<(), ScanError> {
        let record = self
            .last
            .as_ref()
            .ok_or(ScanError::Precondition("no data to export, run a scan first"))?;
        export_record(record, format, path)
    }

    pub fn export_csv(&self, path: &Path) -> Result<(), ScanError> {
        self.export(ExportFormat::Csv, path)
    }

    pub fn export_json(&self, path: &Path) -> Result<(), ScanError> {
        self.export(ExportFormat::Json, path)
    }

    /// Apply a partial update. An invalid result is rejected and the current
    /// configuration is kept.
    pub fn update_config(&mut self, update: ConfigUpdate) -> Result<(), ConfigError> {
        let next = self.config.with_update(update);
        self.replace_config(next)
    }

    /// Swap in a whole new configuration.
    pub fn replace_config(&mut self, config: ScannerConfig) -> Result<(), ConfigError> {
        let patterns = config.compile()?;
        self.config = config;
        self.patterns = patterns;
        Ok(())
    }

    /// Append a pattern to a category. The category's enabled flag is left as
    /// it is.
    pub fn add_custom_pattern(
        &mut self,
        category: Category,
        pattern: &str,
    ) -> Result<(), ConfigError> {
        compile_pattern(pattern).map_err(|e| ConfigError::InvalidPattern {
            category,
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        let mut next = self.config.clone();
        next.extraction_settings
            .get_mut(category)
            .patterns
            .push(pattern.to_string());
        self.replace_config(next)
    }
}
