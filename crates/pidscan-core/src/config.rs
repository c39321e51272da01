use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Category;
use crate::export::ExportFormat;
use crate::patterns::CompiledPatterns;

/// Highest rasterization resolution accepted in a config.
pub const MAX_DPI: u32 = 1200;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid pattern for {category}: '{pattern}': {message}")]
    InvalidPattern {
        category: Category,
        pattern: String,
        message: String,
    },
    #[error("dpi must be between 1 and {MAX_DPI}, got {0}")]
    InvalidDpi(u32),
}

/// Scanner configuration, in the shape of the on-disk JSON file.
///
/// Every key is required except `output_format`; a file missing one fails
/// to load rather than failing at scan time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub extraction_settings: ExtractionSettings,
    pub ocr_settings: OcrSettings,
    #[serde(default)]
    pub output_format: ExportFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySettings {
    pub enabled: bool,
    pub patterns: Vec<String>,
}

impl CategorySettings {
    fn enabled_with(patterns: &[&str]) -> Self {
        Self {
            enabled: true,
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSettings {
    pub equipment_tags: CategorySettings,
    pub valves: CategorySettings,
    pub instruments: CategorySettings,
    pub pipe_specifications: CategorySettings,
    pub pressure_ratings: CategorySettings,
    pub material_specifications: CategorySettings,
}

impl ExtractionSettings {
    pub fn get(&self, category: Category) -> &CategorySettings {
        match category {
            Category::EquipmentTags => &self.equipment_tags,
            Category::Valves => &self.valves,
            Category::Instruments => &self.instruments,
            Category::PipeSpecifications => &self.pipe_specifications,
            Category::PressureRatings => &self.pressure_ratings,
            Category::MaterialSpecifications => &self.material_specifications,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut CategorySettings {
        match category {
            Category::EquipmentTags => &mut self.equipment_tags,
            Category::Valves => &mut self.valves,
            Category::Instruments => &mut self.instruments,
            Category::PipeSpecifications => &mut self.pipe_specifications,
            Category::PressureRatings => &mut self.pressure_ratings,
            Category::MaterialSpecifications => &mut self.material_specifications,
        }
    }

    /// All six categories with their settings, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &CategorySettings)> + '_ {
        Category::all().iter().map(move |c| (*c, self.get(*c)))
    }
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            equipment_tags: CategorySettings::enabled_with(&[
                r"\b(?:P|C|E|V|T|K|R|D|F|TK|HX|AG|PK)-\d{3,4}[A-Z]?\b",
            ]),
            valves: CategorySettings::enabled_with(&[
                r"\b(?:HV|FV|PV|LV|TV|XV|SDV|BDV|MOV|FCV|PCV|LCV|TCV)-\d{3,4}[A-Z]?\b",
                r"\b(?:PSV|PRV|TSV)-\d{3,4}[A-Z]?\b",
            ]),
            instruments: CategorySettings::enabled_with(&[
                r"\b(?:F|P|T|L|A)(?:T|I|E|G|IC|IT|R|RC|S|SH|SL|AH|AL)-\d{3,4}[A-Z]?\b",
            ]),
            pipe_specifications: CategorySettings::enabled_with(&[
                r#"\b\d{1,2}(?:\.\d+)?"-[A-Z]{1,4}-\d{3,5}-[A-Z0-9]{2,8}\b"#,
                r"\b\d{1,2}(?:\.\d+)?-IN-[A-Z]{1,4}-\d{3,5}\b",
            ]),
            pressure_ratings: CategorySettings::enabled_with(&[
                r"\b(?:150|300|600|900|1500|2500)\s?(?:#|LB\b)",
                r"\bCLASS\s?(?:150|300|600|900|1500|2500)\b",
                r"\b\d+(?:\.\d+)?\s?(?:PSIG|PSIA|PSI|BARG|BAR|KPA|MPA)\b",
            ]),
            material_specifications: CategorySettings::enabled_with(&[
                r"\bASTM\s?A\d{2,4}(?:\s?GR\.?\s?[A-Z0-9]+)?\b",
                r"\b(?:SS|CS)\s?\d{3}L?\b",
                r"\b(?:316L?|304L?)\s?SS\b",
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrSettings {
    pub dpi: u32,
    pub preprocessing: Preprocessing,
    /// Extra arguments handed to the OCR engine, e.g. `--oem 3 --psm 6`.
    pub tesseract_config: String,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            dpi: 300,
            preprocessing: Preprocessing::default(),
            tesseract_config: "--oem 3 --psm 6".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preprocessing {
    pub denoise: bool,
    pub enhance_contrast: bool,
    pub sharpen: bool,
}

impl Default for Preprocessing {
    fn default() -> Self {
        Self {
            denoise: true,
            enhance_contrast: true,
            sharpen: false,
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            extraction_settings: ExtractionSettings::default(),
            ocr_settings: OcrSettings::default(),
            output_format: ExportFormat::Json,
        }
    }
}

impl ScannerConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Parse and validate a config from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: ScannerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the config as indented JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    /// Check value ranges and compile every pattern.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.compile().map(|_| ())
    }

    /// Validate and return the compiled patterns of the enabled categories.
    pub fn compile(&self) -> Result<CompiledPatterns, ConfigError> {
        let dpi = self.ocr_settings.dpi;
        if dpi == 0 || dpi > MAX_DPI {
            return Err(ConfigError::InvalidDpi(dpi));
        }
        CompiledPatterns::compile(&self.extraction_settings)
    }

    /// Return a copy of this config with `update` applied.
    ///
    /// Categories present in the update replace the whole category entry;
    /// absent categories are kept. `ocr_settings` and `output_format` are
    /// replaced as a unit when present.
    pub fn with_update(&self, update: ConfigUpdate) -> ScannerConfig {
        let mut next = self.clone();
        if let Some(extraction) = update.extraction_settings {
            for (category, settings) in extraction.into_entries() {
                *next.extraction_settings.get_mut(category) = settings;
            }
        }
        if let Some(ocr) = update.ocr_settings {
            next.ocr_settings = ocr;
        }
        if let Some(format) = update.output_format {
            next.output_format = format;
        }
        next
    }
}

/// A partial config. `None` fields leave the current value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigUpdate {
    pub extraction_settings: Option<ExtractionUpdate>,
    pub ocr_settings: Option<OcrSettings>,
    pub output_format: Option<ExportFormat>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionUpdate {
    pub equipment_tags: Option<CategorySettings>,
    pub valves: Option<CategorySettings>,
    pub instruments: Option<CategorySettings>,
    pub pipe_specifications: Option<CategorySettings>,
    pub pressure_ratings: Option<CategorySettings>,
    pub material_specifications: Option<CategorySettings>,
}

impl ExtractionUpdate {
    /// Set the replacement entry for one category.
    pub fn set(&mut self, category: Category, settings: CategorySettings) {
        let slot = match category {
            Category::EquipmentTags => &mut self.equipment_tags,
            Category::Valves => &mut self.valves,
            Category::Instruments => &mut self.instruments,
            Category::PipeSpecifications => &mut self.pipe_specifications,
            Category::PressureRatings => &mut self.pressure_ratings,
            Category::MaterialSpecifications => &mut self.material_specifications,
        };
        *slot = Some(settings);
    }

    fn into_entries(self) -> Vec<(Category, CategorySettings)> {
        [
            (Category::EquipmentTags, self.equipment_tags),
            (Category::Valves, self.valves),
            (Category::Instruments, self.instruments),
            (Category::PipeSpecifications, self.pipe_specifications),
            (Category::PressureRatings, self.pressure_ratings),
            (Category::MaterialSpecifications, self.material_specifications),
        ]
        .into_iter()
        .filter_map(|(cat, s)| s.map(|s| (cat, s)))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trip_json() {
        let config = ScannerConfig::default();
        let json = config.to_json_pretty().unwrap();
        let parsed = ScannerConfig::from_json_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn default_patterns_all_compile() {
        let compiled = ScannerConfig::default().compile().unwrap();
        assert_eq!(compiled.categories().count(), Category::all().len());
    }

    #[test]
    fn default_patterns_find_typical_tags() {
        let compiled = ScannerConfig::default().compile().unwrap();
        let text = "P-101 FEED PUMP HV-202 PSV-1001 FT-301 6\"-PG-10023-A1B \
                    CLASS 300 150 PSIG ASTM A106 SS316L";
        let found = compiled.extract_all(text);
        assert!(found[&Category::EquipmentTags].contains("P-101"));
        assert!(found[&Category::Valves].contains("HV-202"));
        assert!(found[&Category::Valves].contains("PSV-1001"));
        assert!(found[&Category::Instruments].contains("FT-301"));
        assert!(found[&Category::PipeSpecifications].contains("6\"-PG-10023-A1B"));
        assert!(found[&Category::PressureRatings].contains("CLASS 300"));
        assert!(found[&Category::PressureRatings].contains("150 PSIG"));
        assert!(found[&Category::MaterialSpecifications].contains("ASTM A106"));
        assert!(found[&Category::MaterialSpecifications].contains("SS316L"));
    }

    #[test]
    fn missing_category_rejected_at_load() {
        let mut value = serde_json::to_value(ScannerConfig::default()).unwrap();
        value["extraction_settings"]
            .as_object_mut()
            .unwrap()
            .remove("valves");
        let err = ScannerConfig::from_json_str(&value.to_string()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("valves"));
    }

    #[test]
    fn missing_output_format_defaults_to_json() {
        let mut value = serde_json::to_value(ScannerConfig::default()).unwrap();
        value.as_object_mut().unwrap().remove("output_format");
        let parsed = ScannerConfig::from_json_str(&value.to_string()).unwrap();
        assert_eq!(parsed.output_format, ExportFormat::Json);
    }

    #[test]
    fn invalid_regex_rejected_at_load() {
        let mut config = ScannerConfig::default();
        config.extraction_settings.valves.patterns = vec!["HV-(".to_string()];
        let json = serde_json::to_string(&config).unwrap();
        let err = ScannerConfig::from_json_str(&json).unwrap_err();
        match err {
            ConfigError::InvalidPattern {
                category, pattern, ..
            } => {
                assert_eq!(category, Category::Valves);
                assert_eq!(pattern, "HV-(");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_regex_in_disabled_category_still_rejected() {
        let mut config = ScannerConfig::default();
        config.extraction_settings.instruments.enabled = false;
        config.extraction_settings.instruments.patterns = vec!["[".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn dpi_out_of_range_rejected() {
        let mut config = ScannerConfig::default();
        config.ocr_settings.dpi = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidDpi(0))));
        config.ocr_settings.dpi = MAX_DPI + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn blank_patterns_are_ignored() {
        let mut config = ScannerConfig::default();
        config.extraction_settings.valves.patterns =
            vec![r"HV-\d{3}".to_string(), String::new(), "  ".to_string()];
        let compiled = config.compile().unwrap();
        let found = compiled.extract_all("HV-202");
        assert_eq!(found[&Category::Valves].len(), 1);
    }

    #[test]
    fn disabled_categories_are_not_compiled() {
        let mut config = ScannerConfig::default();
        config.extraction_settings.pressure_ratings.enabled = false;
        let compiled = config.compile().unwrap();
        assert!(!compiled.categories().any(|c| c == Category::PressureRatings));
    }

    #[test]
    fn update_replaces_only_named_categories() {
        let base = ScannerConfig::default();
        let mut extraction = ExtractionUpdate::default();
        extraction.set(
            Category::Valves,
            CategorySettings {
                enabled: false,
                patterns: vec![],
            },
        );
        let next = base.with_update(ConfigUpdate {
            extraction_settings: Some(extraction),
            ..Default::default()
        });
        assert!(!next.extraction_settings.valves.enabled);
        assert!(next.extraction_settings.valves.patterns.is_empty());
        assert_eq!(
            next.extraction_settings.equipment_tags,
            base.extraction_settings.equipment_tags
        );
        assert_eq!(next.ocr_settings, base.ocr_settings);
    }

    #[test]
    fn update_replaces_ocr_settings_as_a_unit() {
        let base = ScannerConfig::default();
        let ocr = OcrSettings {
            dpi: 150,
            preprocessing: Preprocessing {
                denoise: false,
                enhance_contrast: false,
                sharpen: true,
            },
            tesseract_config: String::new(),
        };
        let next = base.with_update(ConfigUpdate {
            ocr_settings: Some(ocr.clone()),
            output_format: Some(ExportFormat::Csv),
            ..Default::default()
        });
        assert_eq!(next.ocr_settings, ocr);
        assert_eq!(next.output_format, ExportFormat::Csv);
        assert_eq!(next.extraction_settings, base.extraction_settings);
    }

    #[test]
    fn partial_update_deserializes_from_json() {
        let json =
            r#"{"extraction_settings": {"valves": {"enabled": true, "patterns": ["XV-\\d+"]}}}"#;
        let update: ConfigUpdate = serde_json::from_str(json).unwrap();
        let next = ScannerConfig::default().with_update(update);
        assert_eq!(next.extraction_settings.valves.patterns, vec![r"XV-\d+"]);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = ScannerConfig::default();
        config.ocr_settings.dpi = 200;
        config.save(&path).unwrap();
        let loaded = ScannerConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
