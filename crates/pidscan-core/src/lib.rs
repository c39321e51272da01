use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod acquire;
pub mod backend;
pub mod config;
pub mod export;
pub mod mock;
pub mod patterns;
pub mod preprocess;
pub mod scanner;

// Re-export for convenience
pub use acquire::{Acquisition, TEXT_LAYER_MIN_CHARS, TextAcquirer};
pub use backend::{BackendError, OcrEngine, RasterDocument, Rasterizer, TextLayerBackend};
pub use config::{
    CategorySettings, ConfigError, ConfigUpdate, ExtractionSettings, ExtractionUpdate, OcrSettings,
    Preprocessing, ScannerConfig,
};
pub use export::ExportFormat;
pub use patterns::{CompiledPatterns, extract_patterns};
pub use scanner::PidScanner;

/// Number of characters of combined text kept in [`ScanRecord::text_preview`].
pub const PREVIEW_CHARS: usize = 500;

/// One of the six extraction groups a P&ID scan reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    EquipmentTags,
    Valves,
    Instruments,
    PipeSpecifications,
    PressureRatings,
    MaterialSpecifications,
}

impl Category {
    pub fn all() -> &'static [Category] {
        &[
            Category::EquipmentTags,
            Category::Valves,
            Category::Instruments,
            Category::PipeSpecifications,
            Category::PressureRatings,
            Category::MaterialSpecifications,
        ]
    }

    /// Config/JSON key for this category.
    pub fn key(self) -> &'static str {
        match self {
            Self::EquipmentTags => "equipment_tags",
            Self::Valves => "valves",
            Self::Instruments => "instruments",
            Self::PipeSpecifications => "pipe_specifications",
            Self::PressureRatings => "pressure_ratings",
            Self::MaterialSpecifications => "material_specifications",
        }
    }

    /// Human-readable label for display.
    pub fn label(self) -> &'static str {
        match self {
            Self::EquipmentTags => "Equipment Tags",
            Self::Valves => "Valves",
            Self::Instruments => "Instruments",
            Self::PipeSpecifications => "Pipe Specifications",
            Self::PressureRatings => "Pressure Ratings",
            Self::MaterialSpecifications => "Material Specifications",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace(['-', ' '], "_");
        Category::all()
            .iter()
            .copied()
            .find(|c| c.key() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Category::all().iter().map(|c| c.key()).collect();
                format!("unknown category '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

/// Matches found for one category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub count: usize,
    pub items: BTreeSet<String>,
}

impl ExtractionResult {
    pub fn from_items(items: BTreeSet<String>) -> Self {
        Self {
            count: items.len(),
            items,
        }
    }
}

/// Which acquisition stage produced the scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    /// Embedded PDF text layer.
    TextLayer,
    /// Rasterized pages run through OCR.
    Ocr,
    /// Neither stage produced any text.
    None,
}

/// The output of one scan. Replaced wholesale by the next scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub source_path: PathBuf,
    pub extraction_results: BTreeMap<Category, ExtractionResult>,
    /// Number of pages that yielded text.
    pub total_pages: usize,
    pub text_preview: String,
    pub text_source: TextSource,
    /// Degraded stages and skipped pages, in the order they happened.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ScanRecord {
    /// `{category -> count}` for every category in this record.
    pub fn summary(&self) -> BTreeMap<Category, usize> {
        self.extraction_results
            .iter()
            .map(|(cat, result)| (*cat, result.count))
            .collect()
    }

    /// Total number of items across all categories.
    pub fn total_items(&self) -> usize {
        self.extraction_results.values().map(|r| r.count).sum()
    }
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("PDF file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("{0}")]
    Precondition(&'static str),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Build the preview string: the first [`PREVIEW_CHARS`] characters, with a
/// trailing `...` when the text was cut.
pub fn text_preview(combined: &str) -> String {
    match combined.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &combined[..cut]),
        None => combined.to_string(),
    }
}
