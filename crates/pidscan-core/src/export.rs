use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ScanError, ScanRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown export format '{}' (expected json or csv)", other)),
        }
    }
}

/// Write `record` to `path` in the given format.
pub fn export_record(
    record: &ScanRecord,
    format: ExportFormat,
    path: &Path,
) -> Result<(), ScanError> {
    let content = match format {
        ExportFormat::Json => export_json(record)?,
        ExportFormat::Csv => export_csv(record),
    };

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;
    tracing::info!(path = %path.display(), format = format.extension(), "exported scan record");
    Ok(())
}

/// The whole record as indented JSON.
pub fn export_json(record: &ScanRecord) -> Result<String, ScanError> {
    Ok(serde_json::to_string_pretty(record)?)
}

fn csv_escape(s: &str) -> String {
    if s.contains('"') || s.contains(',') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// One `category,item,pdf_source` row per extracted item.
pub fn export_csv(record: &ScanRecord) -> String {
    let source = record.source_path.display().to_string();
    let source = csv_escape(&source);
    let mut out = String::from("category,item,pdf_source\n");
    for (category, result) in &record.extraction_results {
        for item in &result.items {
            out.push_str(&format!("{},{},{}\n", category.key(), csv_escape(item), source));
        }
    }
    out
}
