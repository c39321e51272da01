use std::collections::BTreeMap;
use std::io::Write;

use owo_colors::OwoColorize;
use pidscan_core::{Category, ExtractionResult, ScanRecord, TextSource};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn source_label(source: TextSource) -> &'static str {
    match source {
        TextSource::TextLayer => "embedded text layer",
        TextSource::Ocr => "OCR",
        TextSource::None => "no text found",
    }
}

/// Print the one-line scan header and any degradation warnings.
pub fn print_scan_header(
    w: &mut dyn Write,
    file_name: &str,
    record: &ScanRecord,
    color: ColorMode,
) -> std::io::Result<()> {
    let source = source_label(record.text_source);
    if color.enabled() {
        writeln!(
            w,
            "{} {} ({} pages, {})",
            "Scanned".bold(),
            file_name.bold(),
            record.total_pages,
            source.dimmed()
        )?;
    } else {
        writeln!(
            w,
            "Scanned {} ({} pages, {})",
            file_name, record.total_pages, source
        )?;
    }

    for warning in &record.warnings {
        if color.enabled() {
            writeln!(w, "{} {}", "WARNING:".yellow(), warning)?;
        } else {
            writeln!(w, "WARNING: {}", warning)?;
        }
    }
    writeln!(w)?;
    Ok(())
}

/// Print the per-category counts.
pub fn print_summary(
    w: &mut dyn Write,
    summary: &BTreeMap<Category, usize>,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{}", "Summary".bold().cyan())?;
    } else {
        writeln!(w, "Summary")?;
    }

    let width = summary
        .keys()
        .map(|c| c.label().len())
        .max()
        .unwrap_or(0);
    for (category, count) in summary {
        let label = format!("{:<width$}", category.label());
        if color.enabled() && *count > 0 {
            writeln!(w, "  {}  {}", label, count.green())?;
        } else if color.enabled() {
            writeln!(w, "  {}  {}", label, count.dimmed())?;
        } else {
            writeln!(w, "  {}  {}", label, count)?;
        }
    }

    let total: usize = summary.values().sum();
    if color.enabled() {
        writeln!(w, "  {} {}", "Total:".bold(), total.bold())?;
    } else {
        writeln!(w, "  Total: {}", total)?;
    }
    writeln!(w)?;
    Ok(())
}

/// Print the items of each category, sorted.
pub fn print_items(
    w: &mut dyn Write,
    results: &BTreeMap<Category, ExtractionResult>,
    color: ColorMode,
) -> std::io::Result<()> {
    if results.is_empty() {
        writeln!(w, "No categories match the filter.")?;
        return Ok(());
    }

    for (category, result) in results {
        if color.enabled() {
            writeln!(
                w,
                "{} {}",
                category.label().bold(),
                format!("({})", result.count).dimmed()
            )?;
        } else {
            writeln!(w, "{} ({})", category.label(), result.count)?;
        }
        for item in &result.items {
            writeln!(w, "  - {}", item)?;
        }
        writeln!(w)?;
    }
    Ok(())
}

pub fn print_preview(w: &mut dyn Write, preview: &str, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{}", "Text preview".bold().cyan())?;
    } else {
        writeln!(w, "Text preview")?;
    }
    if preview.trim().is_empty() {
        writeln!(w, "  (empty)")?;
    } else {
        writeln!(w, "{}", preview)?;
    }
    writeln!(w)?;
    Ok(())
}
