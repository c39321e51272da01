use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use pidscan_core::{
    Category, ConfigUpdate, ExportFormat, OcrSettings, PidScanner, ScannerConfig, TextAcquirer,
};
use pidscan_pdf_mupdf::MupdfBackend;
use pidscan_tesseract::TesseractCli;

mod config_file;
mod output;

use output::ColorMode;

/// P&ID Scanner - Extract equipment tags, valves, instruments and line specs from P&ID PDFs
#[derive(Parser, Debug)]
#[command(name = "pidscan", version, about, long_about = None)]
struct Cli {
    /// Log pipeline details to stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a P&ID PDF and report what was found
    Scan {
        /// Path to the PDF drawing
        pdf: PathBuf,

        /// Config file (default: $PIDSCAN_CONFIG, ./pidscan.json, then the platform config dir)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Export the scan record as JSON
        #[arg(long, value_name = "OUT")]
        json: Option<PathBuf>,

        /// Export the scan record as CSV
        #[arg(long, value_name = "OUT")]
        csv: Option<PathBuf>,

        /// Export in the config's output_format
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,

        /// Only list items of this category
        #[arg(long)]
        category: Option<Category>,

        /// Only list categories with at least this many items
        #[arg(long, default_value_t = 1)]
        min_count: usize,

        /// Override the OCR rendering resolution
        #[arg(long)]
        dpi: Option<u32>,

        /// Extra pattern for a category, as CATEGORY=REGEX (repeatable)
        #[arg(long = "pattern", value_name = "CATEGORY=REGEX", value_parser = parse_custom_pattern)]
        patterns: Vec<CustomPattern>,

        /// Print the first characters of the extracted text
        #[arg(long)]
        show_preview: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Write the built-in configuration as JSON
    DefaultConfig {
        /// Destination file (stdout when omitted)
        path: Option<PathBuf>,
    },
}

/// A `--pattern CATEGORY=REGEX` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CustomPattern {
    category: Category,
    pattern: String,
}

fn parse_custom_pattern(s: &str) -> Result<CustomPattern, String> {
    let (category, pattern) = s
        .split_once('=')
        .ok_or_else(|| format!("expected CATEGORY=REGEX, got '{}'", s))?;
    let category = category.parse::<Category>()?;
    if pattern.trim().is_empty() {
        return Err(format!("empty pattern for {}", category));
    }
    Ok(CustomPattern {
        category,
        pattern: pattern.to_string(),
    })
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::DefaultConfig { path } => default_config(path.as_deref()),
        Command::Scan {
            pdf,
            config,
            json,
            csv,
            output,
            category,
            min_count,
            dpi,
            patterns,
            show_preview,
            no_color,
        } => scan(ScanArgs {
            pdf,
            config,
            json,
            csv,
            output,
            category,
            min_count,
            dpi,
            patterns,
            show_preview,
            no_color,
        }),
    }
}

struct ScanArgs {
    pdf: PathBuf,
    config: Option<PathBuf>,
    json: Option<PathBuf>,
    csv: Option<PathBuf>,
    output: Option<PathBuf>,
    category: Option<Category>,
    min_count: usize,
    dpi: Option<u32>,
    patterns: Vec<CustomPattern>,
    show_preview: bool,
    no_color: bool,
}

fn build_scanner(config: ScannerConfig) -> anyhow::Result<PidScanner> {
    let mupdf = Arc::new(MupdfBackend::new());
    let acquirer = TextAcquirer::new(mupdf.clone(), mupdf, Arc::new(TesseractCli::new()));
    PidScanner::new(config, acquirer).context("invalid configuration")
}

fn scan(args: ScanArgs) -> anyhow::Result<()> {
    let config = config_file::load_config(args.config)?;
    let mut scanner = build_scanner(config)?;

    if let Some(dpi) = args.dpi {
        let ocr_settings = OcrSettings {
            dpi,
            ..scanner.config().ocr_settings.clone()
        };
        scanner
            .update_config(ConfigUpdate {
                ocr_settings: Some(ocr_settings),
                ..ConfigUpdate::default()
            })
            .context("invalid --dpi")?;
    }
    for custom in &args.patterns {
        scanner
            .add_custom_pattern(custom.category, &custom.pattern)
            .with_context(|| format!("invalid --pattern for {}", custom.category))?;
    }

    let color = ColorMode(!args.no_color);
    let file_name = args
        .pdf
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| args.pdf.display().to_string());

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")?);
    spinner.set_message(format!("Scanning {}...", file_name));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let scanned = scanner.scan(&args.pdf).map(|_| ());
    spinner.finish_and_clear();
    scanned?;

    let mut writer = std::io::stdout().lock();
    if let Some(record) = scanner.last_record() {
        output::print_scan_header(&mut writer, &file_name, record, color)?;
        if args.show_preview {
            output::print_preview(&mut writer, &record.text_preview, color)?;
        }
    }
    output::print_summary(&mut writer, &scanner.summary(), color)?;
    output::print_items(
        &mut writer,
        &scanner.filter(args.category, args.min_count),
        color,
    )?;

    let mut exports: Vec<(ExportFormat, PathBuf)> = Vec::new();
    if let Some(path) = args.json {
        exports.push((ExportFormat::Json, path));
    }
    if let Some(path) = args.csv {
        exports.push((ExportFormat::Csv, path));
    }
    if let Some(path) = args.output {
        exports.push((scanner.config().output_format, path));
    }
    for (format, path) in exports {
        scanner
            .export(format, &path)
            .with_context(|| format!("failed to export to {}", path.display()))?;
        writeln!(
            writer,
            "Exported {} to {}",
            format.extension().to_uppercase(),
            path.display()
        )?;
    }

    Ok(())
}

fn default_config(path: Option<&Path>) -> anyhow::Result<()> {
    let config = ScannerConfig::default();
    match path {
        Some(path) => {
            config
                .save(path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Wrote default config to {}", path.display());
        }
        None => {
            let json = config.to_json_pretty()?;
            println!("{}", json);
        }
    }
    Ok(())
}
