//! [`OcrEngine`] that shells out to the `tesseract` binary.
//!
//! Each page image is written to a temporary PNG and recognized with
//! `tesseract <image> stdout <config...>`. A missing binary maps to
//! [`BackendError::Unavailable`] so the acquisition pipeline can degrade
//! instead of failing.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{Command, Output};

use image::{DynamicImage, ImageFormat};

use pidscan_core::{BackendError, OcrEngine};

/// Environment variable overriding the tesseract binary location.
pub const TESSERACT_BIN_ENV: &str = "PIDSCAN_TESSERACT";

#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: PathBuf,
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new()
    }
}

impl TesseractCli {
    /// Use `$PIDSCAN_TESSERACT` if set, otherwise `tesseract` from `PATH`.
    pub fn new() -> Self {
        let binary = std::env::var_os(TESSERACT_BIN_ENV)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| OsString::from("tesseract"));
        Self::with_binary(binary)
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &std::path::Path {
        &self.binary
    }

    fn run(&self, args: &[OsString]) -> Result<Output, BackendError> {
        Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|e| self.spawn_error(e))
    }

    fn spawn_error(&self, e: io::Error) -> BackendError {
        match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => BackendError::Unavailable(
                format!("{} could not be started: {e}", self.binary.display()),
            ),
            _ => BackendError::OcrError(format!("failed to run {}: {e}", self.binary.display())),
        }
    }
}

/// Split a tesseract option string like `"--oem 3 --psm 6"` into arguments.
pub fn split_config_args(config: &str) -> Vec<OsString> {
    config.split_whitespace().map(OsString::from).collect()
}

impl OcrEngine for TesseractCli {
    fn check_available(&self) -> Result<(), BackendError> {
        let output = self.run(&[OsString::from("--version")])?;
        if !output.status.success() {
            return Err(BackendError::Unavailable(format!(
                "{} --version exited with {}",
                self.binary.display(),
                output.status
            )));
        }
        // Older releases print the version banner to stderr.
        let banner = if output.stdout.is_empty() {
            &output.stderr
        } else {
            &output.stdout
        };
        let version = String::from_utf8_lossy(banner);
        tracing::debug!(
            version = version.lines().next().unwrap_or("").trim(),
            "tesseract available"
        );
        Ok(())
    }

    fn recognize(&self, image: &DynamicImage, config: &str) -> Result<String, BackendError> {
        let temp_dir = tempfile::tempdir()?;
        let image_path = temp_dir.path().join("page.png");
        image
            .save_with_format(&image_path, ImageFormat::Png)
            .map_err(|e| BackendError::OcrError(format!("failed to write page image: {e}")))?;

        let mut args = vec![image_path.into_os_string(), OsString::from("stdout")];
        args.extend(split_config_args(config));

        let output = self.run(&args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::OcrError(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::debug!(chars = text.chars().count(), "tesseract output");
        Ok(text)
    }
}
