use std::path::Path;
use std::sync::Arc;

use crate::TextSource;
use crate::backend::{OcrEngine, Rasterizer, TextLayerBackend};
use crate::config::OcrSettings;
use crate::preprocess::preprocess;

/// The text layer is trusted only when its combined, trimmed text is longer
/// than this many characters.
pub const TEXT_LAYER_MIN_CHARS: usize = 50;

/// Page texts produced by one acquisition run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquisition {
    /// Non-empty page texts in document order.
    pub pages: Vec<String>,
    pub source: TextSource,
    /// Stage degradations and skipped pages.
    pub warnings: Vec<String>,
}

impl Acquisition {
    /// All pages joined with single spaces.
    pub fn combined_text(&self) -> String {
        self.pages.join(" ")
    }
}

/// Characters in the space-joined pages after trimming.
fn trimmed_char_count(pages: &[String]) -> usize {
    pages.join(" ").trim().chars().count()
}

/// Whether text-layer output carries enough signal to skip OCR.
pub fn has_usable_text(pages: &[String]) -> bool {
    is_usable_count(trimmed_char_count(pages))
}

fn is_usable_count(chars: usize) -> bool {
    chars > TEXT_LAYER_MIN_CHARS
}

/// Two-stage text acquisition: embedded text layer first, rasterize + OCR
/// when the text layer is missing or too thin.
///
/// Backend failures never surface as errors. A failing stage contributes no
/// pages; a failing page is skipped.
#[derive(Clone)]
pub struct TextAcquirer {
    text_layer: Arc<dyn TextLayerBackend>,
    rasterizer: Arc<dyn Rasterizer>,
    ocr: Arc<dyn OcrEngine>,
}

impl TextAcquirer {
    pub fn new(
        text_layer: Arc<dyn TextLayerBackend>,
        rasterizer: Arc<dyn Rasterizer>,
        ocr: Arc<dyn OcrEngine>,
    ) -> Self {
        Self {
            text_layer,
            rasterizer,
            ocr,
        }
    }

    pub fn acquire(&self, path: &Path, settings: &OcrSettings) -> Acquisition {
        let mut warnings = Vec::new();

        let pages = self.read_text_layer(path, &mut warnings);
        let found = trimmed_char_count(&pages);
        if is_usable_count(found) {
            tracing::info!(
                path = %path.display(),
                pages = pages.len(),
                chars = found,
                "using embedded text layer"
            );
            return Acquisition {
                pages,
                source: TextSource::TextLayer,
                warnings,
            };
        }

        tracing::info!(
            path = %path.display(),
            chars = found,
            "text layer below threshold, falling back to OCR"
        );

        let pages = self.run_ocr(path, settings, &mut warnings);
        let source = if pages.is_empty() {
            tracing::warn!(path = %path.display(), "no text extracted by any method");
            TextSource::None
        } else {
            TextSource::Ocr
        };
        Acquisition {
            pages,
            source,
            warnings,
        }
    }

    fn read_text_layer(&self, path: &Path, warnings: &mut Vec<String>) -> Vec<String> {
        match self.text_layer.extract_pages(path) {
            Ok(pages) => {
                let pages: Vec<String> = pages.into_iter().filter(|p| !p.is_empty()).collect();
                for (i, page) in pages.iter().enumerate() {
                    tracing::debug!(page = i + 1, chars = page.chars().count(), "text layer page");
                }
                pages
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "text layer extraction failed");
                warnings.push(format!("text layer: {e}"));
                Vec::new()
            }
        }
    }

    fn run_ocr(
        &self,
        path: &Path,
        settings: &OcrSettings,
        warnings: &mut Vec<String>,
    ) -> Vec<String> {
        if let Err(e) = self.ocr.check_available() {
            tracing::warn!(error = %e, "OCR engine unavailable, skipping OCR");
            warnings.push(format!("ocr: {e}"));
            return Vec::new();
        }

        let document = match self.rasterizer.open(path) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "rasterizer failed");
                warnings.push(format!("rasterizer: {e}"));
                return Vec::new();
            }
        };
        let page_count = match document.page_count() {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "rasterizer failed");
                warnings.push(format!("rasterizer: {e}"));
                return Vec::new();
            }
        };

        let mut pages = Vec::new();
        for page in 0..page_count {
            let number = page + 1;
            tracing::debug!(page = number, dpi = settings.dpi, "rendering page for OCR");

            let image = match document.render_page(page, settings.dpi) {
                Ok(image) => image,
                Err(e) if e.is_unavailable() => {
                    tracing::warn!(error = %e, "rasterizer unavailable, stopping OCR");
                    warnings.push(format!("rasterizer: {e}"));
                    break;
                }
                Err(e) => {
                    tracing::warn!(page = number, error = %e, "page render failed, skipping");
                    warnings.push(format!("page {number}: {e}"));
                    continue;
                }
            };

            let image = preprocess(image, &settings.preprocessing);
            match self.ocr.recognize(&image, &settings.tesseract_config) {
                Ok(text) if text.trim().is_empty() => {
                    tracing::debug!(page = number, "OCR found no text");
                }
                Ok(text) => {
                    tracing::debug!(page = number, chars = text.chars().count(), "OCR page");
                    pages.push(text);
                }
                Err(e) if e.is_unavailable() => {
                    tracing::warn!(error = %e, "OCR engine unavailable, stopping OCR");
                    warnings.push(format!("ocr: {e}"));
                    break;
                }
                Err(e) => {
                    tracing::warn!(page = number, error = %e, "OCR failed, skipping page");
                    warnings.push(format!("page {number}: {e}"));
                }
            }
        }
        pages
    }
}
