use std::path::Path;

use image::{DynamicImage, Rgb, RgbImage};
use mupdf::{Colorspace, Document, Matrix, TextPageFlags};

use pidscan_core::{BackendError, RasterDocument, Rasterizer, TextLayerBackend};

/// PDF user space is 72 units per inch.
const PDF_POINTS_PER_INCH: f32 = 72.0;

/// MuPDF-based implementation of [`TextLayerBackend`] and [`Rasterizer`].
///
/// This crate is the sole AGPL island. It isolates the mupdf dependency
/// (which is AGPL-3.0) so the pipeline crate does not transitively depend
/// on it.
#[derive(Debug, Clone, Default)]
pub struct MupdfBackend;

impl MupdfBackend {
    pub fn new() -> Self {
        Self
    }
}

fn open(path: &Path) -> Result<Document, BackendError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| BackendError::OpenError("invalid path encoding".into()))?;
    Document::open(path_str).map_err(|e| BackendError::OpenError(e.to_string()))
}

impl TextLayerBackend for MupdfBackend {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, BackendError> {
        let document = open(path)?;

        let mut pages_text = Vec::new();
        for (index, page_result) in document
            .pages()
            .map_err(|e| BackendError::OpenError(e.to_string()))?
            .enumerate()
        {
            // A broken page still occupies its slot so later pages keep their order.
            let page = match page_result {
                Ok(page) => page,
                Err(e) => {
                    tracing::debug!(page = index + 1, error = %e, "failed to load page");
                    pages_text.push(String::new());
                    continue;
                }
            };
            let text_page = match page.to_text_page(TextPageFlags::empty()) {
                Ok(tp) => tp,
                Err(e) => {
                    tracing::debug!(page = index + 1, error = %e, "no text page");
                    pages_text.push(String::new());
                    continue;
                }
            };

            let mut page_text = String::new();
            for block in text_page.blocks() {
                for line in block.lines() {
                    let line_text: String = line
                        .chars()
                        .map(|c| c.char().unwrap_or('\u{FFFD}'))
                        .collect();
                    page_text.push_str(&line_text);
                    page_text.push('\n');
                }
            }
            pages_text.push(page_text);
        }

        Ok(pages_text)
    }
}

impl Rasterizer for MupdfBackend {
    fn open<'a>(&'a self, path: &Path) -> Result<Box<dyn RasterDocument + 'a>, BackendError> {
        Ok(Box::new(MupdfDocument {
            document: open(path)?,
        }))
    }
}

/// A document kept open across every page of one OCR pass.
struct MupdfDocument {
    document: Document,
}

impl RasterDocument for MupdfDocument {
    fn page_count(&self) -> Result<usize, BackendError> {
        let count = self
            .document
            .page_count()
            .map_err(|e| BackendError::OpenError(e.to_string()))?;
        Ok(count.max(0) as usize)
    }

    fn render_page(&self, page: usize, dpi: u32) -> Result<DynamicImage, BackendError> {
        let index = i32::try_from(page)
            .map_err(|_| BackendError::RenderError(format!("page index {page} out of range")))?;
        let page = self
            .document
            .load_page(index)
            .map_err(|e| BackendError::RenderError(e.to_string()))?;

        let scale = dpi as f32 / PDF_POINTS_PER_INCH;
        let pixmap = page
            .to_pixmap(
                &Matrix::new_scale(scale, scale),
                &Colorspace::device_rgb(),
                false,
                true,
            )
            .map_err(|e| BackendError::RenderError(e.to_string()))?;

        let width = pixmap.width() as u32;
        let height = pixmap.height() as u32;
        let components = pixmap.n() as usize;
        let samples = pixmap.samples();
        if width == 0 || height == 0 || components < 3 {
            return Err(BackendError::RenderError(format!(
                "unexpected pixmap {width}x{height} with {components} components"
            )));
        }
        let stride = samples.len() / height as usize;
        if stride < width as usize * components {
            return Err(BackendError::RenderError("truncated pixmap samples".into()));
        }

        let image = RgbImage::from_fn(width, height, |x, y| {
            let i = y as usize * stride + x as usize * components;
            Rgb([samples[i], samples[i + 1], samples[i + 2]])
        });
        tracing::debug!(page = index + 1, dpi, width, height, "rendered page");
        Ok(DynamicImage::ImageRgb8(image))
    }
}
