use std::path::Path;

use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend itself is missing or misconfigured (binary not on PATH,
    /// library failed to initialize). The whole stage is skipped.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to render page: {0}")]
    RenderError(String),
    #[error("OCR failed: {0}")]
    OcrError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    /// Whether this error means no further calls to the backend can succeed.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, BackendError::Unavailable(_))
    }
}

/// Reads the embedded text layer of a PDF.
pub trait TextLayerBackend: Send + Sync {
    /// Extract the text of every page, in page order. Pages without a text
    /// layer come back as empty strings.
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, BackendError>;
}

/// Renders PDF pages to images.
pub trait Rasterizer: Send + Sync {
    /// Open a document once for a whole OCR pass.
    fn open<'a>(&'a self, path: &Path) -> Result<Box<dyn RasterDocument + 'a>, BackendError>;
}

/// A document opened by a [`Rasterizer`].
pub trait RasterDocument {
    /// Number of pages in the document.
    fn page_count(&self) -> Result<usize, BackendError>;

    /// Render one page (0-based) at the given resolution.
    fn render_page(&self, page: usize, dpi: u32) -> Result<DynamicImage, BackendError>;
}

/// Recognizes text in a page image.
pub trait OcrEngine: Send + Sync {
    /// Cheap probe run once before a document's pages are rasterized, so a
    /// missing engine doesn't cost a render per page.
    fn check_available(&self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Run recognition. `config` is the engine-specific argument string from
    /// the OCR settings.
    fn recognize(&self, image: &DynamicImage, config: &str) -> Result<String, BackendError>;
}
