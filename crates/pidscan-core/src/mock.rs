//! In-memory backends for tests.
//!
//! Each mock counts its calls so tests can assert which acquisition stages
//! actually ran.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{DynamicImage, Rgb, RgbImage};

use crate::backend::{BackendError, OcrEngine, RasterDocument, Rasterizer, TextLayerBackend};

/// A text layer returning fixed pages, or a fixed error.
pub struct MockTextLayer {
    pages: Result<Vec<String>, String>,
    calls: AtomicUsize,
}

impl MockTextLayer {
    pub fn pages(pages: &[&str]) -> Self {
        Self {
            pages: Ok(pages.iter().map(|p| p.to_string()).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A document with no embedded text at all.
    pub fn empty() -> Self {
        Self::pages(&[])
    }

    pub fn failing(message: &str) -> Self {
        Self {
            pages: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextLayerBackend for MockTextLayer {
    fn extract_pages(&self, _path: &Path) -> Result<Vec<String>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages
            .clone()
            .map_err(BackendError::OpenError)
    }
}

/// A rasterizer producing small blank pages.
pub struct MockRasterizer {
    page_count: usize,
    unavailable: bool,
    failing_pages: Vec<usize>,
    open_calls: AtomicUsize,
    page_count_calls: AtomicUsize,
    render_calls: AtomicUsize,
    last_dpi: Mutex<Option<u32>>,
}

impl MockRasterizer {
    pub fn new(page_count: usize) -> Self {
        Self {
            page_count,
            unavailable: false,
            failing_pages: Vec::new(),
            open_calls: AtomicUsize::new(0),
            page_count_calls: AtomicUsize::new(0),
            render_calls: AtomicUsize::new(0),
            last_dpi: Mutex::new(None),
        }
    }

    /// A rasterizer whose backend is missing.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::new(0)
        }
    }

    /// Make rendering of the given 0-based page fail.
    pub fn with_failing_page(mut self, page: usize) -> Self {
        self.failing_pages.push(page);
        self
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn page_count_calls(&self) -> usize {
        self.page_count_calls.load(Ordering::SeqCst)
    }

    pub fn render_calls(&self) -> usize {
        self.render_calls.load(Ordering::SeqCst)
    }

    /// DPI passed to the most recent render.
    pub fn last_dpi(&self) -> Option<u32> {
        self.last_dpi.lock().ok().and_then(|d| *d)
    }
}

impl Rasterizer for MockRasterizer {
    fn open<'a>(&'a self, _path: &Path) -> Result<Box<dyn RasterDocument + 'a>, BackendError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(BackendError::Unavailable("mock rasterizer disabled".into()));
        }
        Ok(Box::new(MockRasterDocument { rasterizer: self }))
    }
}

struct MockRasterDocument<'a> {
    rasterizer: &'a MockRasterizer,
}

impl RasterDocument for MockRasterDocument<'_> {
    fn page_count(&self) -> Result<usize, BackendError> {
        let r = self.rasterizer;
        r.page_count_calls.fetch_add(1, Ordering::SeqCst);
        Ok(r.page_count)
    }

    fn render_page(&self, page: usize, dpi: u32) -> Result<DynamicImage, BackendError> {
        let r = self.rasterizer;
        r.render_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = r.last_dpi.lock() {
            *last = Some(dpi);
        }
        if r.failing_pages.contains(&page) {
            return Err(BackendError::RenderError(format!("page {page} is corrupt")));
        }
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            16,
            16,
            Rgb([255, 255, 255]),
        )))
    }
}

/// A scripted response for [`MockOcr`].
#[derive(Clone, Debug)]
pub enum OcrResponse {
    Text(String),
    /// A page-level recognition failure.
    Fail(String),
}

/// An OCR engine replaying scripted responses.
///
/// Responses are consumed in order; once exhausted the last one repeats.
pub struct MockOcr {
    responses: Mutex<VecDeque<OcrResponse>>,
    fallback: OcrResponse,
    unavailable: bool,
    calls: AtomicUsize,
}

impl MockOcr {
    /// Recognize the same text on every page.
    pub fn fixed(text: &str) -> Self {
        Self::sequence(vec![OcrResponse::Text(text.to_string())])
    }

    pub fn sequence(responses: Vec<OcrResponse>) -> Self {
        let fallback = responses
            .last()
            .cloned()
            .unwrap_or(OcrResponse::Text(String::new()));
        Self {
            responses: Mutex::new(responses.into()),
            fallback,
            unavailable: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// An engine that is not installed.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::sequence(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OcrEngine for MockOcr {
    fn check_available(&self) -> Result<(), BackendError> {
        if self.unavailable {
            return Err(BackendError::Unavailable("mock OCR not installed".into()));
        }
        Ok(())
    }

    fn recognize(&self, _image: &DynamicImage, _config: &str) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| self.fallback.clone());
        match next {
            OcrResponse::Text(text) => Ok(text),
            OcrResponse::Fail(msg) => Err(BackendError::OcrError(msg)),
        }
    }
}
