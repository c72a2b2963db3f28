//! Reading PDF documents: page enumeration, embedded text, and rasterization.
//!
//! The extraction pipeline only talks to the [`PdfReader`] and [`PdfDocument`]
//! traits. [`poppler::PopplerReader`] is the real implementation.

use crate::{
    prelude::*,
    raster::{PDF_POINTS_PER_INCH, RasterImage},
};

pub mod poppler;

/// Opens PDF documents from memory.
#[async_trait]
pub trait PdfReader: Send + Sync + 'static {
    /// Open a PDF. Fails if the document is corrupt or protected.
    async fn open(&self, data: &[u8]) -> Result<Box<dyn PdfDocument>>;
}

/// An open PDF document.
#[async_trait]
pub trait PdfDocument: Send + Sync {
    /// The number of pages in the document.
    fn page_count(&self) -> usize;

    /// Load a page. `number` is 1-based.
    async fn load_page(&self, number: usize) -> Result<PdfPage>;

    /// The embedded text runs of a page, in content order.
    async fn text_runs(&self, page: &PdfPage) -> Result<Vec<String>>;

    /// Render a page into a fresh pixel buffer the size of `viewport`.
    ///
    /// Returns `Ok(None)` if no drawable surface of that size can be created.
    async fn render_page(
        &self,
        page: &PdfPage,
        viewport: &Viewport,
    ) -> Result<Option<RasterImage>>;
}

/// A loaded page.
#[derive(Clone, Debug, PartialEq)]
pub struct PdfPage {
    /// 1-based page number.
    pub number: usize,
    /// Displayed width in PDF points, after rotation.
    pub width: f64,
    /// Displayed height in PDF points, after rotation.
    pub height: f64,
}

impl PdfPage {
    /// The viewport for rendering this page at `scale` pixels per point.
    pub fn viewport(&self, scale: f64) -> Viewport {
        Viewport {
            width: (self.width * scale).floor() as u32,
            height: (self.height * scale).floor() as u32,
            scale,
        }
    }
}

/// The pixel dimensions a page will be rendered at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub scale: f64,
}

/// Pixels per PDF point when rendering at `dpi`.
pub fn render_scale(dpi: u32) -> f64 {
    f64::from(dpi) / PDF_POINTS_PER_INCH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_page_at_300_dpi() {
        let page = PdfPage {
            number: 1,
            width: 612.0,
            height: 792.0,
        };
        let viewport = page.viewport(render_scale(300));
        assert_eq!((viewport.width, viewport.height), (2550, 3300));
        assert!((viewport.scale - 300.0 / 72.0).abs() < 1e-9);
    }

    #[test]
    fn fractional_viewports_round_down() {
        let page = PdfPage {
            number: 1,
            width: 595.28,
            height: 841.89,
        };
        let viewport = page.viewport(render_scale(300));
        assert_eq!((viewport.width, viewport.height), (2480, 3507));
    }
}
