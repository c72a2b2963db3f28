//! OCR engine interface.
//!
//! An [`OcrEngine`] turns one image into text. Every call gets its own
//! freshly acquired engine instance, which is released when the call returns,
//! whether it succeeded or not.

use crate::{prelude::*, raster::RasterImage};

pub mod tesseract;

/// The status tag engines use while actually recognizing text.
pub const RECOGNIZING_TEXT: &str = "recognizing text";

/// An image to OCR.
#[derive(Clone, Copy, Debug)]
pub enum OcrImage<'a> {
    /// An encoded image file, such as a PNG or JPEG, with its MIME type.
    Encoded { mime_type: &'a str, data: &'a [u8] },
    /// A rendered pixel buffer.
    Raster(&'a RasterImage),
}

/// A progress update from an OCR engine.
#[derive(Clone, Debug, PartialEq)]
pub struct OcrProgress {
    /// What the engine is doing, such as [`RECOGNIZING_TEXT`].
    pub status: String,
    /// How far along the current status is, from 0.0 to 1.0.
    pub progress: f32,
}

impl OcrProgress {
    /// Create a new progress update.
    pub fn new(status: impl Into<String>, progress: f32) -> Self {
        Self {
            status: status.into(),
            progress: progress.clamp(0.0, 1.0),
        }
    }

    /// Is this an update about text recognition itself?
    pub fn is_recognizing_text(&self) -> bool {
        self.status == RECOGNIZING_TEXT
    }

    /// Progress as a rounded percentage.
    pub fn percent(&self) -> u32 {
        (self.progress * 100.0).round() as u32
    }
}

/// A callback which receives engine progress updates.
pub type OcrProgressFn<'a> = &'a (dyn Fn(OcrProgress) + Send + Sync);

/// Interface to an OCR engine.
#[async_trait]
pub trait OcrEngine: Send + Sync + 'static {
    /// Recognize the text in an image. If `progress` is supplied, the engine
    /// may report how far along it is.
    async fn recognize(
        &self,
        image: OcrImage<'_>,
        progress: Option<OcrProgressFn<'_>>,
    ) -> Result<String>;
}
