//! Turning documents into plain text.
//!
//! [`Extractor::extract_text`] picks a strategy based on the document's media
//! type:
//!
//! - `text/*` is decoded as-is.
//! - `image/*` is sent straight to the OCR engine.
//! - `application/pdf` has its embedded text extracted page by page. If that
//!   yields too few characters per page, the document is assumed to be
//!   scanned, and every page is rendered and OCRed concurrently instead.
//!
//! Anything else is rejected.

use std::sync::Arc;

use clap::Args;

use crate::{
    ocr::{OcrEngine, OcrImage, OcrProgress, tesseract::TesseractOcrEngine},
    pdf::{PdfReader, poppler::PopplerReader},
    prelude::*,
};

mod error;
pub mod heuristic;
mod pdf;
mod progress;

pub use self::{
    error::ExtractError,
    progress::{NoProgress, ProgressReporter},
};
use self::heuristic::DEFAULT_MIN_CHARS_PER_PAGE;

/// Media type used when we have no idea what a file is.
pub const UNKNOWN_MEDIA_TYPE: &str = "application/octet-stream";

/// Broad document categories, each with its own extraction strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Text,
    Pdf,
    Image,
    Unsupported,
}

impl MediaKind {
    /// Categorize a media type such as `text/plain; charset=utf-8`.
    pub fn from_media_type(media_type: &str) -> Self {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if essence == "application/pdf" {
            Self::Pdf
        } else if essence.starts_with("image/") {
            Self::Image
        } else if essence.starts_with("text/") {
            Self::Text
        } else {
            Self::Unsupported
        }
    }
}

/// A document waiting to be extracted.
#[derive(Clone, Debug)]
pub struct SourceDocument {
    /// The declared media type.
    pub media_type: String,
    /// The raw file contents.
    pub data: Vec<u8>,
}

impl SourceDocument {
    /// Create a document from memory.
    pub fn new(media_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    /// Read a document from disk.
    ///
    /// If `media_type` is not supplied, we guess it from the file extension,
    /// then from the file contents.
    pub async fn from_path(
        path: &Path,
        media_type: Option<&str>,
    ) -> Result<Self, ExtractError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|source| ExtractError::Read {
                path: path.to_owned(),
                source,
            })?;
        let media_type = match media_type {
            Some(media_type) => media_type.to_owned(),
            None => guess_media_type(path, &data),
        };
        debug!(path = %path.display(), %media_type, bytes = data.len(), "Read document");
        Ok(Self { media_type, data })
    }

    /// What kind of document is this?
    pub fn kind(&self) -> MediaKind {
        MediaKind::from_media_type(&self.media_type)
    }
}

/// Guess a media type from a file name, falling back to sniffing the data.
fn guess_media_type(path: &Path, data: &[u8]) -> String {
    if let Some(mime) = mime_guess::from_path(path).first() {
        return mime.essence_str().to_owned();
    }
    match infer::get(data) {
        Some(kind) => kind.mime_type().to_owned(),
        None => UNKNOWN_MEDIA_TYPE.to_owned(),
    }
}

/// Options controlling text extraction.
#[derive(Args, Clone, Debug)]
pub struct ExtractOptions {
    /// Treat PDFs with fewer than this many characters of embedded text per
    /// page as scanned, and OCR them.
    #[clap(long, default_value_t = DEFAULT_MIN_CHARS_PER_PAGE)]
    pub min_chars_per_page: usize,

    /// Resolution at which to render scanned PDF pages for OCR.
    #[clap(long, default_value = "300", value_parser = clap::value_parser!(u32).range(1..))]
    pub ocr_dpi: u32,

    /// Tesseract language code(s) to use for OCR, such as `eng` or `eng+fra`.
    #[clap(long, default_value = "eng")]
    pub ocr_language: String,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            min_chars_per_page: DEFAULT_MIN_CHARS_PER_PAGE,
            ocr_dpi: 300,
            ocr_language: "eng".to_owned(),
        }
    }
}

/// Extracts text from documents.
#[derive(Clone)]
pub struct Extractor {
    pdf_reader: Arc<dyn PdfReader>,
    ocr_engine: Arc<dyn OcrEngine>,
    options: ExtractOptions,
}

impl Extractor {
    /// Create an extractor using the given collaborators.
    pub fn new(
        pdf_reader: Arc<dyn PdfReader>,
        ocr_engine: Arc<dyn OcrEngine>,
        options: ExtractOptions,
    ) -> Self {
        Self {
            pdf_reader,
            ocr_engine,
            options,
        }
    }

    /// Create an extractor backed by poppler and tesseract.
    pub fn with_system_tools(options: ExtractOptions) -> Self {
        let ocr_engine = TesseractOcrEngine::new(options.ocr_language.clone());
        Self::new(
            Arc::new(PopplerReader::new()),
            Arc::new(ocr_engine),
            options,
        )
    }

    /// Extract the text of `document`, reporting progress as we go.
    ///
    /// This does not reject empty or all-whitespace results. Callers who need
    /// real text should use [`ensure_usable_text`].
    #[instrument(level = "debug", skip_all, fields(media_type = %document.media_type))]
    pub async fn extract_text(
        &self,
        document: &SourceDocument,
        progress: &dyn ProgressReporter,
    ) -> Result<String, ExtractError> {
        match document.kind() {
            MediaKind::Text => Ok(String::from_utf8_lossy(&document.data).into_owned()),
            MediaKind::Image => self.extract_image_text(document, progress).await,
            MediaKind::Pdf => {
                pdf::extract_pdf_text(
                    self.pdf_reader.as_ref(),
                    self.ocr_engine.as_ref(),
                    &self.options,
                    &document.data,
                    progress,
                )
                .await
            }
            MediaKind::Unsupported => Err(ExtractError::UnsupportedFormat {
                media_type: document.media_type.clone(),
            }),
        }
    }

    /// OCR a standalone image, forwarding the engine's recognition progress.
    async fn extract_image_text(
        &self,
        document: &SourceDocument,
        progress: &dyn ProgressReporter,
    ) -> Result<String, ExtractError> {
        progress.report("Starting OCR on image...");
        let forward = |update: OcrProgress| {
            if update.is_recognizing_text() {
                progress.report(&format!("Recognizing text... {}%", update.percent()));
            } else {
                trace!(status = %update.status, progress = update.progress, "OCR engine status");
            }
        };
        let image = OcrImage::Encoded {
            mime_type: &document.media_type,
            data: &document.data,
        };
        self.ocr_engine
            .recognize(image, Some(&forward))
            .await
            .map_err(ExtractError::ocr)
    }
}

/// Reject extracted text which is empty once trimmed.
pub fn ensure_usable_text(text: String) -> Result<String, ExtractError> {
    if text.trim().is_empty() {
        Err(ExtractError::EmptyExtraction)
    } else {
        Ok(text)
    }
}
