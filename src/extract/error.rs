//! Typed extraction failures.

use std::{error::Error as StdError, io, path::PathBuf};

use thiserror::Error;

/// A boxed underlying cause.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Ways in which extracting text from a document can fail.
///
/// None of these are retried. The user needs to pick a different file (or fix
/// the one they have) and try again.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The document is not text, a PDF or an image.
    #[error("unsupported file type: {media_type}")]
    UnsupportedFormat { media_type: String },

    /// The PDF is corrupt or protected, or one of its pages could not be
    /// loaded or rendered.
    #[error("could not parse PDF document")]
    PdfParse(#[source] BoxError),

    /// The OCR engine failed.
    #[error("could not recognize text in image")]
    Ocr(#[source] BoxError),

    /// The document could not be read.
    #[error("could not read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Extraction worked, but found nothing but whitespace.
    #[error("no usable text found in document; please try a different file")]
    EmptyExtraction,
}

impl ExtractError {
    pub(crate) fn pdf_parse(err: anyhow::Error) -> Self {
        Self::PdfParse(err.into())
    }

    pub(crate) fn ocr(err: anyhow::Error) -> Self {
        Self::Ocr(err.into())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn causes_are_kept_as_sources() {
        let err = ExtractError::ocr(anyhow!("engine exploded"));
        assert_eq!(err.to_string(), "could not recognize text in image");
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("engine exploded"));
    }

    #[test]
    fn unsupported_format_names_the_media_type() {
        let err = ExtractError::UnsupportedFormat {
            media_type: "application/zip".to_owned(),
        };
        assert!(err.to_string().contains("application/zip"));
    }
}
