//! Command-line entry points.

use clap::Args;

use crate::{
    extract::{ExtractError, Extractor, SourceDocument},
    prelude::*,
    ui::{ProgressConfig, Ui},
};

pub mod extract;
pub mod quiz;
pub mod schema;

/// Which document to read.
#[derive(Debug, Clone, Args)]
pub struct DocumentOpts {
    /// The document to read: a PDF, an image, or a text or Markdown file.
    #[clap(value_name = "PATH")]
    pub path: PathBuf,

    /// The media type of the document, such as `application/pdf` or
    /// `image/png`. Guessed from the file name or contents if omitted.
    #[clap(long)]
    pub media_type: Option<String>,
}

impl DocumentOpts {
    /// Read the document into memory.
    pub async fn read(&self) -> Result<SourceDocument, ExtractError> {
        SourceDocument::from_path(&self.path, self.media_type.as_deref()).await
    }
}

/// Extract text from `document`, showing progress on a spinner.
pub async fn extract_with_spinner(
    ui: &Ui,
    extractor: &Extractor,
    document: &SourceDocument,
) -> Result<String, ExtractError> {
    let reporter = ui.new_status_spinner(&ProgressConfig {
        emoji: "📄",
        msg: "Extracting text",
        done_msg: "Extracted text",
    });
    let result = extractor.extract_text(document, &reporter).await;
    match &result {
        Ok(text) => {
            debug!(chars = text.chars().count(), "Extraction finished");
            reporter.finish();
        }
        Err(_) => reporter.abandon(),
    }
    result
}
