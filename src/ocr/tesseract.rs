//! Tesseract OCR engine.

use std::borrow::Cow;

use tokio::{fs, process::Command};
use tracing::Level;

use super::{OcrEngine, OcrImage, OcrProgress, OcrProgressFn, RECOGNIZING_TEXT};
use crate::{
    async_utils::{check_for_command_failure, spawn_blocking_propagating_panics},
    cpu_limit::with_cpu_semaphore,
    prelude::*,
};

/// Status tag reported while a worker is being set up.
const INITIALIZING: &str = "initializing tesseract";

/// OCR engine wrapping the `tesseract` CLI tool.
#[derive(Debug)]
pub struct TesseractOcrEngine {
    /// Tesseract language code(s), such as `eng` or `eng+deu`.
    language: String,
}

impl TesseractOcrEngine {
    /// Create a new `tesseract` engine.
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractOcrEngine {
    #[instrument(level = "debug", skip_all, fields(language = %self.language))]
    async fn recognize(
        &self,
        image: OcrImage<'_>,
        progress: Option<OcrProgressFn<'_>>,
    ) -> Result<String> {
        let report = |status: &str, fraction: f32| {
            if let Some(progress) = progress {
                progress(OcrProgress::new(status, fraction));
            }
        };

        report(INITIALIZING, 0.0);
        let worker = TesseractWorker::acquire(&self.language)?;
        report(INITIALIZING, 1.0);

        report(RECOGNIZING_TEXT, 0.0);
        let text = worker.recognize(image).await?;
        report(RECOGNIZING_TEXT, 1.0);
        Ok(text)
        // `worker` is released here, or on any early return above.
    }
}

/// A single-use tesseract instance, with its own scratch directory.
struct TesseractWorker {
    /// Scratch space for input and output files. Released by [`Drop`].
    tmpdir: Option<tempfile::TempDir>,
    /// Tesseract language code(s).
    language: String,
}

impl TesseractWorker {
    /// Acquire a new worker.
    fn acquire(language: &str) -> Result<Self> {
        let tmpdir = tempfile::TempDir::with_prefix("tesseract")
            .context("cannot create tesseract scratch directory")?;
        trace!(directory = %tmpdir.path().display(), "Acquired tesseract worker");
        Ok(Self {
            tmpdir: Some(tmpdir),
            language: language.to_owned(),
        })
    }

    /// Run tesseract on a single image.
    async fn recognize(&self, image: OcrImage<'_>) -> Result<String> {
        let tmpdir = self
            .tmpdir
            .as_ref()
            .ok_or_else(|| anyhow!("tesseract worker has already been released"))?
            .path();

        let (extension, data) = input_file(image).await?;

        // Write our input to the scratch directory.
        let input_path = tmpdir.join(format!("input.{}", extension));
        let output_base = tmpdir.join("output");
        fs::write(&input_path, &data)
            .await
            .context("cannot write tesseract input file")?;

        // Run tesseract on the input file. An empty page separator keeps a
        // trailing form feed out of our text.
        let output = with_cpu_semaphore(|| async {
            Command::new("tesseract")
                .arg(&input_path)
                .arg(&output_base)
                .args(["-l", &self.language, "-c", "page_separator="])
                .output()
                .await
                .context("cannot run tesseract (is it installed?)")
        })
        .await?;
        // Tesseract reports routine progress on stderr for every image.
        check_for_command_failure("tesseract", &output, Level::DEBUG, None)?;

        // Read the output file.
        fs::read_to_string(output_base.with_extension("txt"))
            .await
            .context("cannot read tesseract output file")
    }
}

/// The file extension and contents to hand tesseract for `image`.
async fn input_file(image: OcrImage<'_>) -> Result<(&'static str, Cow<'_, [u8]>)> {
    match image {
        OcrImage::Encoded { mime_type, data } => {
            let extension = mime_guess::get_mime_extensions_str(mime_type)
                .and_then(|o| o.first().copied())
                .ok_or_else(|| anyhow!("cannot determine extension for {}", mime_type))?;
            Ok((extension, Cow::Borrowed(data)))
        }
        OcrImage::Raster(raster) => {
            // A full page takes tens of milliseconds to encode.
            let raster = raster.clone();
            let png = spawn_blocking_propagating_panics(move || raster.to_png()).await?;
            Ok(("png", Cow::Owned(png)))
        }
    }
}

impl Drop for TesseractWorker {
    fn drop(&mut self) {
        if let Some(tmpdir) = self.tmpdir.take() {
            let tmpdir_path = tmpdir.path().to_owned();
            if let Err(err) = tmpdir.close() {
                error!(
                    directory = ?tmpdir_path.display(),
                    "failed to release tesseract worker: {}",
                    err
                );
            } else {
                trace!(directory = ?tmpdir_path.display(), "Released tesseract worker");
            }
        }
    }
}
