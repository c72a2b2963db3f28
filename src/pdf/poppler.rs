//! A [`PdfReader`] built on Poppler's command-line tools.
//!
//! We use `pdfinfo` for page counts and page sizes, `pdftotext` for embedded
//! text, and `pdftocairo` for rasterization. All of these are in the
//! `poppler-utils` package.

use std::{
    collections::BTreeMap,
    process::Output,
    sync::{
        LazyLock,
        atomic::{AtomicUsize, Ordering},
    },
};

use regex::Regex;
use tokio::{fs, process::Command};
use tracing::Level;

use super::{PdfDocument, PdfPage, PdfReader, Viewport};
use crate::{
    async_utils::{check_for_command_failure, spawn_blocking_propagating_panics},
    cpu_limit::with_cpu_semaphore,
    prelude::*,
    raster::RasterImage,
};

/// Cairo refuses to create image surfaces larger than this on either side.
const MAX_SURFACE_DIMENSION: u32 = 32767;

/// A default error regex for checking command output.
static ERROR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error").expect("failed to compile regex"));

/// Poppler complains about damaged cross-reference tables, then repairs them
/// and carries on. Those complaints are not fatal.
static DOWNGRADE_TO_WARNING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)error: xref num").expect("failed to compile regex")
});

/// `Page    3 size: 612 x 792 pts (letter)`, or `Page size: ...` when only one
/// page was requested without a range.
static PAGE_SIZE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Page\s+(?:\d+\s+)?size:\s+([0-9.]+)\s+x\s+([0-9.]+)\s+pts")
        .expect("failed to compile regex")
});

/// `Page    3 rot:  90`.
static PAGE_ROTATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Page\s+(?:\d+\s+)?rot:\s+(-?\d+)").expect("failed to compile regex")
});

/// Does this line contain an error?
fn is_error_line(line: &str) -> bool {
    ERROR_REGEX.is_match(line) && !DOWNGRADE_TO_WARNING_REGEX.is_match(line)
}

/// Opens PDFs using Poppler.
#[derive(Debug, Default)]
#[non_exhaustive]
pub struct PopplerReader {}

impl PopplerReader {
    /// Create a new reader.
    pub fn new() -> Self {
        Self {}
    }
}

#[async_trait]
impl PdfReader for PopplerReader {
    #[instrument(level = "debug", skip_all, fields(bytes = data.len()))]
    async fn open(&self, data: &[u8]) -> Result<Box<dyn PdfDocument>> {
        // Poppler wants a file, so give it one in a private directory.
        let tmpdir = tempfile::TempDir::with_prefix("pdf")?;
        let pdf_path = tmpdir.path().join("document.pdf");
        fs::write(&pdf_path, data)
            .await
            .with_context(|| format!("failed to write {:?}", pdf_path.display()))?;

        let output = run_poppler(Command::new("pdfinfo").arg(&pdf_path), "pdfinfo").await?;
        let page_count = parse_page_count(&String::from_utf8_lossy(&output.stdout))?;
        debug!(page_count, "Opened PDF");

        Ok(Box::new(PopplerDocument {
            tmpdir: Some(tmpdir),
            pdf_path,
            page_count,
            render_counter: AtomicUsize::new(0),
        }))
    }
}

/// A PDF document on disk, in a temporary directory we own.
struct PopplerDocument {
    /// Holds our copy of the PDF and any rendered pages. Released by [`Drop`].
    tmpdir: Option<tempfile::TempDir>,
    /// Our copy of the PDF.
    pdf_path: PathBuf,
    /// Number of pages, according to `pdfinfo`.
    page_count: usize,
    /// Used to give every rendered image a unique file name.
    render_counter: AtomicUsize,
}

impl PopplerDocument {
    /// Get the temporary directory we're working in.
    fn tmpdir_path(&self) -> Result<&Path> {
        self.tmpdir
            .as_ref()
            .map(|tmpdir| tmpdir.path())
            .ok_or_else(|| anyhow!("PDF document has already been closed"))
    }

    /// Make sure `number` is a valid 1-based page number.
    fn check_page_number(&self, number: usize) -> Result<()> {
        if number == 0 || number > self.page_count {
            Err(anyhow!(
                "page {} is out of range (document has {} pages)",
                number,
                self.page_count
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PdfDocument for PopplerDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    #[instrument(level = "debug", skip(self))]
    async fn load_page(&self, number: usize) -> Result<PdfPage> {
        self.check_page_number(number)?;
        let page_arg = number.to_string();
        let output = run_poppler(
            Command::new("pdfinfo")
                .args(["-f", &page_arg, "-l", &page_arg])
                .arg(&self.pdf_path),
            "pdfinfo",
        )
        .await?;
        parse_page_info(number, &String::from_utf8_lossy(&output.stdout))
    }

    #[instrument(level = "debug", skip_all, fields(page = page.number))]
    async fn text_runs(&self, page: &PdfPage) -> Result<Vec<String>> {
        self.check_page_number(page.number)?;
        let page_arg = page.number.to_string();
        let output = run_poppler(
            Command::new("pdftotext")
                .args(["-f", &page_arg, "-l", &page_arg, "-enc", "UTF-8"])
                .arg(&self.pdf_path)
                .arg("-"),
            "pdftotext",
        )
        .await?;
        Ok(split_text_runs(&String::from_utf8_lossy(&output.stdout)))
    }

    #[instrument(level = "debug", skip_all, fields(page = page.number, width = viewport.width, height = viewport.height))]
    async fn render_page(
        &self,
        page: &PdfPage,
        viewport: &Viewport,
    ) -> Result<Option<RasterImage>> {
        self.check_page_number(page.number)?;
        if !has_drawable_surface(viewport) {
            warn!(
                page = page.number,
                width = viewport.width,
                height = viewport.height,
                "No drawable surface for page"
            );
            return Ok(None);
        }

        // pdftocairo adds `.png` to the output root.
        let render_id = self.render_counter.fetch_add(1, Ordering::Relaxed);
        let out_root = self
            .tmpdir_path()?
            .join(format!("page-{:05}-{}", page.number, render_id));
        let png_path = out_root.with_extension("png");

        let page_arg = page.number.to_string();
        let mut cmd = Command::new("pdftocairo");
        cmd.args(["-png", "-singlefile", "-f", &page_arg, "-l", &page_arg])
            .arg("-scale-to-x")
            .arg(viewport.width.to_string())
            .arg("-scale-to-y")
            .arg(viewport.height.to_string())
            .arg(&self.pdf_path)
            .arg(&out_root);
        // pdftocairo will use at least a whole CPU, so don't run hundreds of
        // them at once.
        with_cpu_semaphore(|| run_poppler(&mut cmd, "pdftocairo")).await?;

        let png = fs::read(&png_path)
            .await
            .with_context(|| format!("failed to read {:?}", png_path.display()))?;
        // Recover the space early. The directory goes away on drop anyway.
        if let Err(err) = fs::remove_file(&png_path).await {
            debug!(path = %png_path.display(), "failed to delete rendered page: {}", err);
        }

        let image = spawn_blocking_propagating_panics(move || RasterImage::decode(&png))
            .await
            .with_context(|| format!("failed to decode rendered page {}", page.number))?;
        Ok(Some(image))
    }
}

impl Drop for PopplerDocument {
    fn drop(&mut self) {
        // Delete our temporary directory, if we have one.
        if let Some(tmpdir) = self.tmpdir.take() {
            let tmpdir_path = tmpdir.path().to_owned();
            if let Err(err) = tmpdir.close() {
                error!(
                    directory = ?tmpdir_path.display(),
                    "failed to delete temporary directory: {}",
                    err
                );
            }
        }
    }
}

/// Run a Poppler command and check its output.
async fn run_poppler(cmd: &mut Command, command_name: &str) -> Result<Output> {
    let output = cmd
        .output()
        .await
        .with_context(|| format!("failed to run {} (is poppler-utils installed?)", command_name))?;
    check_for_command_failure(
        command_name,
        &output,
        Level::WARN,
        Some(&is_error_line),
    )?;
    Ok(output)
}

/// Can we create an image surface for this viewport?
fn has_drawable_surface(viewport: &Viewport) -> bool {
    viewport.width > 0
        && viewport.height > 0
        && viewport.width <= MAX_SURFACE_DIMENSION
        && viewport.height <= MAX_SURFACE_DIMENSION
}

/// Get the `Pages:` value from `pdfinfo` output.
fn parse_page_count(pdfinfo_output: &str) -> Result<usize> {
    let mut properties = BTreeMap::new();
    for line in pdfinfo_output.lines() {
        let mut parts = line.splitn(2, ':');
        let key = parts.next().unwrap_or("").trim();
        let value = parts.next().unwrap_or("").trim();
        properties.insert(key, value);
    }
    let page_count_str = properties
        .get("Pages")
        .ok_or_else(|| anyhow!("failed to find page count in pdfinfo output"))?;
    page_count_str
        .parse::<usize>()
        .with_context(|| format!("failed to parse page count {:?}", page_count_str))
}

/// Get a page's displayed size from `pdfinfo -f N -l N` output.
fn parse_page_info(number: usize, pdfinfo_output: &str) -> Result<PdfPage> {
    let mut size = None;
    let mut rotation = 0;
    for line in pdfinfo_output.lines() {
        if let Some(caps) = PAGE_SIZE_REGEX.captures(line) {
            let width = caps[1]
                .parse::<f64>()
                .with_context(|| format!("bad page width in {:?}", line))?;
            let height = caps[2]
                .parse::<f64>()
                .with_context(|| format!("bad page height in {:?}", line))?;
            size = Some((width, height));
        } else if let Some(caps) = PAGE_ROTATION_REGEX.captures(line) {
            rotation = caps[1]
                .parse::<i32>()
                .with_context(|| format!("bad page rotation in {:?}", line))?;
        }
    }
    let (width, height) =
        size.ok_or_else(|| anyhow!("failed to find size of page {} in pdfinfo output", number))?;
    let (width, height) = if rotation.rem_euclid(180) == 90 {
        (height, width)
    } else {
        (width, height)
    };
    Ok(PdfPage {
        number,
        width,
        height,
    })
}

/// Split `pdftotext` output into text runs: one per non-blank line.
fn split_text_runs(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}
