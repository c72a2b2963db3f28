//! Extracting text from PDFs: embedded text first, OCR if that looks too thin.

use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::try_join_all;
use tokio::sync::Semaphore;

use super::{
    ExtractError, ExtractOptions, ProgressReporter,
    heuristic::{TextLayer, classify},
};
use crate::{
    cpu_limit::cpu_count,
    ocr::{OcrEngine, OcrImage},
    pdf::{PdfDocument, PdfReader, render_scale},
    prelude::*,
};

/// Extract the text of a PDF.
#[instrument(level = "debug", skip_all, fields(bytes = data.len()))]
pub(super) async fn extract_pdf_text(
    pdf_reader: &dyn PdfReader,
    ocr_engine: &dyn OcrEngine,
    options: &ExtractOptions,
    data: &[u8],
    progress: &dyn ProgressReporter,
) -> Result<String, ExtractError> {
    progress.report("Attempting to extract text from PDF...");
    let doc = pdf_reader
        .open(data)
        .await
        .map_err(ExtractError::pdf_parse)?;
    let page_count = doc.page_count();

    let text = structural_text(doc.as_ref()).await?;
    match classify(&text, page_count, options.min_chars_per_page) {
        TextLayer::Digital => {
            debug!(page_count, chars = text.len(), "Using embedded PDF text");
            Ok(text)
        }
        TextLayer::Scanned => {
            // The embedded text is thrown away, not merged.
            info!(page_count, "PDF has too little embedded text, falling back to OCR");
            ocr_pages(doc.as_ref(), ocr_engine, options, progress).await
        }
    }
}

/// Collect the embedded text of every page, one page at a time.
async fn structural_text(doc: &dyn PdfDocument) -> Result<String, ExtractError> {
    let mut pages = Vec::with_capacity(doc.page_count());
    for number in 1..=doc.page_count() {
        let page = doc
            .load_page(number)
            .await
            .map_err(ExtractError::pdf_parse)?;
        let runs = doc
            .text_runs(&page)
            .await
            .map_err(ExtractError::pdf_parse)?;
        trace!(page = number, runs = runs.len(), "Extracted text runs");
        pages.push(runs.join(" "));
    }
    Ok(pages.join(" "))
}

/// OCR every page concurrently, and join the results in page order.
///
/// A page holds a slot from rendering until its text comes back, so at most
/// [`cpu_count`] rendered pages are in memory at once.
async fn ocr_pages(
    doc: &dyn PdfDocument,
    ocr_engine: &dyn OcrEngine,
    options: &ExtractOptions,
    progress: &dyn ProgressReporter,
) -> Result<String, ExtractError> {
    let total = doc.page_count();
    let scale = render_scale(options.ocr_dpi);
    let processed = AtomicUsize::new(0);
    let page_slots = Semaphore::new(cpu_count());

    let page_futures = (1..=total).map(|number| {
        let processed = &processed;
        let page_slots = &page_slots;
        async move {
            let slot = page_slots
                .acquire()
                .await
                .map_err(|err| ExtractError::ocr(err.into()))?;
            let text = ocr_page(doc, ocr_engine, number, scale).await;
            drop(slot);
            let text = text?;
            let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
            progress.report(&format!(
                "Processing page OCR... {}%",
                percent(done, total)
            ));
            Ok::<_, ExtractError>(text)
        }
    });

    // `try_join_all` returns results in input order, whatever order the pages
    // finish in, and drops the other pages as soon as one fails.
    let texts = try_join_all(page_futures).await?;
    Ok(texts.join("\n"))
}

/// Render and OCR a single page.
#[instrument(level = "debug", skip(doc, ocr_engine, scale))]
async fn ocr_page(
    doc: &dyn PdfDocument,
    ocr_engine: &dyn OcrEngine,
    number: usize,
    scale: f64,
) -> Result<String, ExtractError> {
    let page = doc
        .load_page(number)
        .await
        .map_err(ExtractError::pdf_parse)?;
    let viewport = page.viewport(scale);
    let raster = doc
        .render_page(&page, &viewport)
        .await
        .map_err(ExtractError::pdf_parse)?;
    let Some(raster) = raster else {
        warn!(
            page = number,
            width = viewport.width,
            height = viewport.height,
            "No drawable surface for page, treating it as blank"
        );
        return Ok(String::new());
    };
    debug!(
        page = number,
        width = raster.width(),
        height = raster.height(),
        "Rendered page"
    );
    ocr_engine
        .recognize(OcrImage::Raster(&raster), None)
        .await
        .map_err(ExtractError::ocr)
}

/// `done / total` as a rounded percentage.
fn percent(done: usize, total: usize) -> u32 {
    if total == 0 {
        return 100;
    }
    (done as f64 / total as f64 * 100.0).round() as u32
}
