use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{prelude::*, ui::Ui};

mod async_utils;
mod cmd;
mod cpu_limit;
mod extract;
mod llm_client;
mod ocr;
mod pdf;
mod prelude;
mod prompt;
mod quiz;
mod raster;
mod retry;
mod ui;

/// Extract text from documents, and turn it into quizzes.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Environment Variables:
  - OPENAI_API_BASE (optional): Override the server URL.
  - OPENAI_API_KEY: The OpenAI key to use.

  These variables may be set in a standard `.env` file.

External Tools:
  - poppler-utils (pdfinfo, pdftotext, pdftocairo) for PDFs.
  - tesseract for OCR.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Extract the text of a PDF, image or text file, using OCR if needed.
    Extract(cmd::extract::ExtractOpts),
    /// Extract the text of a document and write a quiz about it.
    Quiz(cmd::quiz::QuizOpts),
    /// Print schemas for input and output formats.
    Schema(cmd::schema::SchemaOpts),
}

impl Cmd {
    /// Are we using stdout for output?
    fn using_stdout_for_output(&self) -> bool {
        match self {
            Cmd::Extract(opts) => opts.output_path.is_none(),
            Cmd::Quiz(opts) => opts.output_path.is_none(),
            Cmd::Schema(opts) => opts.output_path.is_none(),
        }
    }
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);
    tracing_subscriber::registry().with(subscriber).init();

    // Call our real `main` function now that logging is set up.
    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Hide the spinners if we're using stdout for output.
    if opts.subcmd.using_stdout_for_output() {
        ui.hide_progress_bars();
    }

    match &opts.subcmd {
        Cmd::Extract(opts) => cmd::extract::cmd_extract(ui, opts).await,
        Cmd::Quiz(opts) => cmd::quiz::cmd_quiz(ui, opts).await,
        Cmd::Schema(opts) => cmd::schema::cmd_schema(opts).await,
    }
}
