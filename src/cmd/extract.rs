//! The `extract` subcommand.

use clap::Args;

use super::{DocumentOpts, extract_with_spinner};
use crate::{
    async_utils::io::write_output_text,
    extract::{ExtractOptions, Extractor},
    prelude::*,
    ui::Ui,
};

/// Extract command line arguments.
#[derive(Debug, Args)]
pub struct ExtractOpts {
    #[clap(flatten)]
    pub document: DocumentOpts,

    #[clap(flatten)]
    pub extract_options: ExtractOptions,

    /// Where to write the extracted text. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `extract` subcommand.
#[instrument(level = "debug", skip_all, fields(path = %opts.document.path.display()))]
pub async fn cmd_extract(ui: Ui, opts: &ExtractOpts) -> Result<()> {
    let document = opts.document.read().await?;
    let extractor = Extractor::with_system_tools(opts.extract_options.clone());
    let text = extract_with_spinner(&ui, &extractor, &document).await?;
    write_output_text(opts.output_path.as_deref(), &text).await
}
