//! The `quiz` subcommand.

use clap::Args;

use super::{DocumentOpts, extract_with_spinner};
use crate::{
    async_utils::io::write_output_json,
    extract::{ExtractOptions, Extractor, ensure_usable_text},
    prelude::*,
    prompt::ChatPrompt,
    quiz::{
        QuizConfig, QuizGenerator as _, QuizOptions, default_prompt,
        llm::{LlmOpts, LlmQuizGenerator},
    },
    ui::{ProgressConfig, Ui},
};

/// Quiz command line arguments.
#[derive(Debug, Args)]
pub struct QuizOpts {
    #[clap(flatten)]
    pub document: DocumentOpts,

    /// The model to use.
    #[clap(short = 'm', long, default_value = "gpt-4o-mini")]
    pub model: String,

    /// A custom prompt, in TOML or JSON. Run `docquiz schema ChatPrompt` for
    /// the format. The templates receive `text`, `num_questions`,
    /// `difficulty`, `time_limit` and `total_points`.
    #[clap(long)]
    pub prompt: Option<PathBuf>,

    #[clap(flatten)]
    pub quiz_options: QuizOptions,

    #[clap(flatten)]
    pub llm_opts: LlmOpts,

    #[clap(flatten)]
    pub extract_options: ExtractOptions,

    /// Where to write the quiz JSON. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// The `quiz` subcommand.
#[instrument(level = "debug", skip_all, fields(path = %opts.document.path.display()))]
pub async fn cmd_quiz(ui: Ui, opts: &QuizOpts) -> Result<()> {
    // Check our settings before doing any real work.
    let config = QuizConfig::from(&opts.quiz_options);
    config.validate()?;
    let prompt = match &opts.prompt {
        Some(path) => ChatPrompt::from_path(path).await?,
        None => default_prompt()?,
    };

    // Get our text, and make sure there's something to quiz on.
    let document = opts.document.read().await?;
    let extractor = Extractor::with_system_tools(opts.extract_options.clone());
    let text = extract_with_spinner(&ui, &extractor, &document).await?;
    let text = ensure_usable_text(text)?;

    // Write the quiz.
    let generator =
        LlmQuizGenerator::new(opts.model.clone(), prompt, opts.llm_opts.clone())?;
    let spinner = ui.new_spinner(&ProgressConfig {
        emoji: "🧠",
        msg: "Writing quiz",
        done_msg: "Wrote quiz",
    });
    let quiz = generator.generate_quiz(&text, &config).await;
    match &quiz {
        Ok(_) => spinner.finish_using_style(),
        Err(_) => spinner.finish_and_clear(),
    }
    let quiz = quiz.context("Error generating quiz")?;

    write_output_json(opts.output_path.as_deref(), &quiz).await
}
