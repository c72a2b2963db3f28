//! Writing quizzes with an OpenAI-compatible chat completion API.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
        CreateChatCompletionResponse, FinishReason, ResponseFormat,
        ResponseFormatJsonSchema,
    },
};
use clap::Args;
use keen_retry::{ExponentialJitter, ResolvedResult};
use thiserror::Error;
use tokio::time;

use super::{Quiz, QuizConfig, QuizGenerator, QuizQuestions, strict_json_schema};
use crate::{
    llm_client::create_llm_client,
    prelude::*,
    prompt::{ChatPrompt, to_openai_messages},
    retry::{
        IntoRetryResult as _, IsKnownTransient, SimpleRetryResult, retry_result_fatal,
        retry_result_transient, try_retry_result,
    },
};

/// Our chat-related options.
#[derive(Args, Clone, Debug, Default)]
pub struct LlmOpts {
    /// An upper limit on the number of completion tokens to generate. This may
    /// help prevent runaway responses, but it may also cause incomplete
    /// results.
    #[clap(long)]
    pub max_completion_tokens: Option<u32>,

    /// The temperature to use for sampling, between 0.0 and 2.0. Defaults to
    /// the model's default.
    #[clap(long)]
    pub temperature: Option<f32>,

    /// The top-p sampling value to use, between 0.0 and 1.0. Defaults to the
    /// model's default.
    #[clap(long)]
    pub top_p: Option<f32>,

    /// A timeout, in seconds, for the LLM to return a complete response.
    /// Timed-out requests are retried.
    #[clap(long)]
    pub timeout: Option<u64>,
}

impl LlmOpts {
    /// Run an API call, applying our timeout if we have one.
    async fn with_timeout<T>(
        &self,
        future: impl Future<Output = Result<T, OpenAIError>> + Send,
    ) -> Result<T, LlmError> {
        match self.timeout {
            Some(timeout) => time::timeout(Duration::from_secs(timeout), future)
                .await
                .map_err(|_| LlmError::Timeout)?
                .map_err(LlmError::OpenAI),
            None => future.await.map_err(LlmError::OpenAI),
        }
    }
}

/// An error which occurred while calling an LLM.
#[derive(Debug, Error)]
enum LlmError {
    /// An OpenAI error.
    #[error("OpenAI error: {0}")]
    OpenAI(#[source] OpenAIError),

    /// A timeout error.
    #[error("LLM request timed out")]
    Timeout,
}

impl IsKnownTransient for LlmError {
    fn is_known_transient(&self) -> bool {
        match self {
            LlmError::OpenAI(err) => err.is_known_transient(),
            // Runaway responses and overloaded servers may do better next time.
            LlmError::Timeout => true,
        }
    }
}

/// Writes quizzes using an LLM.
pub struct LlmQuizGenerator {
    client: Client<OpenAIConfig>,
    model: String,
    prompt: ChatPrompt,
    schema: Value,
    validator: jsonschema::Validator,
    llm_opts: LlmOpts,
}

impl LlmQuizGenerator {
    /// Create a generator which talks to the API configured in our
    /// environment.
    pub fn new(model: String, prompt: ChatPrompt, llm_opts: LlmOpts) -> Result<Self> {
        let client = create_llm_client()?;
        let schema = strict_json_schema::<QuizQuestions>()?;
        trace!(%schema, "Response schema");
        let validator = jsonschema::validator_for(&schema)?;
        Ok(Self {
            client,
            model,
            prompt,
            schema,
            validator,
            llm_opts,
        })
    }

    /// Build our chat completion request.
    fn build_request(
        &self,
        text: &str,
        config: &QuizConfig,
    ) -> Result<CreateChatCompletionRequest> {
        let bindings = json!({
            "text": text,
            "num_questions": config.num_questions,
            "difficulty": config.difficulty,
            "time_limit": config.time_limit,
            "total_points": config.total_points,
        });
        let messages = to_openai_messages(&self.prompt.render(&bindings)?)?;

        let json_schema = ResponseFormatJsonSchema {
            name: "QuizQuestions".to_owned(),
            schema: Some(self.schema.clone()),
            strict: Some(true),
            description: None,
        };

        let mut req = CreateChatCompletionRequestArgs::default();
        req.model(self.model.clone())
            .messages(messages)
            .response_format(ResponseFormat::JsonSchema { json_schema })
            .store(false);
        if let Some(max_completion_tokens) = self.llm_opts.max_completion_tokens {
            req.max_completion_tokens(max_completion_tokens);
        }
        if let Some(temperature) = self.llm_opts.temperature {
            req.temperature(temperature);
        }
        if let Some(top_p) = self.llm_opts.top_p {
            req.top_p(top_p);
        }
        req.build().context("Error building request")
    }

    /// Make a single attempt at writing a quiz.
    #[instrument(level = "debug", skip_all, fields(attempt = attempt_number.fetch_add(1, Ordering::SeqCst)))]
    async fn attempt(
        &self,
        attempt_number: &AtomicUsize,
        req: &CreateChatCompletionRequest,
        config: &QuizConfig,
    ) -> SimpleRetryResult<Quiz> {
        let chat = self.client.chat();
        let chat_result: Value = try_retry_result!(
            self.llm_opts
                .with_timeout(chat.create_byot(req))
                .await
                .into_retry_result(LlmError::is_known_transient)
        );
        debug!(%chat_result, "OpenAI response");
        let response = try_retry_result!(
            serde_json::from_value::<CreateChatCompletionResponse>(chat_result)
                .context("Error parsing OpenAI response")
                .into_fatal()
        );

        let Some(choice) = response.choices.first() else {
            return retry_result_fatal(anyhow!("No choices in OpenAI response"));
        };
        if choice.finish_reason == Some(FinishReason::ContentFilter) {
            return retry_result_fatal(anyhow!("Content filter triggered"));
        }
        let content = choice.message.content.as_deref().unwrap_or_default();
        parse_quiz_content(&self.validator, content, config)
    }
}

#[async_trait]
impl QuizGenerator for LlmQuizGenerator {
    #[instrument(level = "debug", skip_all, fields(model = %self.model))]
    async fn generate_quiz(&self, text: &str, config: &QuizConfig) -> Result<Quiz> {
        config.validate()?;
        let req = self.build_request(text, config)?;
        trace!(?req, "Request");

        let attempt_number = AtomicUsize::new(0);
        let result = self
            .attempt(&attempt_number, &req, config)
            .await
            .retry_with_async(|_| async {
                self.attempt(&attempt_number, &req, config).await
            })
            .with_exponential_jitter(|| ExponentialJitter::FromBackoffRange {
                backoff_range_millis: 1..=30_000,
                re_attempts: 5,
                jitter_ratio: 0.2,
            })
            .await
            .inspect_recovered(|_, _, retry_errors_list| {
                warn!(
                    "succeeded after retrying {} times (failed attempts: [{}])",
                    retry_errors_list.len(),
                    keen_retry::loggable_retry_errors(retry_errors_list)
                )
            })
            .inspect_given_up(|_, retry_errors_list, fatal_error| {
                error!(
                    "FAILED after exhausting all {} retrying attempts with error {fatal_error:?}. Previous transient failures: [{}]",
                    retry_errors_list.len(),
                    keen_retry::loggable_retry_errors(retry_errors_list)
                )
            });

        match result {
            ResolvedResult::Ok { output, .. } | ResolvedResult::Recovered { output, .. } => {
                info!(questions = output.questions.len(), "Generated quiz");
                Ok(output)
            }
            ResolvedResult::Fatal { error, .. } => Err(error),
            ResolvedResult::GivenUp { fatal_error, .. }
            | ResolvedResult::Unrecoverable { fatal_error, .. } => Err(fatal_error),
        }
    }
}

/// Parse and check the model's answer.
///
/// Models occasionally produce broken JSON, the wrong number of questions or
/// an answer that isn't one of the options, so all of these are worth
/// another try.
fn parse_quiz_content(
    validator: &jsonschema::Validator,
    content: &str,
    config: &QuizConfig,
) -> SimpleRetryResult<Quiz> {
    let value = try_retry_result!(
        serde_json::from_str::<Value>(content)
            .with_context(|| format!("Error parsing OpenAI response content: {:?}", content))
            .into_transient()
    );
    if let Err(err) = validator.validate(&value) {
        return retry_result_transient(anyhow!("response does not match schema: {}", err));
    }
    let questions = try_retry_result!(
        serde_json::from_value::<QuizQuestions>(value)
            .context("Error parsing quiz questions")
            .into_transient()
    );
    Quiz::from_questions(questions.questions, config).into_transient()
}

#[cfg(test)]
mod tests {
    use keen_retry::RetryResult;

    use super::*;
    use crate::quiz::Difficulty;

    fn validator() -> jsonschema::Validator {
        let schema = strict_json_schema::<QuizQuestions>().unwrap();
        jsonschema::validator_for(&schema).unwrap()
    }

    fn config() -> QuizConfig {
        QuizConfig {
            num_questions: 2,
            difficulty: Difficulty::Easy,
            time_limit: 5,
            total_points: 20,
        }
    }

    fn content(second_answer: &str) -> String {
        json!({
            "questions": [
                {
                    "question": "The moon orbits the Earth.",
                    "type": "true_false",
                    "options": ["True", "False"],
                    "correctAnswer": "True",
                    "explanation": "The moon is Earth's satellite.",
                },
                {
                    "question": "Which planet is largest?",
                    "type": "multiple_choice",
                    "options": ["Mars", "Jupiter", "Venus", "Mercury"],
                    "correctAnswer": second_answer,
                    "explanation": "Jupiter is the largest planet.",
                },
            ]
        })
        .to_string()
    }

    #[test]
    fn good_answers_become_quizzes() {
        match parse_quiz_content(&validator(), &content("Jupiter"), &config()) {
            RetryResult::Ok { output, .. } => {
                assert_eq!(output.questions.len(), 2);
                assert_eq!(output.time_limit, 5);
                assert_eq!(output.total_points, 20);
                assert_eq!(output.difficulty, Difficulty::Easy);
            }
            _ => panic!("expected a quiz"),
        }
    }

    #[test]
    fn bad_answers_are_retried() {
        let validator = validator();
        for content in [
            "not json".to_owned(),
            content("Pluto"),
            json!({ "questions": [], "extra": 1 }).to_string(),
            json!({ "questions": [] }).to_string(),
        ] {
            assert!(
                matches!(
                    parse_quiz_content(&validator, &content, &config()),
                    RetryResult::Transient { .. }
                ),
                "{content}"
            );
        }
    }

    #[test]
    fn timeouts_are_transient() {
        assert!(LlmError::Timeout.is_known_transient());
    }
}
