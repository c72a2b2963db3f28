//! Quizzes, and the LLM that writes them.

use clap::{Args, ValueEnum};
use schemars::{JsonSchema, r#gen::SchemaSettings};

use crate::{prelude::*, prompt::ChatPrompt};

pub mod llm;

/// Our built-in quiz prompt.
const DEFAULT_PROMPT: &str = include_str!("default_quiz_prompt.toml");

/// Load the built-in quiz prompt.
pub fn default_prompt() -> Result<ChatPrompt> {
    ChatPrompt::from_toml_str(DEFAULT_PROMPT)
}

/// How hard should the quiz be?
#[derive(
    Clone, Copy, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize, ValueEnum,
)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// What the user asked for.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QuizConfig {
    /// How many questions to ask.
    pub num_questions: u32,
    /// How hard the questions should be.
    pub difficulty: Difficulty,
    /// Time allowed, in minutes.
    pub time_limit: u32,
    /// Points the whole quiz is worth.
    pub total_points: u32,
}

impl QuizConfig {
    /// Make sure every count is at least 1.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("numQuestions", self.num_questions),
            ("timeLimit", self.time_limit),
            ("totalPoints", self.total_points),
        ] {
            if value < 1 {
                return Err(anyhow!("{} must be at least 1", name));
            }
        }
        Ok(())
    }
}

/// Quiz settings on the command line.
#[derive(Args, Clone, Debug)]
pub struct QuizOptions {
    /// How many questions to ask.
    #[clap(long, default_value = "5", value_parser = clap::value_parser!(u32).range(1..))]
    pub questions: u32,

    /// How hard the questions should be.
    #[clap(long, value_enum, default_value_t = Difficulty::default())]
    pub difficulty: Difficulty,

    /// Time allowed to take the quiz, in minutes.
    #[clap(long, default_value = "10", value_parser = clap::value_parser!(u32).range(1..))]
    pub time_limit: u32,

    /// Points the whole quiz is worth.
    #[clap(long, default_value = "100", value_parser = clap::value_parser!(u32).range(1..))]
    pub total_points: u32,
}

impl From<&QuizOptions> for QuizConfig {
    fn from(opts: &QuizOptions) -> Self {
        Self {
            num_questions: opts.questions,
            difficulty: opts.difficulty,
            time_limit: opts.time_limit,
            total_points: opts.total_points,
        }
    }
}

/// The kind of question.
#[derive(Clone, Copy, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    TrueFalse,
}

/// A single question.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Question {
    /// The question itself.
    pub question: String,
    /// Multiple choice or true/false.
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    /// The possible answers. For true/false questions, "True" and "False".
    pub options: Vec<String>,
    /// The correct answer, exactly as it appears in `options`.
    pub correct_answer: String,
    /// Why the correct answer is correct.
    pub explanation: String,
}

impl Question {
    /// Check that this question can actually be answered.
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            QuestionKind::MultipleChoice if self.options.len() < 2 => {
                return Err(anyhow!(
                    "multiple choice question has {} options: {:?}",
                    self.options.len(),
                    self.question
                ));
            }
            QuestionKind::TrueFalse if self.options.len() != 2 => {
                return Err(anyhow!(
                    "true/false question has {} options: {:?}",
                    self.options.len(),
                    self.question
                ));
            }
            _ => {}
        }
        if !self.options.contains(&self.correct_answer) {
            return Err(anyhow!(
                "correct answer {:?} is not one of the options for {:?}",
                self.correct_answer,
                self.question
            ));
        }
        Ok(())
    }
}

/// The questions, as written by the LLM.
#[derive(Clone, Debug, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QuizQuestions {
    /// The questions, in the order they should be asked.
    pub questions: Vec<Question>,
}

/// A complete quiz.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Quiz {
    /// The questions, in the order they should be asked.
    pub questions: Vec<Question>,
    /// Time allowed, in minutes.
    pub time_limit: u32,
    /// Points the whole quiz is worth.
    pub total_points: u32,
    /// How hard the questions are.
    pub difficulty: Difficulty,
}

impl Quiz {
    /// Assemble a quiz from generated questions, checking them against
    /// `config`.
    pub fn from_questions(questions: Vec<Question>, config: &QuizConfig) -> Result<Self> {
        if questions.len() != config.num_questions as usize {
            return Err(anyhow!(
                "asked for {} questions, got {}",
                config.num_questions,
                questions.len()
            ));
        }
        for question in &questions {
            question.validate()?;
        }
        Ok(Self {
            questions,
            time_limit: config.time_limit,
            total_points: config.total_points,
            difficulty: config.difficulty,
        })
    }
}

/// Something which writes quizzes.
#[async_trait]
pub trait QuizGenerator: Send + Sync + 'static {
    /// Write a quiz about `text`.
    async fn generate_quiz(&self, text: &str, config: &QuizConfig) -> Result<Quiz>;
}

/// A JSON Schema for `T`, in the form OpenAI's strict structured outputs
/// expect: no `$ref`s, no `format` annotations.
pub fn strict_json_schema<T: JsonSchema>() -> Result<Value> {
    let settings = SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
    });
    let schema = settings.into_generator().into_root_schema_for::<T>();
    let mut schema = serde_json::to_value(schema).context("cannot serialize schema")?;
    strip_formats(&mut schema);
    Ok(schema)
}

/// Remove `format` keywords, which strict mode mostly rejects.
fn strip_formats(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.get("format").is_some_and(Value::is_string) {
                map.remove("format");
            }
            map.values_mut().for_each(strip_formats);
        }
        Value::Array(values) => values.iter_mut().for_each(strip_formats),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(num_questions: u32) -> QuizConfig {
        QuizConfig {
            num_questions,
            difficulty: Difficulty::Hard,
            time_limit: 15,
            total_points: 50,
        }
    }

    fn true_false(question: &str, answer: &str) -> Question {
        Question {
            question: question.to_owned(),
            kind: QuestionKind::TrueFalse,
            options: vec!["True".to_owned(), "False".to_owned()],
            correct_answer: answer.to_owned(),
            explanation: "Because.".to_owned(),
        }
    }

    #[test]
    fn default_prompt_renders() -> Result<()> {
        let prompt = default_prompt()?;
        let messages = prompt.render(&json!({
            "text": "Mitochondria are the powerhouse of the cell.",
            "num_questions": 3,
            "difficulty": Difficulty::Easy,
            "time_limit": 5,
            "total_points": 30,
        }))?;
        let all = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        assert!(all.contains("Mitochondria are the powerhouse of the cell."));
        assert!(all.contains("3"));
        assert!(all.contains("Easy"));
        Ok(())
    }

    #[test]
    fn config_must_be_positive() {
        assert!(config(1).validate().is_ok());
        assert!(config(0).validate().is_err());
        let mut cfg = config(1);
        cfg.total_points = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn quiz_json_is_camel_case() -> Result<()> {
        let quiz = Quiz::from_questions(vec![true_false("Water is wet.", "True")], &config(1))?;
        let value = serde_json::to_value(&quiz)?;
        assert_eq!(value["timeLimit"], 15);
        assert_eq!(value["totalPoints"], 50);
        assert_eq!(value["difficulty"], "Hard");
        assert_eq!(value["questions"][0]["type"], "true_false");
        assert_eq!(value["questions"][0]["correctAnswer"], "True");
        Ok(())
    }

    #[test]
    fn question_counts_must_match() {
        let questions = vec![true_false("Water is wet.", "True")];
        assert!(Quiz::from_questions(questions, &config(2)).is_err());
    }

    #[test]
    fn answers_must_be_options() {
        let questions = vec![true_false("Water is wet.", "Yes")];
        assert!(Quiz::from_questions(questions, &config(1)).is_err());
    }

    #[test]
    fn multiple_choice_needs_choices() {
        let question = Question {
            question: "Pick one.".to_owned(),
            kind: QuestionKind::MultipleChoice,
            options: vec!["Only".to_owned()],
            correct_answer: "Only".to_owned(),
            explanation: String::new(),
        };
        assert!(question.validate().is_err());
    }

    #[test]
    fn response_schema_is_strict() -> Result<()> {
        let schema = strict_json_schema::<QuizQuestions>()?;
        let text = schema.to_string();
        assert!(!text.contains("$ref"));
        assert!(!text.contains("\"format\""));
        assert_eq!(schema["additionalProperties"], false);

        let question = &schema["properties"]["questions"]["items"];
        assert_eq!(question["additionalProperties"], false);
        let mut required = question["required"]
            .as_array()
            .expect("required should be an array")
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>();
        required.sort_unstable();
        assert_eq!(
            required,
            vec!["correctAnswer", "explanation", "options", "question", "type"]
        );
        Ok(())
    }
}
