//! Our prompt data type.

use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
};
use handlebars::Handlebars;
use schemars::JsonSchema;

use crate::{async_utils::io::read_json_or_toml, prelude::*};

/// A chat completion prompt, with handlebars templates in each message.
#[derive(Clone, Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ChatPrompt {
    /// The developer (aka "system") message, if any.
    #[serde(default)]
    pub developer: Option<String>,

    /// Messages.
    pub messages: Vec<Message>,
}

/// A user message, and optionally an example assistant response.
#[derive(Clone, Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Message {
    /// The user message.
    pub user: String,

    /// The assistant response, if any.
    #[serde(default)]
    pub assistant: Option<String>,
}

/// Who said it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message with all templates filled in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedMessage {
    pub role: Role,
    pub content: String,
}

impl ChatPrompt {
    /// Parse a prompt from TOML.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("Failed to parse prompt")
    }

    /// Load a prompt from a TOML or JSON file.
    pub async fn from_path(path: &Path) -> Result<Self> {
        read_json_or_toml(path).await
    }

    /// Fill in our templates using `bindings`.
    ///
    /// Templates are rendered in strict mode, so a reference to a missing
    /// binding is an error. Nothing is HTML-escaped.
    pub fn render(&self, bindings: &impl Serialize) -> Result<Vec<RenderedMessage>> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);
        let render = |template: &str| {
            handlebars
                .render_template(template, bindings)
                .context("Error rendering prompt template")
        };

        let mut messages = Vec::new();
        if let Some(developer) = &self.developer {
            messages.push(RenderedMessage {
                role: Role::System,
                content: render(developer)?,
            });
        }
        for message in &self.messages {
            messages.push(RenderedMessage {
                role: Role::User,
                content: render(&message.user)?,
            });
            if let Some(assistant) = &message.assistant {
                messages.push(RenderedMessage {
                    role: Role::Assistant,
                    content: render(assistant)?,
                });
            }
        }
        Ok(messages)
    }
}

/// Convert rendered messages into OpenAI request messages.
pub fn to_openai_messages(
    messages: &[RenderedMessage],
) -> Result<Vec<ChatCompletionRequestMessage>> {
    messages
        .iter()
        .map(|message| {
            let content = message.content.clone();
            let message: ChatCompletionRequestMessage = match message.role {
                Role::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(content)
                    .build()?
                    .into(),
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(content)
                    .build()?
                    .into(),
                Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(content)
                    .build()?
                    .into(),
            };
            Ok::<_, anyhow::Error>(message)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROMPT: &str = r#"
developer = "You write quizzes."

[[messages]]
user = "Quiz me on: {{text}}"
assistant = "{\"questions\": []}"

[[messages]]
user = "Again, {{count}} times."
"#;

    #[test]
    fn renders_every_message_in_order() -> Result<()> {
        let prompt = ChatPrompt::from_toml_str(PROMPT)?;
        let messages = prompt.render(&json!({ "text": "tides", "count": 2 }))?;
        let roles = messages.iter().map(|m| m.role).collect::<Vec<_>>();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(messages[1].content, "Quiz me on: tides");
        assert_eq!(messages[3].content, "Again, 2 times.");
        assert_eq!(to_openai_messages(&messages)?.len(), 4);
        Ok(())
    }

    #[test]
    fn does_not_html_escape() -> Result<()> {
        let prompt = ChatPrompt::from_toml_str(PROMPT)?;
        let messages = prompt.render(&json!({ "text": "a < b & \"c\"", "count": 1 }))?;
        assert_eq!(messages[1].content, "Quiz me on: a < b & \"c\"");
        Ok(())
    }

    #[test]
    fn missing_bindings_are_errors() -> Result<()> {
        let prompt = ChatPrompt::from_toml_str(PROMPT)?;
        assert!(prompt.render(&json!({ "text": "tides" })).is_err());
        Ok(())
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(ChatPrompt::from_toml_str("system = \"hi\"\nmessages = []").is_err());
    }
}
