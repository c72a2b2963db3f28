//! Client for OpenAI-compatible APIs (OpenAI itself, LiteLLM, Ollama, etc).

use async_openai::{Client, config::OpenAIConfig};

use crate::prelude::*;

/// Create an OpenAI-compatible client, configured by `OPENAI_API_KEY` and
/// `OPENAI_API_BASE`.
pub fn create_llm_client() -> Result<Client<OpenAIConfig>> {
    let mut client_config = OpenAIConfig::new();
    match std::env::var("OPENAI_API_KEY") {
        Ok(api_key) => client_config = client_config.with_api_key(api_key),
        Err(_) => warn!("OPENAI_API_KEY is not set; requests may be rejected"),
    }
    if let Ok(api_base) = std::env::var("OPENAI_API_BASE") {
        debug!(%api_base, "Using custom API base");
        client_config = client_config.with_api_base(api_base);
    }
    Ok(Client::with_config(client_config))
}
