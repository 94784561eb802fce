use async_trait::async_trait;
use std::error::Error as StdError;
use std::time::Duration;
use log::info;

use super::{ ChatClient, CompletionResponse, to_rllm_messages };
use crate::llm::{ LlmConfig, LlmType };
use crate::models::chat::ChatMessage;
use rllm::builder::{ LLMBackend, LLMBuilder };

const DEFAULT_MAX_TOKENS: u32 = 1000;

pub struct AnthropicChatClient {
    api_key: String,
    model: String,
    base_url: Option<String>,
    max_tokens: u32,
    temperature: Option<f32>,
    timeout: Duration,
}

impl AnthropicChatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| "Anthropic API key is required for AnthropicChatClient".to_string())?;

        Ok(Self {
            api_key,
            model: config.completion_model
                .clone()
                .unwrap_or_else(|| "claude-3-5-haiku-latest".to_string()),
            base_url: config.base_url.clone(),
            // Anthropic rejects requests without an explicit token ceiling.
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

#[async_trait]
impl ChatClient for AnthropicChatClient {
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage]
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        info!("AnthropicChatClient::complete() → model={} turns={}", self.model, messages.len());

        let mut builder = LLMBuilder::new()
            .backend(LLMBackend::Anthropic)
            .api_key(self.api_key.clone())
            .model(&self.model)
            .system(system)
            .max_tokens(self.max_tokens)
            .stream(false);

        if let Some(url) = &self.base_url {
            builder = builder.base_url(url);
        }
        if let Some(temp) = self.temperature {
            builder = builder.temperature(temp);
        }
        let llm = builder.build()?;

        let chat_messages = to_rllm_messages(messages);
        if chat_messages.is_empty() {
            return Err("Anthropic requires at least one user turn".into());
        }
        let resp = tokio::time::timeout(self.timeout, llm.chat(&chat_messages)).await
            .map_err(|_| format!("Anthropic request timed out after {:?}", self.timeout))??;
        let text = resp
            .text()
            .map(|s| s.to_string())
            .unwrap_or_else(|| resp.to_string());
        Ok(CompletionResponse { response: text })
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_llm_type(&self) -> LlmType {
        LlmType::Anthropic
    }
}
