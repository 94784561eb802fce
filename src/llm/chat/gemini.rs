use async_trait::async_trait;
use std::error::Error as StdError;
use std::time::Duration;
use log::info;

use super::{ ChatClient, CompletionResponse, to_rllm_messages };
use crate::llm::{ LlmConfig, LlmType };
use crate::models::chat::ChatMessage;
use rllm::builder::{ LLMBackend, LLMBuilder };

pub struct GeminiChatClient {
    api_key: String,
    model: String,
    base_url: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    timeout: Duration,
}

impl GeminiChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
        timeout: Duration
    ) -> Self {
        let chat_model = model.unwrap_or_else(|| "gemini-2.0-flash".to_string());
        Self {
            api_key,
            model: chat_model,
            base_url,
            max_tokens,
            temperature,
            timeout,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| "Google API key is required for GeminiChatClient".to_string())?;

        Ok(
            Self::new(
                api_key,
                config.completion_model.clone(),
                config.base_url.clone(),
                config.max_tokens,
                config.temperature,
                Duration::from_secs(config.timeout_secs)
            )
        )
    }
}

#[async_trait]
impl ChatClient for GeminiChatClient {
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage]
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        info!(
            "GeminiChatClient::complete() → model={} base_url={:?} turns={}",
            self.model,
            self.base_url,
            messages.len()
        );

        // The system prompt is a builder setting, so the provider is built per call.
        let mut builder = LLMBuilder::new()
            .backend(LLMBackend::Google)
            .api_key(self.api_key.clone())
            .model(&self.model)
            .system(system)
            .stream(false);

        if let Some(url) = &self.base_url {
            builder = builder.base_url(url);
        }
        if let Some(tokens) = self.max_tokens {
            builder = builder.max_tokens(tokens);
        }
        if let Some(temp) = self.temperature {
            builder = builder.temperature(temp);
        }
        let llm = builder.build()?;

        let chat_messages = to_rllm_messages(messages);
        let resp = tokio::time::timeout(self.timeout, llm.chat(&chat_messages)).await
            .map_err(|_| format!("Gemini request timed out after {:?}", self.timeout))??;
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
        LlmType::Gemini
    }
}
