use async_trait::async_trait;
use log::{ debug, info };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use std::time::Duration;

use super::{ ChatClient, CompletionResponse };
use crate::llm::{ LlmConfig, LlmType };
use crate::models::chat::ChatMessage;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "google/gemini-2.0-flash-lite-preview-02-05:free";
const APP_REFERER: &str = "https://slothmd.repl.co";
const APP_TITLE: &str = "SlothMD";

/// OpenAI-compatible chat completions through OpenRouter.
pub struct OpenRouterChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

#[derive(Serialize, Deserialize)]
struct OpenRouterMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OpenRouterChatRequest {
    model: String,
    messages: Vec<OpenRouterMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct OpenRouterResponse {
    choices: Vec<OpenRouterChoice>,
}

#[derive(Deserialize)]
struct OpenRouterChoice {
    message: OpenRouterMessage,
}

impl OpenRouterChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        timeout: Duration
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| format!("Invalid API key format: {}", e))?
        );
        headers.insert("HTTP-Referer", HeaderValue::from_static(APP_REFERER));
        headers.insert("X-Title", HeaderValue::from_static(APP_TITLE));

        let http = HttpClient::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        Ok(Self {
            http,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            max_tokens: None,
            temperature: None,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| "OpenRouter API key is required".to_string())?;

        let mut client = Self::new(
            api_key,
            config.completion_model.clone(),
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs)
        )?;
        client.max_tokens = config.max_tokens;
        client.temperature = config.temperature;
        Ok(client)
    }

    fn completions_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{}/chat/completions", base)
        }
    }
}

#[async_trait]
impl ChatClient for OpenRouterChatClient {
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage]
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        let url = self.completions_url();

        let mut request_messages = vec![OpenRouterMessage {
            role: "system".to_string(),
            content: system.to_string(),
        }];
        request_messages.extend(
            messages
                .iter()
                .filter(|m| !m.content.trim().is_empty())
                .map(|m| OpenRouterMessage {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
        );

        let req = OpenRouterChatRequest {
            model: self.model.clone(),
            messages: request_messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        info!("OpenRouterChatClient::complete() → model={} url={}", self.model, url);
        let resp = self.http.post(&url)
            .json(&req)
            .send()
            .await?
            .error_for_status()?
            .json::<OpenRouterResponse>()
            .await?;

        let content = resp.choices.first()
            .ok_or_else(|| "No response from OpenRouter API".to_string())?
            .message.content.clone();
        debug!("OpenRouter response: {}", content);

        Ok(CompletionResponse { response: content })
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_llm_type(&self) -> LlmType {
        LlmType::OpenRouter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completions_url_is_not_doubled() {
        let client = OpenRouterChatClient::new(
            "key".into(),
            None,
            Some("http://localhost:9000/api/v1/chat/completions/".into()),
            Duration::from_secs(5)
        ).unwrap();
        assert_eq!(client.completions_url(), "http://localhost:9000/api/v1/chat/completions");

        let client = OpenRouterChatClient::new("key".into(), None, None, Duration::from_secs(5)).unwrap();
        assert_eq!(client.completions_url(), "https://openrouter.ai/api/v1/chat/completions");
        assert_eq!(client.get_model(), DEFAULT_MODEL);
    }
}
