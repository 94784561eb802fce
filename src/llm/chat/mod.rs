pub mod gemini;
pub mod anthropic;
pub mod openrouter;

use async_trait::async_trait;
use serde::Deserialize;
use std::error::Error as StdError;
use std::sync::Arc;
use super::{ LlmConfig, LlmType };
use self::gemini::GeminiChatClient;
use self::anthropic::AnthropicChatClient;
use self::openrouter::OpenRouterChatClient;
use crate::models::chat::ChatMessage;
use rllm::chat::{ ChatMessage as RllmMessage, ChatRole, MessageType };

#[derive(Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Completes a conversation. `messages` are prior turns, oldest first,
    /// ending with the user's latest message.
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage]
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>>;

    fn get_model(&self) -> String;
    fn get_llm_type(&self) -> LlmType;
}

/// Maps stored turns onto the SDK's message type. Roles other than
/// user/assistant and empty turns are dropped.
pub(crate) fn to_rllm_messages(messages: &[ChatMessage]) -> Vec<RllmMessage> {
    messages
        .iter()
        .filter(|m| !m.content.trim().is_empty())
        .filter_map(|m| {
            let role = match m.role.as_str() {
                "user" => ChatRole::User,
                "assistant" => ChatRole::Assistant,
                _ => {
                    return None;
                }
            };
            Some(RllmMessage {
                role,
                content: m.content.clone(),
                message_type: MessageType::Text,
            })
        })
        .collect()
}

pub fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn ChatClient>, Box<dyn StdError + Send + Sync>> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Gemini => {
            let specific_client = GeminiChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::Anthropic => {
            let specific_client = AnthropicChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::OpenRouter => {
            let specific_client = OpenRouterChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}
