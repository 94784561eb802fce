use async_trait::async_trait;
use crate::models::chat::{ ChatMessage, Conversation };
use crate::history::HistoryStore;
use std::error::Error;
use chrono::Utc;
use log::error;
use redis::{ Client, AsyncCommands };
use serde::{ Serialize, Deserialize };

#[derive(Serialize, Deserialize)]
struct StoredMessage {
    role: String,
    content: String,
    timestamp: i64,
}

/// Newest-first list per number, trimmed to `max_messages` on every write.
pub struct RedisHistoryStore {
    client: Client,
    key_prefix: String,
    max_messages: usize,
}

impl RedisHistoryStore {
    pub fn new(
        url: &str,
        key_prefix: &str,
        max_messages: usize
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        Ok(Self {
            client: Client::open(url)?,
            key_prefix: key_prefix.to_string(),
            max_messages: max_messages.max(1),
        })
    }

    fn key(&self, conversation_id: &str) -> String {
        format!("{}{}", self.key_prefix, conversation_id)
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }
}

#[async_trait]
impl HistoryStore for RedisHistoryStore {
    async fn add_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut conn = self.get_connection().await?;
        let key = self.key(conversation_id);

        let message = StoredMessage {
            role: role.to_string(),
            content: content.to_string(),
            timestamp: Utc::now().timestamp(),
        };

        let json_msg = serde_json::to_string(&message)?;
        let _: i64 = conn.lpush(&key, &json_msg).await?;
        let _: () = conn.ltrim(&key, 0, (self.max_messages as isize) - 1).await?;
        Ok(())
    }

    async fn get_conversation(
        &self,
        conversation_id: &str,
        limit: usize
    ) -> Result<Conversation, Box<dyn Error + Send + Sync>> {
        if limit == 0 {
            return Ok(Conversation { id: conversation_id.to_string(), messages: Vec::new() });
        }
        let mut conn = self.get_connection().await?;
        let key = self.key(conversation_id);
        let json_entries: Vec<String> = conn.lrange(&key, 0, (limit as isize) - 1).await?;
        let mut messages = Vec::new();

        for json_entry in &json_entries {
            match serde_json::from_str::<StoredMessage>(json_entry) {
                Ok(msg) => {
                    messages.push(ChatMessage {
                        role: msg.role,
                        content: msg.content,
                        timestamp: msg.timestamp,
                    });
                }
                Err(e) => {
                    error!("Error parsing history entry: {}", e);
                }
            }
        }
        messages.reverse();

        Ok(Conversation {
            id: conversation_id.to_string(),
            messages,
        })
    }
}
