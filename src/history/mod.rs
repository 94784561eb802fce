mod memory;
mod redis;

pub use memory::MemoryHistoryStore;

use async_trait::async_trait;
use log::info;
use std::error::Error;
use std::sync::Arc;
use crate::cli::Args;
use crate::models::chat::{ ChatMessage, Conversation };

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn add_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// The most recent `limit` messages, oldest first.
    async fn get_conversation(
        &self,
        conversation_id: &str,
        limit: usize
    ) -> Result<Conversation, Box<dyn Error + Send + Sync>>;
}

pub fn create_history_store(
    args: &Args
) -> Result<Arc<dyn HistoryStore>, Box<dyn Error + Send + Sync>> {
    match args.history_type.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(MemoryHistoryStore::new(args.history_max_turns))),
        "redis" => {
            let store = redis::RedisHistoryStore::new(
                &args.history_host,
                &args.history_redis_prefix,
                args.history_max_turns
            )?;
            Ok(Arc::new(store))
        }
        _ =>
            Err(
                Box::new(
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("Unsupported history store type: {}", args.history_type)
                    )
                )
            ),
    }
}

pub fn initialize_history_store(
    args: &Args
) -> Result<Arc<dyn HistoryStore>, Box<dyn Error + Send + Sync>> {
    match args.history_type.to_lowercase().as_str() {
        "redis" => info!("Chat history will be stored in redis at {}", args.history_host),
        other => info!("Chat history will be stored in: {}", other),
    }
    create_history_store(args)
}

/// Keeps the newest `max` messages.
pub(crate) fn trim_to(messages: &mut Vec<ChatMessage>, max: usize) {
    if messages.len() > max {
        let excess = messages.len() - max;
        messages.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn msg(role: &str, content: &str) -> ChatMessage {
        ChatMessage { role: role.into(), content: content.into(), timestamp: 0 }
    }

    #[test]
    fn trims_oldest_first() {
        let mut messages = vec![msg("user", "1"), msg("assistant", "2"), msg("user", "3")];
        trim_to(&mut messages, 2);
        assert_eq!(messages[0].content, "2");
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn rejects_unknown_store() {
        let args = Args::parse_from(["slothmd-relay", "--history-type", "qdrant"]);
        assert!(create_history_store(&args).is_err());
    }
}
