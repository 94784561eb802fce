use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use std::collections::HashMap;
use std::error::Error;
use tokio::sync::RwLock;

use super::{ trim_to, HistoryStore };
use crate::models::chat::{ ChatMessage, Conversation };

pub const DEFAULT_MAX_CONVERSATIONS: usize = 10_000;

struct Thread {
    messages: Vec<ChatMessage>,
    touched: u64,
}

#[derive(Default)]
struct Threads {
    by_number: HashMap<String, Thread>,
    clock: u64,
}

/// Per-number history held in process memory. Lost on restart.
///
/// Each number keeps at most `max_messages` turns, and at most
/// `max_conversations` numbers are kept. Adding a message for a new number
/// past that cap evicts the number that was written to least recently.
pub struct MemoryHistoryStore {
    threads: RwLock<Threads>,
    max_messages: usize,
    max_conversations: usize,
}

impl MemoryHistoryStore {
    pub fn new(max_messages: usize) -> Self {
        Self {
            threads: RwLock::new(Threads::default()),
            max_messages: max_messages.max(1),
            max_conversations: DEFAULT_MAX_CONVERSATIONS,
        }
    }

    pub fn with_max_conversations(mut self, max_conversations: usize) -> Self {
        self.max_conversations = max_conversations.max(1);
        self
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn add_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut threads = self.threads.write().await;
        threads.clock += 1;
        let touched = threads.clock;

        if
            !threads.by_number.contains_key(conversation_id) &&
            threads.by_number.len() >= self.max_conversations
        {
            let stalest = threads.by_number
                .iter()
                .min_by_key(|(_, thread)| thread.touched)
                .map(|(number, _)| number.clone());
            if let Some(number) = stalest {
                debug!("Evicting in-memory history for {}", number);
                threads.by_number.remove(&number);
            }
        }

        let thread = threads.by_number
            .entry(conversation_id.to_string())
            .or_insert_with(|| Thread { messages: Vec::new(), touched });
        thread.touched = touched;
        thread.messages.push(ChatMessage {
            role: role.to_string(),
            content: content.to_string(),
            timestamp: Utc::now().timestamp(),
        });
        trim_to(&mut thread.messages, self.max_messages);
        Ok(())
    }

    async fn get_conversation(
        &self,
        conversation_id: &str,
        limit: usize
    ) -> Result<Conversation, Box<dyn Error + Send + Sync>> {
        let threads = self.threads.read().await;
        let mut messages = threads.by_number
            .get(conversation_id)
            .map(|thread| thread.messages.clone())
            .unwrap_or_default();
        trim_to(&mut messages, limit);
        Ok(Conversation {
            id: conversation_id.to_string(),
            messages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keeps_numbers_apart_and_bounded() {
        let store = MemoryHistoryStore::new(3);
        for i in 0..5 {
            store.add_message("+1555", "user", &format!("m{}", i)).await.unwrap();
        }
        store.add_message("+1666", "user", "other").await.unwrap();

        let all = store.get_conversation("+1555", 10).await.unwrap();
        let contents: Vec<_> = all.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);

        let recent = store.get_conversation("+1555", 2).await.unwrap();
        assert_eq!(recent.messages[0].content, "m3");

        let other = store.get_conversation("+1666", 10).await.unwrap();
        assert_eq!(other.messages.len(), 1);
        assert!(store.get_conversation("+1777", 5).await.unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn evicts_least_recently_written_number() {
        let store = MemoryHistoryStore::new(10).with_max_conversations(2);
        store.add_message("+1001", "user", "a").await.unwrap();
        store.add_message("+1002", "user", "b").await.unwrap();
        store.add_message("+1001", "assistant", "a2").await.unwrap();
        store.add_message("+1003", "user", "c").await.unwrap();

        assert!(store.get_conversation("+1002", 10).await.unwrap().messages.is_empty());
        assert_eq!(store.get_conversation("+1001", 10).await.unwrap().messages.len(), 2);
        assert_eq!(store.get_conversation("+1003", 10).await.unwrap().messages.len(), 1);

        // Existing numbers never trigger eviction.
        store.add_message("+1003", "assistant", "c2").await.unwrap();
        assert_eq!(store.get_conversation("+1001", 10).await.unwrap().messages.len(), 2);
    }
}
