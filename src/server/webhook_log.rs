use chrono::Utc;
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::inbound::InboundMessage;

#[derive(Debug, Clone, Serialize)]
pub struct LoggedWebhook {
    pub id: String,
    pub timestamp: String,
    pub raw: String,
    pub parsed: Option<InboundMessage>,
}

/// Most recent webhook payloads, oldest evicted first.
pub struct WebhookLog {
    entries: Mutex<VecDeque<LoggedWebhook>>,
    capacity: usize,
}

impl WebhookLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub async fn record(&self, raw: String, parsed: Option<&InboundMessage>) {
        let mut entries = self.entries.lock().await;
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(LoggedWebhook {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().to_rfc3339(),
            raw,
            parsed: parsed.cloned(),
        });
    }

    /// Newest first.
    pub async fn recent(&self, limit: usize) -> Vec<LoggedWebhook> {
        let entries = self.entries.lock().await;
        entries.iter().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn evicts_oldest_and_lists_newest_first() {
        let log = WebhookLog::new(2);
        log.record("a".into(), None).await;
        log.record("b".into(), None).await;
        log.record("c".into(), None).await;

        let recent = log.recent(10).await;
        let raws: Vec<_> = recent.iter().map(|e| e.raw.as_str()).collect();
        assert_eq!(raws, vec!["c", "b"]);
        assert_eq!(log.recent(1).await.len(), 1);
    }
}
