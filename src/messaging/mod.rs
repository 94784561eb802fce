pub mod dispatcher;
pub mod image;
pub mod pinnacle;
pub mod reformat;

use async_trait::async_trait;
use serde::{ Deserialize, Serialize };
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::models::message::RichMessage;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("messaging provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("messaging provider rejected the request ({status}): {body}")]
    Rejected {
        status: u16,
        body: String,
    },
    #[error("messaging provider is not configured: {0}")]
    NotConfigured(String),
}

/// What the provider reports about a destination number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default, alias = "rcsSupported")]
    pub rcs_supported: bool,
}

/// Outbound half of a messaging provider.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn check_capabilities(&self, to: &str) -> Result<Capabilities, DeliveryError>;

    async fn send_sms(
        &self,
        to: &str,
        from: Option<&str>,
        text: &str
    ) -> Result<JsonValue, DeliveryError>;

    async fn send_mms(
        &self,
        to: &str,
        from: Option<&str>,
        text: &str,
        media_urls: &[String]
    ) -> Result<JsonValue, DeliveryError>;

    async fn send_rcs(
        &self,
        to: &str,
        from: Option<&str>,
        message: &RichMessage
    ) -> Result<JsonValue, DeliveryError>;
}
