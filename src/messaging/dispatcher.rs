use log::{ info, warn };
use serde_json::Value as JsonValue;
use std::sync::Arc;

use super::image::{ optimize_data_uri, ImageLimits };
use super::reformat::{ reformat_for_sms_mms, DEFAULT_TEXT_LIMIT };
use super::{ DeliveryError, MessagingProvider };
use crate::models::message::{ DeliveryChannel, RichMessage };
use crate::retry::{ with_retry, RetryPolicy };

#[derive(Debug, Clone)]
pub struct DeliverySettings {
    /// Skip the capability probe and always degrade to SMS/MMS.
    pub force_fallback: bool,
    pub text_limit: usize,
    pub image_limits: ImageLimits,
    pub retry: RetryPolicy,
    /// Sender number; when unset the number the user wrote to is used.
    pub from_number: Option<String>,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            force_fallback: false,
            text_limit: DEFAULT_TEXT_LIMIT,
            image_limits: ImageLimits::default(),
            retry: RetryPolicy::default(),
            from_number: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReceipt {
    pub channel: DeliveryChannel,
    pub response: JsonValue,
}

/// Sends replies over the richest channel the destination supports.
#[derive(Clone)]
pub struct DeliveryDispatcher {
    provider: Arc<dyn MessagingProvider>,
    settings: DeliverySettings,
}

impl DeliveryDispatcher {
    pub fn new(provider: Arc<dyn MessagingProvider>, settings: DeliverySettings) -> Self {
        Self { provider, settings }
    }

    fn sender<'a>(&'a self, reply_from: Option<&'a str>) -> Option<&'a str> {
        self.settings.from_number.as_deref().or(reply_from)
    }

    async fn rcs_supported(&self, to: &str) -> bool {
        if self.settings.force_fallback {
            info!("Forcing SMS/MMS fallback for {}", to);
            return false;
        }
        match self.provider.check_capabilities(to).await {
            Ok(caps) => caps.rcs_supported,
            Err(e) => {
                warn!("Capability check for {} failed, assuming no RCS: {}", to, e);
                false
            }
        }
    }

    /// Delivers `message` to `to`, degrading RCS → MMS → SMS.
    pub async fn send_message(
        &self,
        to: &str,
        reply_from: Option<&str>,
        mut message: RichMessage
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let from = self.sender(reply_from);

        for card in &mut message.cards {
            if let Some(url) = card.media_url.as_mut() {
                if url.starts_with("data:image") {
                    *url = optimize_data_uri(url, self.settings.image_limits);
                }
            }
        }

        if self.rcs_supported(to).await {
            let response = with_retry(self.settings.retry, "RCS send", || {
                self.provider.send_rcs(to, from, &message)
            }).await?;
            return Ok(DeliveryReceipt { channel: DeliveryChannel::Rcs, response });
        }

        info!("RCS not supported for {}, falling back to SMS/MMS", to);
        let sms = reformat_for_sms_mms(&message, self.settings.text_limit);

        if !sms.media_urls.is_empty() {
            let response = with_retry(self.settings.retry, "MMS send", || {
                self.provider.send_mms(to, from, &sms.text, &sms.media_urls)
            }).await?;
            return Ok(DeliveryReceipt { channel: DeliveryChannel::Mms, response });
        }

        self.send_text(to, reply_from, &sms.text).await
    }

    /// Plain SMS with the same retry budget.
    pub async fn send_text(
        &self,
        to: &str,
        reply_from: Option<&str>,
        text: &str
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let from = self.sender(reply_from);
        let response = with_retry(self.settings.retry, "SMS send", || {
            self.provider.send_sms(to, from, text)
        }).await?;
        Ok(DeliveryReceipt { channel: DeliveryChannel::Sms, response })
    }
}
