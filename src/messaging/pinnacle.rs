use async_trait::async_trait;
use log::{ debug, info };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE } };
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Duration;

use super::{ Capabilities, DeliveryError, MessagingProvider };
use crate::models::message::{ Card, QuickReply, RichMessage };

const API_KEY_HEADER: &str = "PINNACLE-API-KEY";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CapabilityRequest<'a> {
    phone_number: &'a str,
}

#[derive(Serialize)]
struct SmsRequest<'a> {
    to: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MmsRequest<'a> {
    to: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
    text: &'a str,
    media_urls: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RcsRequest<'a> {
    to: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "<[Card]>::is_empty")]
    cards: &'a [Card],
    #[serde(skip_serializing_if = "<[QuickReply]>::is_empty")]
    quick_replies: &'a [QuickReply],
}

/// REST client for the Pinnacle SMS/MMS/RCS API.
pub struct PinnacleClient {
    http: HttpClient,
    base_url: String,
}

impl PinnacleClient {
    pub fn new(
        api_key: &str,
        base_url: &str,
        timeout: Duration
    ) -> Result<Self, DeliveryError> {
        if api_key.trim().is_empty() {
            return Err(DeliveryError::NotConfigured("PINNACLE_API_KEY is not set".to_string()));
        }
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            API_KEY_HEADER,
            HeaderValue::from_str(api_key.trim()).map_err(|e|
                DeliveryError::NotConfigured(format!("Invalid API key format: {}", e))
            )?
        );

        let http = HttpClient::builder().default_headers(headers).timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        route: &str,
        body: &T
    ) -> Result<JsonValue, DeliveryError> {
        let url = format!("{}{}", self.base_url, route);
        debug!("POST {}", url);
        let resp = self.http.post(&url).json(body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(DeliveryError::Rejected { status: status.as_u16(), body: text });
        }
        if text.trim().is_empty() {
            return Ok(JsonValue::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(JsonValue::String(text)))
    }
}

#[async_trait]
impl MessagingProvider for PinnacleClient {
    async fn check_capabilities(&self, to: &str) -> Result<Capabilities, DeliveryError> {
        let value = self.post("/tools/capabilities", &(CapabilityRequest { phone_number: to })).await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    async fn send_sms(
        &self,
        to: &str,
        from: Option<&str>,
        text: &str
    ) -> Result<JsonValue, DeliveryError> {
        info!("Sending SMS to {}", to);
        self.post("/send/sms", &(SmsRequest { to, from, text })).await
    }

    async fn send_mms(
        &self,
        to: &str,
        from: Option<&str>,
        text: &str,
        media_urls: &[String]
    ) -> Result<JsonValue, DeliveryError> {
        info!("Sending MMS to {}", to);
        self.post("/send/mms", &(MmsRequest { to, from, text, media_urls })).await
    }

    async fn send_rcs(
        &self,
        to: &str,
        from: Option<&str>,
        message: &RichMessage
    ) -> Result<JsonValue, DeliveryError> {
        info!("Sending RCS message to {}", to);
        let req = RcsRequest {
            to,
            from,
            text: message.text.as_deref(),
            cards: &message.cards,
            quick_replies: &message.quick_replies,
        };
        self.post("/send/rcs", &req).await
    }
}
