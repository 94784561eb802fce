use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value as JsonValue };
use std::fmt;

/// A reply as the model produces it and as RCS delivers it.
///
/// The model writes snake_case keys (`media_url`, `quick_replies`) while the
/// provider expects camelCase, so both spellings are accepted and camelCase is
/// written back out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RichMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cards: Vec<Card>,
    #[serde(alias = "quick_replies", skip_serializing_if = "Vec::is_empty")]
    pub quick_replies: Vec<QuickReply>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphRequest>,
}

impl RichMessage {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.as_deref().map_or(true, |t| t.trim().is_empty()) &&
            self.cards.is_empty() &&
            self.quick_replies.is_empty()
    }

    /// Text used for conversation history: the main text, or the first card title.
    pub fn summary(&self) -> String {
        if let Some(text) = self.text.as_deref().filter(|t| !t.trim().is_empty()) {
            return text.to_string();
        }
        self.cards
            .iter()
            .find_map(|c| c.title.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Card {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(alias = "media_url", skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<Button>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Button {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuickReply {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: String,
    /// Provider-specific fields such as `eventStartTime`, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: JsonValue,
}

/// Plain-text rendition of a [`RichMessage`] for SMS/MMS.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsContent {
    pub text: String,
    pub media_urls: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryChannel {
    Rcs,
    Mms,
    Sms,
}

impl fmt::Display for DeliveryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeliveryChannel::Rcs => "rcs",
            DeliveryChannel::Mms => "mms",
            DeliveryChannel::Sms => "sms",
        };
        write!(f, "{}", name)
    }
}
