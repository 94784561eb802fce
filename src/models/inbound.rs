use serde::{ Deserialize, Serialize };
use serde_json::Value as JsonValue;
use thiserror::Error;
use url::form_urlencoded;

#[derive(Debug, Error)]
pub enum InboundError {
    #[error("webhook body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("webhook body is not valid UTF-8")]
    Encoding,
    #[error("missing sender number")]
    MissingSender,
    #[error("missing message text or button payload")]
    MissingContent,
}

/// A message received from the messaging provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    pub to: Option<String>,
    pub text: Option<String>,
    /// Set when the user tapped a button or quick reply instead of typing.
    pub payload: Option<String>,
}

impl InboundMessage {
    /// What the user said, falling back to the tapped button's payload.
    pub fn content(&self) -> &str {
        self.text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or(self.payload.as_deref())
            .unwrap_or("")
            .trim()
    }

    fn validated(self) -> Result<Self, InboundError> {
        if self.from.trim().is_empty() {
            return Err(InboundError::MissingSender);
        }
        if self.content().is_empty() {
            return Err(InboundError::MissingContent);
        }
        Ok(self)
    }
}

/// Parses a webhook body, choosing the decoder from the content type.
pub fn parse_webhook(content_type: Option<&str>, body: &[u8]) -> Result<InboundMessage, InboundError> {
    let is_form = content_type
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);
    if is_form {
        parse_form(body)
    } else {
        let value: JsonValue = serde_json::from_slice(body)?;
        parse_json(&value)
    }
}

pub fn parse_json(value: &JsonValue) -> Result<InboundMessage, InboundError> {
    let field = |keys: &[&str]| -> Option<String> {
        keys.iter().find_map(|k| {
            value
                .get(*k)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
    };

    let nested_text = value
        .get("message")
        .and_then(|m| m.get("text"))
        .and_then(|t| t.as_str())
        .map(str::to_string);

    InboundMessage {
        from: field(&["from", "From", "from_"]).unwrap_or_default(),
        to: field(&["to", "To"]),
        text: field(&["text", "Body", "body"]).or(nested_text),
        payload: field(&["payload"]),
    }.validated()
}

pub fn parse_form(body: &[u8]) -> Result<InboundMessage, InboundError> {
    std::str::from_utf8(body).map_err(|_| InboundError::Encoding)?;

    let mut msg = InboundMessage {
        from: String::new(),
        to: None,
        text: None,
        payload: None,
    };
    for (key, value) in form_urlencoded::parse(body) {
        let value = value.trim().to_string();
        match key.as_ref() {
            "From" | "from" => {
                msg.from = value;
            }
            "To" | "to" => {
                msg.to = Some(value).filter(|v| !v.is_empty());
            }
            "Body" | "text" => {
                msg.text = Some(value).filter(|v| !v.is_empty());
            }
            "payload" => {
                msg.payload = Some(value).filter(|v| !v.is_empty());
            }
            _ => {}
        }
    }
    msg.validated()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_pinnacle_json() {
        let msg = parse_json(&json!({ "from": "+15551234567", "to": "+18337750778", "text": " hi " })).unwrap();
        assert_eq!(msg.from, "+15551234567");
        assert_eq!(msg.to.as_deref(), Some("+18337750778"));
        assert_eq!(msg.content(), "hi");
    }

    #[test]
    fn skips_null_and_blank_aliases() {
        let msg = parse_json(&json!({ "from": null, "From": "+1555", "text": "", "Body": "hi" })).unwrap();
        assert_eq!(msg.from, "+1555");
        assert_eq!(msg.content(), "hi");

        let msg = parse_json(&json!({ "from": "  ", "from_": "+1666", "body": "ok" })).unwrap();
        assert_eq!(msg.from, "+1666");
    }

    #[test]
    fn button_click_uses_payload() {
        let msg = parse_json(&json!({ "from": "+15551234567", "payload": "EXPLAIN_GLUCOSE_ALERT" })).unwrap();
        assert_eq!(msg.text, None);
        assert_eq!(msg.content(), "EXPLAIN_GLUCOSE_ALERT");
    }

    #[test]
    fn parses_form_encoded_body() {
        let body = b"From=%2B15551234567&To=%2B18337750778&Body=My+glucose+feels+low";
        let msg = parse_webhook(Some("application/x-www-form-urlencoded"), body).unwrap();
        assert_eq!(msg.from, "+15551234567");
        assert_eq!(msg.content(), "My glucose feels low");
    }

    #[test]
    fn rejects_missing_fields() {
        assert!(matches!(parse_json(&json!({ "text": "hello" })), Err(InboundError::MissingSender)));
        assert!(
            matches!(parse_json(&json!({ "from": "+1555", "text": "  " })), Err(InboundError::MissingContent))
        );
        assert!(matches!(parse_webhook(None, b"not json"), Err(InboundError::Json(_))));
    }
}
