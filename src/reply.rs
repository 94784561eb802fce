use log::{ error, warn };
use serde_json::Value as JsonValue;

use crate::models::message::{ GraphRequest, RichMessage };

pub const APOLOGY_TEXT: &str =
    "I apologize, but I encountered an error processing your request. How else can I help you today?";

const FENCE_OPEN: &str = "```json";
const FENCE: &str = "```";
const GRAPH_OPEN: &str = "GRAPH_DATA:";
const GRAPH_CLOSE: &str = "END_GRAPH_DATA";

/// Locates the reply JSON: a ```json fence first, then the first balanced
/// object. `None` means the content holds no JSON at all.
fn extract_json(content: &str) -> Option<&str> {
    if let Some(start) = content.find(FENCE_OPEN) {
        let body = &content[start + FENCE_OPEN.len()..];
        return Some(match body.find(FENCE) {
            Some(end) => body[..end].trim(),
            None => "{}",
        });
    }

    let start = content.find('{')?;
    let mut depth = 0usize;
    for (i, c) in content[start..].char_indices() {
        match c {
            '{' => {
                depth += 1;
            }
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(content[start..start + i + 1].trim());
                }
            }
            _ => {}
        }
    }
    Some("{}")
}

/// Text between `GRAPH_DATA:` and `END_GRAPH_DATA` (or end of content).
fn graph_block(content: &str) -> Option<&str> {
    let (_, rest) = content.split_once(GRAPH_OPEN)?;
    Some(rest.split(GRAPH_CLOSE).next().unwrap_or(rest))
}

fn parse_graph(value: &JsonValue) -> Option<GraphRequest> {
    let obj = value.as_object()?;
    if !obj.contains_key("type") || !obj.contains_key("data") {
        return None;
    }
    serde_json::from_value(value.clone()).ok()
}

/// Content with any graph block cut out, for replies that are plain prose.
fn strip_graph_block(content: &str) -> String {
    match content.split_once(GRAPH_OPEN) {
        Some((before, rest)) => {
            let after = rest.split_once(GRAPH_CLOSE).map(|(_, a)| a).unwrap_or("");
            format!("{}{}", before.trim_end(), after).trim().to_string()
        }
        None => content.trim().to_string(),
    }
}

/// Turns raw model output into a [`RichMessage`], never failing.
pub fn parse_model_reply(content: &str) -> RichMessage {
    let extracted = extract_json(content);
    let json_content = extracted.unwrap_or("{}");

    let mut value: JsonValue = match serde_json::from_str(json_content) {
        Ok(JsonValue::Object(map)) => JsonValue::Object(map),
        Ok(other) => {
            error!("Model reply JSON is not an object: {}", other);
            return RichMessage::text_only(APOLOGY_TEXT);
        }
        Err(e) => {
            error!("Failed to parse model JSON response: {}. Content: {}", e, json_content);
            return RichMessage::text_only(APOLOGY_TEXT);
        }
    };

    // The graph is optional; a malformed one must not sink the rest of the reply.
    let inline_graph = value
        .as_object_mut()
        .and_then(|obj| obj.remove("graph"))
        .and_then(|g| parse_graph(&g));

    let mut message: RichMessage = match serde_json::from_value(value) {
        Ok(message) => message,
        Err(e) => {
            error!("Model reply does not match the message format: {}", e);
            return RichMessage::text_only(APOLOGY_TEXT);
        }
    };
    message.graph = inline_graph;

    if let Some(block) = graph_block(content) {
        match serde_json::from_str::<JsonValue>(block.trim()) {
            Ok(v) =>
                match parse_graph(&v) {
                    Some(graph) => {
                        message.graph = Some(graph);
                    }
                    None => warn!("GRAPH_DATA block lacks type/data, keeping inline graph"),
                }
            Err(e) => {
                error!("Failed to parse graph data: {}", e);
                message.graph = None;
            }
        }
    }

    if extracted.is_none() && message.is_empty() {
        let prose = strip_graph_block(content);
        if !prose.is_empty() {
            message.text = Some(prose);
        }
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_fenced_json() {
        let content = "Sure!\n```json\n{\"text\": \"Your A1C is 6.5\", \"quick_replies\": [{\"title\": \"Labs\", \"type\": \"trigger\", \"payload\": \"check_labs\"}]}\n```\nThanks";
        let msg = parse_model_reply(content);
        assert_eq!(msg.text.as_deref(), Some("Your A1C is 6.5"));
        assert_eq!(msg.quick_replies[0].payload, "check_labs");
    }

    #[test]
    fn unclosed_fence_yields_empty_message() {
        let msg = parse_model_reply("```json\n{\"text\": \"cut off");
        assert!(msg.is_empty());
    }

    #[test]
    fn reads_first_balanced_object() {
        let content = r#"Here: {"text": "Hi", "cards": [{"title": "BP", "media_url": "{GRAPH_URL_0}"}]} trailing {"x": 1}"#;
        let msg = parse_model_reply(content);
        assert_eq!(msg.text.as_deref(), Some("Hi"));
        assert_eq!(msg.cards[0].media_url.as_deref(), Some("{GRAPH_URL_0}"));
    }

    #[test]
    fn graph_block_overrides_inline_graph() {
        let content = concat!(
            r#"{"text": "Trend", "graph": {"type": "bar", "data": {}}}"#,
            "\n",
            r#"GRAPH_DATA:{"type": "line", "data": {"x": ["Jan"], "y": [5]}}END_GRAPH_DATA"#
        );
        let msg = parse_model_reply(content);
        let graph = msg.graph.unwrap();
        assert_eq!(graph.kind, "line");
        assert_eq!(graph.data["y"][0], 5);
    }

    #[test]
    fn malformed_graph_block_clears_graph() {
        let content = r#"{"text": "Trend", "graph": {"type": "bar", "data": {}}} GRAPH_DATA:{"type": "line"END_GRAPH_DATA"#;
        let msg = parse_model_reply(content);
        assert_eq!(msg.text.as_deref(), Some("Trend"));
        assert!(msg.graph.is_none());

        let missing_data = r#"{"text": "Trend"} GRAPH_DATA:{"type": "line"}END_GRAPH_DATA"#;
        assert!(parse_model_reply(missing_data).graph.is_none());
    }

    #[test]
    fn typeless_graph_block_keeps_inline_graph() {
        let content = r#"{"text": "T", "graph": {"type": "bar", "data": {"labels": ["A"], "values": [1]}}} GRAPH_DATA:{"note": "x"}END_GRAPH_DATA"#;
        let graph = parse_model_reply(content).graph.unwrap();
        assert_eq!(graph.kind, "bar");
        assert_eq!(graph.data["values"][0], 1);
    }

    #[test]
    fn bad_inline_graph_is_dropped() {
        let msg = parse_model_reply(r#"{"text": "Hi", "graph": "bar chart please"}"#);
        assert_eq!(msg.text.as_deref(), Some("Hi"));
        assert!(msg.graph.is_none());
    }

    #[test]
    fn invalid_json_becomes_apology() {
        let msg = parse_model_reply(r#"{"text": "Hi",}"#);
        assert_eq!(msg, RichMessage::text_only(APOLOGY_TEXT));
        assert_eq!(parse_model_reply("```json\n[1, 2]\n```").text.as_deref(), Some(APOLOGY_TEXT));
    }

    #[test]
    fn plain_prose_is_used_as_text() {
        let msg = parse_model_reply("  Drink plenty of water and rest.  ");
        assert_eq!(msg.text.as_deref(), Some("Drink plenty of water and rest."));
    }
}
