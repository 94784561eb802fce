pub mod host;

use async_trait::async_trait;
use log::{ info, warn };
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{ json, Map, Value as JsonValue };
use std::time::Duration;
use thiserror::Error;

use self::host::ImageHost;
use crate::models::message::{ Card, GraphRequest, RichMessage };

pub const SUPPORTED_GRAPH_TYPES: [&str; 3] = ["bar", "line", "scatter"];

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("unsupported graph type '{0}'")]
    UnsupportedType(String),
    #[error("graph data cannot be null")]
    MissingData,
    #[error("graph data must be a JSON object: {0}")]
    InvalidData(String),
    #[error("chart service request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("chart service error: {0}")]
    Service(String),
    #[error("image upload failed: {0}")]
    Upload(String),
}

/// Turns a graph request into an image URL the messaging provider can fetch.
#[async_trait]
pub trait GraphRenderer: Send + Sync {
    async fn resolve(&self, graph: &GraphRequest) -> Result<String, ChartError>;
}

/// Builds the render-service config from whatever shape the model produced.
///
/// Accepts an object or a JSON string, unwraps a nested `config`, and folds
/// `labels`/`values` or `x`/`y` arrays into `[{x, y}]` points when no `data`
/// array is given.
pub fn normalize_graph_data(kind: &str, data: &JsonValue) -> Result<JsonValue, ChartError> {
    let kind = kind.trim().to_lowercase();
    if !SUPPORTED_GRAPH_TYPES.contains(&kind.as_str()) {
        return Err(ChartError::UnsupportedType(kind));
    }

    let parsed;
    let data = match data {
        JsonValue::Null => {
            return Err(ChartError::MissingData);
        }
        JsonValue::String(s) => {
            parsed = serde_json
                ::from_str::<JsonValue>(s)
                .map_err(|e| ChartError::InvalidData(e.to_string()))?;
            &parsed
        }
        other => other,
    };
    let mut obj = data
        .as_object()
        .cloned()
        .ok_or_else(|| ChartError::InvalidData(format!("got {}", json_kind(data))))?;

    if let Some(JsonValue::Object(config)) = obj.remove("config") {
        obj = config;
    }

    let points = match obj.get("data") {
        Some(JsonValue::Array(points)) => JsonValue::Array(points.clone()),
        _ => fold_points(&obj),
    };
    let text = |key: &str, default: &str| -> JsonValue {
        obj.get(key)
            .and_then(|v| v.as_str())
            .map(|s| JsonValue::String(s.to_string()))
            .unwrap_or_else(|| JsonValue::String(default.to_string()))
    };

    Ok(
        json!({
        "type": kind,
        "config": {
            "data": points,
            "title": text("title", "Graph"),
            "xlabel": text("xlabel", "X Axis"),
            "ylabel": text("ylabel", "Y Axis"),
            "referenceLines": obj.get("referenceLines").cloned().unwrap_or_else(|| json!({})),
        }
    })
    )
}

fn fold_points(obj: &Map<String, JsonValue>) -> JsonValue {
    let pair = |xs: &str, ys: &str| -> Option<JsonValue> {
        let xs = obj.get(xs)?.as_array()?;
        let ys = obj.get(ys)?.as_array()?;
        Some(
            JsonValue::Array(
                xs
                    .iter()
                    .zip(ys.iter())
                    .map(|(x, y)| json!({ "x": x, "y": y }))
                    .collect()
            )
        )
    };
    pair("labels", "values")
        .or_else(|| pair("x", "y"))
        .unwrap_or_else(|| JsonValue::Array(Vec::new()))
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

#[derive(Deserialize)]
struct RenderResponse {
    image_base64: Option<String>,
    error: Option<String>,
}

/// Client for the external chart rendering service.
pub struct ChartClient {
    http: HttpClient,
    base_url: String,
    host: Option<ImageHost>,
}

impl ChartClient {
    pub fn new(
        base_url: &str,
        host: Option<ImageHost>,
        timeout: Duration
    ) -> Result<Self, ChartError> {
        let http = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            host,
        })
    }

    /// Renders a graph and returns the PNG as base64.
    pub async fn render(&self, graph: &GraphRequest) -> Result<String, ChartError> {
        let normalized = normalize_graph_data(&graph.kind, &graph.data)?;
        let body =
            json!({
            "type": normalized["type"],
            "data": normalized["config"]["data"],
            "config": normalized["config"],
        });
        info!("Rendering {} graph via {}", graph.kind, self.base_url);

        let resp = self.http.post(format!("{}/render-chart", self.base_url)).json(&body).send().await?;
        let status = resp.status();
        let parsed: RenderResponse = resp.json().await?;
        match (parsed.image_base64, parsed.error) {
            (Some(image), _) if status.is_success() && !image.is_empty() => Ok(image),
            (_, Some(error)) => Err(ChartError::Service(error)),
            _ => Err(ChartError::Service(format!("no image returned (HTTP {})", status))),
        }
    }
}

#[async_trait]
impl GraphRenderer for ChartClient {
    async fn resolve(&self, graph: &GraphRequest) -> Result<String, ChartError> {
        let image = self.render(graph).await?;
        match &self.host {
            Some(host) => host.upload(&image).await,
            None => {
                warn!("No image host configured; embedding chart as a data URI");
                Ok(format!("data:image/png;base64,{}", image))
            }
        }
    }
}

/// Index N of a `{GRAPH_URL_N}` placeholder.
pub fn graph_placeholder_index(value: &str) -> Option<usize> {
    value
        .trim()
        .strip_prefix("{GRAPH_URL_")
        .and_then(|rest| rest.strip_suffix('}'))
        .and_then(|n| n.parse().ok())
}

/// Replaces `{GRAPH_URL_0}` placeholders with the rendered chart, or drops
/// them when no chart is available. An unreferenced chart is attached to the
/// first card without media, or to a new card.
pub fn place_graph_url(message: &mut RichMessage, url: Option<&str>) {
    let mut placed = false;
    for card in &mut message.cards {
        let index = card.media_url.as_deref().and_then(graph_placeholder_index);
        match (index, url) {
            (Some(0), Some(url)) => {
                card.media_url = Some(url.to_string());
                placed = true;
            }
            (Some(_), _) => {
                card.media_url = None;
            }
            (None, _) => {}
        }
    }

    let Some(url) = url else {
        return;
    };
    if placed {
        return;
    }
    if let Some(i) = message.cards.iter().position(|c| c.media_url.is_none()) {
        message.cards[i].media_url = Some(url.to_string());
    } else {
        let title = message.graph
            .as_ref()
            .and_then(|g| g.data.get("title"))
            .and_then(|t| t.as_str())
            .map(str::to_string);
        message.cards.push(Card {
            title,
            media_url: Some(url.to_string()),
            ..Default::default()
        });
    }
}
