use crate::agent::SlothAgent;
use crate::cli::Args;
use crate::models::inbound::parse_webhook;
use super::webhook_log::WebhookLog;
use std::error::Error;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use axum::{
    routing::{get, post},
    Router,
    Json,
    body::Bytes,
    extract::{State, Query},
    response::{IntoResponse, Response},
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
};
use chrono::Utc;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tower_http::cors::{Any, CorsLayer};
use log::{info, warn, error};

type HmacSha256 = Hmac<Sha256>;

pub const TS_HEADER: &str = "X-Api-Ts";
pub const SIGN_HEADER: &str = "X-Api-Sign";
const MAX_CLOCK_SKEW_SECS: i64 = 300;
const DEFAULT_MESSAGES_LIMIT: usize = 50;

#[derive(Clone)]
pub struct AppState {
    agent: Arc<SlothAgent>,
    webhook_secret: Option<String>,
    limiter: Arc<DefaultDirectRateLimiter>,
    log: Arc<WebhookLog>,
}

impl AppState {
    pub fn new(
        agent: Arc<SlothAgent>,
        webhook_secret: Option<String>,
        requests_per_second: u32,
        log_capacity: usize,
    ) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            agent,
            webhook_secret: webhook_secret.filter(|s| !s.is_empty()),
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate))),
            log: Arc::new(WebhookLog::new(log_capacity)),
        }
    }
}

#[derive(Deserialize)]
pub struct MessagesQuery {
    pub limit: Option<usize>,
}

fn status_body(code: StatusCode, message: impl Into<String>) -> Response {
    (code, Json(json!({ "status": "error", "message": message.into() }))).into_response()
}

/// Checks `X-Api-Sign` = hex(HMAC-SHA256(secret, ts + body)) and that `X-Api-Ts`
/// is within five minutes of now.
pub fn verify_signature(secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<(), &'static str> {
    let ts = headers.get(TS_HEADER).and_then(|v| v.to_str().ok());
    let sig = headers.get(SIGN_HEADER).and_then(|v| v.to_str().ok());
    let (Some(ts), Some(sig)) = (ts, sig) else {
        return Err("missing ts/sig");
    };

    let ts_i: i64 = ts.trim().parse().map_err(|_| "bad timestamp")?;
    if (Utc::now().timestamp() - ts_i).abs() > MAX_CLOCK_SKEW_SECS {
        return Err("timestamp out of range");
    }

    let expected = hex::decode(sig.trim()).map_err(|_| "bad signature")?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| "bad secret")?;
    mac.update(ts.trim().as_bytes());
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| "bad signature")
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", post(webhook_handler))
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .route("/messages", get(messages_handler))
        .layer(cors)
        .with_state(state)
}

async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if state.limiter.check().is_err() {
        warn!("Webhook rate limit exceeded");
        return status_body(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded");
    }

    if let Some(secret) = &state.webhook_secret {
        if let Err(reason) = verify_signature(secret, &headers, &body) {
            warn!("Rejected webhook: {}", reason);
            return status_body(StatusCode::UNAUTHORIZED, reason);
        }
    }

    let raw = String::from_utf8_lossy(&body).into_owned();
    info!("Received webhook: {}", raw);
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());

    let inbound = match parse_webhook(content_type, &body) {
        Ok(inbound) => inbound,
        Err(e) => {
            warn!("Malformed webhook payload: {}", e);
            state.log.record(raw, None).await;
            return status_body(StatusCode::BAD_REQUEST, e.to_string());
        }
    };
    state.log.record(raw, Some(&inbound)).await;

    // Failures still answer 200 so the provider does not redeliver.
    match state.agent.handle_inbound(&inbound).await {
        Ok(receipt) => (
            StatusCode::OK,
            Json(json!({ "status": "success", "message_type": receipt.channel })),
        ).into_response(),
        Err(e) => status_body(StatusCode::OK, e.to_string()),
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn messages_handler(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_MESSAGES_LIMIT);
    Json(state.log.recent(limit).await)
}

pub async fn start_http_server(
    addr: &str,
    state: AppState,
    args: &Args,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = addr.parse::<SocketAddr>()?;
    let app = router(state);

    match (args.enable_tls, args.tls_cert_path.as_deref(), args.tls_key_path.as_deref()) {
        (true, Some(cert_path), Some(key_path)) => {
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                cert_path,
                key_path
            ).await?;
            info!("Starting HTTPS server on: https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await?;
        }
        (true, _, _) => {
            error!("ENABLE_TLS is set but TLS_CERT_PATH/TLS_KEY_PATH are missing");
            return Err("TLS enabled without certificate and key paths".into());
        }
        _ => {
            let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
                format!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e)
            })?;
            info!("Starting HTTP server on: http://{}", addr);
            axum::serve(listener, app.into_make_service()).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn signed_headers(secret: &str, ts: i64, body: &[u8]) -> HeaderMap {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(ts.to_string().as_bytes());
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());
        let mut headers = HeaderMap::new();
        headers.insert(TS_HEADER, HeaderValue::from_str(&ts.to_string()).unwrap());
        headers.insert(SIGN_HEADER, HeaderValue::from_str(&sig).unwrap());
        headers
    }

    #[test]
    fn accepts_valid_signature() {
        let body = br#"{"from":"+1555","text":"hi"}"#;
        let headers = signed_headers("s3cret", Utc::now().timestamp(), body);
        assert_eq!(verify_signature("s3cret", &headers, body), Ok(()));
    }

    #[test]
    fn rejects_tampering_and_stale_timestamps() {
        let body = br#"{"from":"+1555","text":"hi"}"#;
        let headers = signed_headers("s3cret", Utc::now().timestamp(), body);
        assert_eq!(verify_signature("s3cret", &headers, b"{}"), Err("bad signature"));
        assert_eq!(verify_signature("other", &headers, body), Err("bad signature"));

        let stale = signed_headers("s3cret", Utc::now().timestamp() - 301, body);
        assert_eq!(verify_signature("s3cret", &stale, body), Err("timestamp out of range"));
        assert_eq!(verify_signature("s3cret", &HeaderMap::new(), body), Err("missing ts/sig"));
    }
}
