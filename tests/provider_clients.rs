//! Outbound HTTP clients exercised against one-shot local servers.

use serde_json::json;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use slothmd_relay::chart::host::ImageHost;
use slothmd_relay::chart::{ChartClient, ChartError, GraphRenderer};
use slothmd_relay::llm::chat::openrouter::OpenRouterChatClient;
use slothmd_relay::llm::chat::ChatClient;
use slothmd_relay::messaging::pinnacle::PinnacleClient;
use slothmd_relay::messaging::{DeliveryError, MessagingProvider};
use slothmd_relay::models::chat::ChatMessage;
use slothmd_relay::models::message::GraphRequest;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Reads one full request (headers plus `Content-Length` body).
async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.expect("read request");
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&data).to_string();
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if data.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&data).to_string()
}

/// Serves a single request with the given status and JSON body, returning
/// the base URL and a handle yielding the raw request.
async fn serve_once(status: &'static str, body: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind local test server");
    let addr = listener.local_addr().expect("local addr");

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept connection");
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.expect("write response");
        request
    });

    (format!("http://{}", addr), handle)
}

#[tokio::test]
async fn pinnacle_sends_sms_with_api_key() {
    let (base, server) = serve_once("200 OK", json!({ "messageId": "abc" }).to_string()).await;
    let client = PinnacleClient::new("test-key", &base, TIMEOUT).unwrap();

    let response = client.send_sms("+15551234", Some("+18330000"), "hello").await.unwrap();
    assert_eq!(response["messageId"], "abc");

    let request = server.await.unwrap();
    let lower = request.to_lowercase();
    assert!(request.starts_with("POST /send/sms "));
    assert!(lower.contains("pinnacle-api-key: test-key"));
    assert!(request.contains(r#""to":"+15551234""#));
    assert!(request.contains(r#""from":"+18330000""#));
}

#[tokio::test]
async fn pinnacle_reads_capabilities() {
    let (base, server) = serve_once("200 OK", json!({ "rcs_supported": true }).to_string()).await;
    let client = PinnacleClient::new("test-key", &base, TIMEOUT).unwrap();

    let caps = client.check_capabilities("+15551234").await.unwrap();
    assert!(caps.rcs_supported);

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /tools/capabilities "));
    assert!(request.contains(r#""phoneNumber":"+15551234""#));
}

#[tokio::test]
async fn pinnacle_surfaces_rejections() {
    let (base, server) = serve_once("400 Bad Request", json!({ "error": "invalid number" }).to_string()).await;
    let client = PinnacleClient::new("test-key", &base, TIMEOUT).unwrap();

    let media = vec!["https://img.example/g.png".to_string()];
    let err = client.send_mms("bogus", None, "hi", &media).await.unwrap_err();
    match err {
        DeliveryError::Rejected { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("invalid number"));
        }
        other => panic!("unexpected error: {}", other),
    }

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /send/mms "));
    assert!(request.contains(r#""mediaUrls":["https://img.example/g.png"]"#));
}

#[tokio::test]
async fn openrouter_posts_system_and_turns() {
    let reply = json!({
        "choices": [{ "message": { "role": "assistant", "content": "{\"text\": \"hi\"}" } }]
    });
    let (base, server) = serve_once("200 OK", reply.to_string()).await;
    let client = OpenRouterChatClient::new("or-key".into(), None, Some(base), TIMEOUT).unwrap();

    let turns = vec![ChatMessage { role: "user".into(), content: "hello".into(), timestamp: 0 }];
    let completion = client.complete("be kind", &turns).await.unwrap();
    assert_eq!(completion.response, r#"{"text": "hi"}"#);

    let request = server.await.unwrap();
    let lower = request.to_lowercase();
    assert!(request.starts_with("POST /chat/completions "));
    assert!(lower.contains("authorization: bearer or-key"));
    assert!(lower.contains("x-title: slothmd"));
    assert!(request.contains(r#""role":"system","content":"be kind""#));
}

#[tokio::test]
async fn chart_render_and_upload() {
    let (chart_base, chart_server) = serve_once("200 OK", json!({ "image_base64": "iVBORw0KGgo=" }).to_string()).await;
    let (host_url, host_server) = serve_once(
        "200 OK",
        json!({ "data": { "url": "https://i.example/abc.png" } }).to_string(),
    )
    .await;

    let host = ImageHost::new(&host_url, "host-key", TIMEOUT).unwrap();
    let charts = ChartClient::new(&chart_base, Some(host), TIMEOUT).unwrap();
    let graph = GraphRequest {
        kind: "bar".into(),
        data: json!({ "labels": ["A1C"], "values": [6.5] }),
    };

    let url = charts.resolve(&graph).await.unwrap();
    assert_eq!(url, "https://i.example/abc.png");

    let chart_request = chart_server.await.unwrap();
    assert!(chart_request.starts_with("POST /render-chart "));
    assert!(chart_request.contains(r#""type":"bar""#));
    assert!(chart_request.contains(r#""title":"Graph""#));

    let host_request = host_server.await.unwrap();
    assert!(host_request.contains("key=host-key"));
    assert!(host_request.contains("image=iVBORw0KGgo%3D"));
}

#[tokio::test]
async fn chart_service_errors_are_reported() {
    let (base, server) = serve_once("500 Internal Server Error", json!({ "error": "bad data" }).to_string()).await;
    let charts = ChartClient::new(&base, None, TIMEOUT).unwrap();
    let graph = GraphRequest { kind: "line".into(), data: json!({ "x": [1], "y": [2] }) };

    let err = charts.resolve(&graph).await.unwrap_err();
    assert!(matches!(err, ChartError::Service(ref msg) if msg == "bad data"));
    server.await.unwrap();
}
