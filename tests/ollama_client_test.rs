use futures::StreamExt;
use serde_json::json;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use parley::config::InferenceConfig;
use parley::error::ChatError;
use parley::inference::ollama::OllamaClient;
use parley::inference::{ChatMessage, ChatModel};

fn client(server: &MockServer) -> OllamaClient {
    OllamaClient::new(&InferenceConfig {
        host: server.uri(),
        stream_idle_timeout_secs: 5,
        ..Default::default()
    })
    .unwrap()
}

/// Serve one chat request: headers at once, then a single NDJSON line after `delay`.
async fn slow_body_server(delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\ntransfer-encoding: chunked\r\n\r\n",
            )
            .await
            .unwrap();
        socket.flush().await.unwrap();
        tokio::time::sleep(delay).await;
        let line = "{\"message\":{\"content\":\"Hel\"},\"done\":true}\n";
        let chunk = format!("{:x}\r\n{line}\r\n0\r\n\r\n", line.len());
        let _ = socket.write_all(chunk.as_bytes()).await;
        let _ = socket.flush().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
    });
    format!("http://{addr}")
}

/// Consume request headers and the `content-length` body.
async fn read_request(socket: &mut tokio::net::TcpStream) {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            return;
        }
        data.extend_from_slice(&buf[..n]);
        let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&data[..end]).to_ascii_lowercase();
        let length: usize = headers
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .map_or(0, |v| v.trim().parse().unwrap());
        if data.len() >= end + 4 + length {
            return;
        }
    }
}

fn client_with_idle_timeout(host: String, secs: u64) -> OllamaClient {
    OllamaClient::new(&InferenceConfig {
        host,
        stream_idle_timeout_secs: secs,
        ..Default::default()
    })
    .unwrap()
}

fn prompt() -> Vec<ChatMessage> {
    vec![ChatMessage::system("be brief"), ChatMessage::user("hi")]
}

#[tokio::test]
async fn stream_yields_deltas_and_skips_garbage() {
    let server = MockServer::start().await;
    let body = concat!(
        "{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n",
        "this is not json\n",
        "{\"message\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":false}\n",
        "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"model": "llama3.2", "stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;

    let stream = client(&server).stream("llama3.2", &prompt()).await.unwrap();
    let chunks: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
    assert_eq!(chunks, vec!["Hel", "lo"]);
}

#[tokio::test]
async fn upstream_error_fragment_ends_stream_with_provider_error() {
    let server = MockServer::start().await;
    let body = "{\"message\":{\"content\":\"a\"}}\n{\"error\":\"model crashed\"}\n{\"message\":{\"content\":\"b\"}}\n";
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let items: Vec<_> = client(&server)
        .stream("m", &prompt())
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap(), "a");
    assert!(matches!(&items[1], Err(ChatError::Provider(m)) if m == "model crashed"));
}

#[tokio::test]
async fn non_success_status_is_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(404).set_body_string("model 'nope' not found"))
        .mount(&server)
        .await;

    let err = match client(&server).stream("nope", &prompt()).await {
        Ok(_) => panic!("expected an error"),
        Err(e) => e,
    };
    match err {
        ChatError::Provider(message) => {
            assert!(message.contains("404"));
            assert!(message.contains("not found"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn complete_returns_message_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "m",
            "message": {"role": "assistant", "content": "Weekend Plans"},
            "done": true
        })))
        .mount(&server)
        .await;

    let reply = client(&server).complete("m", &prompt()).await.unwrap();
    assert_eq!(reply, "Weekend Plans");
}

#[tokio::test]
async fn list_models_reads_tags() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {"name": "llama3.2:latest", "modified_at": "2026-01-01T00:00:00Z", "size": 2019393189u64},
                {"name": "qwen3:8b"}
            ]
        })))
        .mount(&server)
        .await;

    let list = client(&server).list_models().await.unwrap();
    assert_eq!(list.models.len(), 2);
    assert_eq!(list.models[0].name, "llama3.2:latest");
    assert_eq!(list.models[0].size, Some(2019393189));
    assert!(list.models[1].modified_at.is_none());
}

#[tokio::test]
async fn zero_idle_timeout_waits_for_slow_body() {
    let host = slow_body_server(Duration::from_millis(100)).await;
    let items: Vec<_> = client_with_idle_timeout(host, 0)
        .stream("m", &prompt())
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].as_ref().unwrap(), "Hel");
}

#[tokio::test]
async fn idle_timeout_ends_stalled_stream() {
    let host = slow_body_server(Duration::from_secs(3)).await;
    let items: Vec<_> = client_with_idle_timeout(host, 1)
        .stream("m", &prompt())
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(items.len(), 1);
    assert!(matches!(&items[0], Err(ChatError::Provider(m)) if m.contains("no data from model")));
}
