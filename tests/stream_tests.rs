//! End-to-end streaming tests against a local HTTP server.
//!
//! These exercise the full request path: HTTP dispatch, SSE decoding, chunk
//! delivery, and stats finalization, using a canned server on a loopback
//! socket.  The final test talks to a real endpoint and only runs when
//! OPENAI_API_KEY is set.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use chatstream::{Message, OpenAi, Provider, StreamChunk};

/// Serves exactly one HTTP response on a fresh loopback listener and
/// returns the base URL to reach it.
async fn one_shot_server(response: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        // Read the request; a single read is enough for these small bodies.
        let mut buf = vec![0u8; 65536];
        let _ = socket.read(&mut buf).await.unwrap();
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
    });
    format!("http://{addr}/v1")
}

fn sse_response(events: &[&str]) -> String {
    let body: String = events
        .iter()
        .map(|event| format!("data: {event}\n\n"))
        .collect();
    format!(
        "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        body.len(),
        body,
    )
}

fn client(base_url: &str) -> OpenAi {
    OpenAi::new("test-key", base_url, "test-model", 0.7, 256).unwrap()
}

#[tokio::test]
async fn streams_deltas_in_order_and_finalizes_stats() {
    let response = sse_response(&[
        r#"{"choices":[{"delta":{"content":"Hello"}}]}"#,
        r#"{"choices":[{"delta":{"content":", "}}]}"#,
        r#"{"choices":[{"delta":{"content":"world"}}]}"#,
        "[DONE]",
    ]);
    let response: &'static str = Box::leak(response.into_boxed_str());
    let base_url = one_shot_server(response).await;

    let client = client(&base_url);
    let messages = [Message::user("hi")];
    let (mut chunks, stats) = client.start_stream(&messages).await.unwrap();

    let mut text = String::new();
    let mut saw_done = false;
    while let Some(chunk) = chunks.next().await {
        match chunk {
            StreamChunk::Content(fragment) => text.push_str(&fragment),
            StreamChunk::Done => {
                saw_done = true;
                break;
            }
            StreamChunk::Error(err) => panic!("unexpected error chunk: {err}"),
        }
    }

    assert!(saw_done);
    assert_eq!(text, "Hello, world");

    let snapshot = stats.snapshot();
    assert!(snapshot.is_finalized());
    assert_eq!(snapshot.output_tokens, 3);
    assert_eq!(snapshot.http_status, Some(200));
    assert!(snapshot.time_to_first_token.is_some());
    assert!(snapshot.total_latency > Duration::ZERO);
    assert!(snapshot.avg_tokens_per_sec.is_some());
}

#[tokio::test]
async fn skips_malformed_and_unrelated_lines() {
    let body = "event: ping\n\
                \n\
                data: {not json\n\
                \n\
                data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\
                \n\
                data: {\"choices\":[{\"delta\":{}}]}\n\
                \n\
                data: [DONE]\n\n";
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        body.len(),
        body,
    );
    let response: &'static str = Box::leak(response.into_boxed_str());
    let base_url = one_shot_server(response).await;

    let client = client(&base_url);
    let messages = [Message::user("hi")];
    let (mut chunks, stats) = client.start_stream(&messages).await.unwrap();

    let mut fragments = Vec::new();
    while let Some(chunk) = chunks.next().await {
        match chunk {
            StreamChunk::Content(fragment) => fragments.push(fragment),
            StreamChunk::Done => break,
            StreamChunk::Error(err) => panic!("unexpected error chunk: {err}"),
        }
    }

    // Only the well-formed non-empty delta produces a chunk.
    assert_eq!(fragments, vec!["ok"]);
    assert_eq!(stats.snapshot().output_tokens, 1);
}

#[tokio::test]
async fn connection_close_without_sentinel_ends_stream() {
    let body = "data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}\n\n";
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        body.len(),
        body,
    );
    let response: &'static str = Box::leak(response.into_boxed_str());
    let base_url = one_shot_server(response).await;

    let client = client(&base_url);
    let messages = [Message::user("hi")];
    let (mut chunks, stats) = client.start_stream(&messages).await.unwrap();

    match chunks.next().await {
        Some(StreamChunk::Content(fragment)) => assert_eq!(fragment, "tail"),
        other => panic!("expected content chunk, got {other:?}"),
    }
    assert!(matches!(chunks.next().await, Some(StreamChunk::Done)));
    assert!(stats.snapshot().is_finalized());
}

#[tokio::test]
async fn http_error_surfaces_before_streaming() {
    let body = r#"{"error":{"message":"invalid model"}}"#;
    let response = format!(
        "HTTP/1.1 404 Not Found\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        body.len(),
        body,
    );
    let response: &'static str = Box::leak(response.into_boxed_str());
    let base_url = one_shot_server(response).await;

    let client = client(&base_url);
    let messages = [Message::user("hi")];
    let err = client.start_stream(&messages).await.unwrap_err();

    assert!(err.is_api());
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn cancellation_stops_delivery_and_finalizes() {
    let response = sse_response(&[
        r#"{"choices":[{"delta":{"content":"one"}}]}"#,
        r#"{"choices":[{"delta":{"content":"two"}}]}"#,
        "[DONE]",
    ]);
    let response: &'static str = Box::leak(response.into_boxed_str());
    let base_url = one_shot_server(response).await;

    let client = client(&base_url);
    let messages = [Message::user("hi")];
    let (chunks, stats) = client.start_stream(&messages).await.unwrap();

    chunks.cancel();
    drop(chunks);

    // The reader observes cancellation and finalizes the stats exactly
    // once, whether or not any chunk was consumed.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if stats.snapshot().is_finalized() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("stats should finalize after cancellation");
}

#[tokio::test]
async fn non_streaming_chat_parses_content_and_usage() {
    let body = r#"{"choices":[{"message":{"content":"four"}}],"usage":{"prompt_tokens":9,"completion_tokens":1,"total_tokens":10}}"#;
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        body.len(),
        body,
    );
    let response: &'static str = Box::leak(response.into_boxed_str());
    let base_url = one_shot_server(response).await;

    let client = client(&base_url);
    let messages = [Message::user("2+2?")];
    let (content, stats) = client.chat(&messages).await.unwrap();

    assert_eq!(content, "four");
    assert_eq!(stats.input_tokens, 9);
    assert_eq!(stats.output_tokens, 1);
    assert!(stats.is_finalized());
}

#[tokio::test]
async fn live_streaming_response() {
    // This test requires OPENAI_API_KEY to be set
    let api_key = match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => key,
        _ => {
            eprintln!("Skipping test: OPENAI_API_KEY not set");
            return;
        }
    };

    let client = OpenAi::new(api_key, "https://api.openai.com/v1", "gpt-4o-mini", 0.0, 16)
        .expect("Failed to create client");
    let messages = [Message::user("Say 'test passed'")];
    let stream = client.start_stream(&messages).await;
    assert!(stream.is_ok(), "Stream request should succeed");
}
