#![allow(dead_code)]

use finagent::config::{FlushMode, ServerConfig};
use finagent::engine::{AgentEngine, EngineEvent, EngineStream};
use finagent::protocol::WireEvent;
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const API_KEY: &str = "test-api-key";

pub fn config() -> ServerConfig {
    ServerConfig {
        listen: "127.0.0.1:0".to_string(),
        api_key: API_KEY.to_string(),
        anthropic_api_key: "anthropic-test-key".to_string(),
        model: "test-model".to_string(),
        anthropic_url: "http://127.0.0.1:1".to_string(),
        market_data_url: "http://127.0.0.1:1".to_string(),
        stream_timeout: Duration::from_secs(30),
        gateway_timeout: Duration::from_secs(5),
        gateway_flush: FlushMode::Buffered,
        queue_capacity: 4,
    }
}

/// Serve `app` on an ephemeral port and return its base URL.
pub async fn spawn(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

/// Replays a fixed run and counts how often it was started.
pub struct Scripted {
    events: Vec<EngineEvent>,
    pub runs: AtomicUsize,
}

impl Scripted {
    pub fn new(events: Vec<EngineEvent>) -> Arc<Self> {
        Arc::new(Self {
            events,
            runs: AtomicUsize::new(0),
        })
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl AgentEngine for Scripted {
    fn run(self: Arc<Self>, _query: String, _cancel: CancellationToken) -> EngineStream {
        self.runs.fetch_add(1, Ordering::SeqCst);
        futures::stream::iter(self.events.clone().into_iter().map(Ok)).boxed()
    }
}

/// Keeps producing text and never finishes until cancelled.
pub struct Endless {
    pub cancelled: Arc<AtomicBool>,
}

impl Endless {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl AgentEngine for Endless {
    fn run(self: Arc<Self>, _query: String, cancel: CancellationToken) -> EngineStream {
        let cancelled = Arc::clone(&self.cancelled);
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        tokio::spawn(async move {
            let _ = tx.send(Ok(EngineEvent::Started)).await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_millis(50)) => {
                        if tx.send(Ok(EngineEvent::Token("working ".into()))).await.is_err() {
                            break;
                        }
                    }
                }
            }
            if cancel.is_cancelled() {
                cancelled.store(true, Ordering::SeqCst);
            }
        });
        tokio_stream::wrappers::ReceiverStream::new(rx).boxed()
    }
}

pub fn answer_text(events: &[WireEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            WireEvent::Content { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

/// Check the framing every stream must satisfy.
pub fn assert_well_formed(events: &[WireEvent]) {
    assert!(!events.is_empty(), "empty stream");
    assert!(
        matches!(events[0], WireEvent::Connection { .. }),
        "first event was {:?}",
        events[0]
    );
    let terminal = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminal, 1, "expected exactly one terminal event: {events:?}");
    assert!(events.last().unwrap().is_terminal());
    let connections = events
        .iter()
        .filter(|e| matches!(e, WireEvent::Connection { .. }))
        .count();
    assert_eq!(connections, 1);

    // Every tool_call gets exactly one tool_result before the next call.
    let mut open_call = false;
    for event in events {
        match event {
            WireEvent::ToolCall { .. } => {
                assert!(!open_call, "tool_call before previous tool_result: {events:?}");
                open_call = true;
            }
            WireEvent::ToolResult { .. } => {
                assert!(open_call, "tool_result without tool_call: {events:?}");
                open_call = false;
            }
            _ => {}
        }
    }
    if matches!(events.last(), Some(WireEvent::Complete { .. })) {
        assert!(!open_call, "run completed with an unanswered tool_call");
    }
}
