use serde::{Deserialize, Serialize};

pub const CONNECTED_MESSAGE: &str = "Connected to stock analysis agent";
pub const COMPLETE_MESSAGE: &str = "Response complete";
pub const TIMEOUT_MESSAGE: &str = "timeout";

#[derive(Debug, Serialize, Deserialize)]
pub struct InvokeRequest {
    #[serde(default)]
    pub query: String,
}

/// One unit of the outward-facing stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    Connection { message: String },
    ToolCall {
        name: String,
        args: serde_json::Value,
    },
    Content { text: String },
    ToolResult { content: String },
    Complete { message: String },
    Error { message: String },
}

impl WireEvent {
    pub fn connected() -> Self {
        Self::Connection {
            message: CONNECTED_MESSAGE.to_string(),
        }
    }

    pub fn complete() -> Self {
        Self::Complete {
            message: COMPLETE_MESSAGE.to_string(),
        }
    }

    pub fn timeout() -> Self {
        Self::Error {
            message: TIMEOUT_MESSAGE.to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    pub fn to_json(&self) -> String {
        // WireEvent only holds strings and JSON values, which always serialize.
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"type":"error","message":"encoding failed"}"#.to_string())
    }
}

/// Encode one event as a server-sent-events frame.
pub fn encode_frame(event: &WireEvent) -> String {
    format!("data: {}\n\n", event.to_json())
}

/// Split a raw SSE body into the JSON payloads of its `data:` lines.
pub fn extract_sse_data(raw: &str) -> Option<String> {
    let mut data_lines = Vec::new();
    for line in raw.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(data) = line.strip_prefix("data:") {
            data_lines.push(data.trim_start().to_string());
        }
    }

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

/// Decode every frame in a complete event-stream body, skipping comments and
/// anything that is not a WireEvent.
pub fn decode_frames(body: &str) -> Vec<WireEvent> {
    let body = body.replace("\r\n", "\n");
    body.split("\n\n")
        .filter_map(extract_sse_data)
        .filter_map(|data| serde_json::from_str(&data).ok())
        .collect()
}
