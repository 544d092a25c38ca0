use crate::error::EngineError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct MessageRequest {
    pub(crate) model: String,
    pub(crate) max_tokens: u32,
    pub(crate) system: String,
    pub(crate) messages: Vec<MessageParam>,
    pub(crate) tools: Vec<ToolDefinitionApi>,
    pub(crate) stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageParam {
    User(UserMessage),
    Assistant(AssistantMessage),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMessage {
    role: String,
    content: Vec<ContentBlock>,
}

impl UserMessage {
    pub(crate) fn new(content: Vec<ContentBlock>) -> Self {
        Self {
            role: "user".to_string(),
            content,
        }
    }

    pub(crate) fn from_text(text: String) -> Self {
        Self::new(vec![ContentBlock::Text { text }])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    role: String,
    content: Vec<ContentBlock>,
}

impl AssistantMessage {
    pub(crate) fn new(content: Vec<ContentBlock>) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

impl ContentBlock {
    pub(crate) fn tool_result(tool_use_id: String, content: String, is_error: bool) -> Self {
        Self::ToolResult {
            tool_use_id,
            content,
            is_error: if is_error { Some(true) } else { None },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseContentBlock {
    Text { text: String },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ToolDefinitionApi {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) input_schema: serde_json::Value,
}

pub(crate) fn assistant_content_from_response(
    content: &[ResponseContentBlock],
) -> Vec<ContentBlock> {
    content
        .iter()
        .map(|content| match content {
            ResponseContentBlock::Text { text } => ContentBlock::Text { text: text.clone() },
            ResponseContentBlock::ToolUse { id, name, input } => ContentBlock::ToolUse {
                id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            },
        })
        .collect()
}

/// One event of a streaming Messages API response.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum StreamEvent {
    MessageStart {},
    ContentBlockStart {
        index: usize,
        content_block: StartBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: MessageDeltaBody,
    },
    MessageStop,
    Ping,
    Error {
        error: StreamErrorBody,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum StartBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageDeltaBody {
    pub(crate) stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StreamErrorBody {
    #[serde(rename = "type")]
    pub(crate) kind: String,
    pub(crate) message: String,
}

#[derive(Debug)]
enum PartialBlock {
    Text(String),
    ToolUse {
        id: String,
        name: String,
        json: String,
        input: Option<serde_json::Value>,
    },
    Skipped,
}

/// Rebuilds one assistant turn from its stream events.
#[derive(Debug, Default)]
pub(crate) struct TurnAccumulator {
    blocks: Vec<PartialBlock>,
    stop_reason: Option<String>,
    done: bool,
}

impl TurnAccumulator {
    /// Apply one event, returning any answer text it carried.
    pub(crate) fn apply(&mut self, event: StreamEvent) -> Result<Option<String>, EngineError> {
        match event {
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                let (block, text) = match content_block {
                    StartBlock::Text { text } => {
                        let initial = (!text.is_empty()).then(|| text.clone());
                        (PartialBlock::Text(text), initial)
                    }
                    StartBlock::ToolUse { id, name } => (
                        PartialBlock::ToolUse {
                            id,
                            name,
                            json: String::new(),
                            input: None,
                        },
                        None,
                    ),
                    StartBlock::Other => (PartialBlock::Skipped, None),
                };
                if self.blocks.len() <= index {
                    self.blocks.resize_with(index + 1, || PartialBlock::Skipped);
                }
                self.blocks[index] = block;
                Ok(text)
            }
            StreamEvent::ContentBlockDelta { index, delta } => {
                match (self.blocks.get_mut(index), delta) {
                    (Some(PartialBlock::Text(buf)), BlockDelta::TextDelta { text }) => {
                        buf.push_str(&text);
                        Ok(Some(text))
                    }
                    (
                        Some(PartialBlock::ToolUse { json, .. }),
                        BlockDelta::InputJsonDelta { partial_json },
                    ) => {
                        json.push_str(&partial_json);
                        Ok(None)
                    }
                    (None, _) => Err(EngineError::Stream(format!(
                        "delta for unknown content block {}",
                        index
                    ))),
                    _ => Ok(None),
                }
            }
            StreamEvent::ContentBlockStop { index } => {
                if let Some(PartialBlock::ToolUse { json, input, .. }) = self.blocks.get_mut(index)
                {
                    // Tools without arguments stream no JSON at all.
                    let value = if json.trim().is_empty() {
                        serde_json::Value::Object(Default::default())
                    } else {
                        serde_json::from_str(json)?
                    };
                    *input = Some(value);
                }
                Ok(None)
            }
            StreamEvent::MessageDelta { delta } => {
                if delta.stop_reason.is_some() {
                    self.stop_reason = delta.stop_reason;
                }
                Ok(None)
            }
            StreamEvent::MessageStop => {
                self.done = true;
                Ok(None)
            }
            StreamEvent::Error { error } => Err(EngineError::Stream(format!(
                "{}: {}",
                error.kind, error.message
            ))),
            StreamEvent::MessageStart {} | StreamEvent::Ping | StreamEvent::Unknown => Ok(None),
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    pub(crate) fn stop_reason(&self) -> Option<&str> {
        self.stop_reason.as_deref()
    }

    pub(crate) fn finish(self) -> Result<Vec<ResponseContentBlock>, EngineError> {
        if !self.done {
            return Err(EngineError::Stream(
                "response ended before message_stop".to_string(),
            ));
        }

        self.blocks
            .into_iter()
            .filter_map(|block| match block {
                PartialBlock::Text(text) if text.is_empty() => None,
                PartialBlock::Text(text) => Some(Ok(ResponseContentBlock::Text { text })),
                PartialBlock::ToolUse {
                    id, name, input, ..
                } => Some(
                    input
                        .map(|input| ResponseContentBlock::ToolUse { id, name, input })
                        .ok_or_else(|| {
                            EngineError::Stream("tool_use block was never closed".to_string())
                        }),
                ),
                PartialBlock::Skipped => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: serde_json::Value) -> StreamEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn assistant_content_from_response_maps_blocks() {
        let content = vec![
            ResponseContentBlock::Text {
                text: "hello".to_string(),
            },
            ResponseContentBlock::ToolUse {
                id: "tool_1".to_string(),
                name: "retrieve_realtime_stock_price".to_string(),
                input: json!({"symbol": "AMZN"}),
            },
        ];

        let content = assistant_content_from_response(&content);
        assert_eq!(content.len(), 2);
        match &content[0] {
            ContentBlock::Text { text } => assert_eq!(text, "hello"),
            _ => panic!("expected text block"),
        }
        match &content[1] {
            ContentBlock::ToolUse { id, name, input } => {
                assert_eq!(id, "tool_1");
                assert_eq!(name, "retrieve_realtime_stock_price");
                assert_eq!(input, &json!({"symbol": "AMZN"}));
            }
            _ => panic!("expected tool use block"),
        }
    }

    #[test]
    fn accumulator_rebuilds_text_and_tool_use() {
        let mut acc = TurnAccumulator::default();
        let events = [
            json!({"type": "message_start", "message": {"id": "msg_1", "model": "m"}}),
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Let me "}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "check."}}),
            json!({"type": "content_block_stop", "index": 0}),
            json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "tu_1", "name": "retrieve_realtime_stock_price", "input": {}}}),
            json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"symbol\": "}}),
            json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "\"AMZN\"}"}}),
            json!({"type": "content_block_stop", "index": 1}),
            json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 12}}),
            json!({"type": "ping"}),
            json!({"type": "message_stop"}),
        ];

        let mut text = String::new();
        for value in events {
            if let Some(delta) = acc.apply(event(value)).unwrap() {
                text.push_str(&delta);
            }
        }

        assert_eq!(text, "Let me check.");
        assert!(acc.is_done());
        assert_eq!(acc.stop_reason(), Some("tool_use"));
        assert_eq!(
            acc.finish().unwrap(),
            vec![
                ResponseContentBlock::Text {
                    text: "Let me check.".to_string()
                },
                ResponseContentBlock::ToolUse {
                    id: "tu_1".to_string(),
                    name: "retrieve_realtime_stock_price".to_string(),
                    input: json!({"symbol": "AMZN"}),
                },
            ]
        );
    }

    #[test]
    fn error_event_fails_the_turn() {
        let mut acc = TurnAccumulator::default();
        let err = acc
            .apply(event(json!({
                "type": "error",
                "error": {"type": "overloaded_error", "message": "Overloaded"}
            })))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "inference stream error: overloaded_error: Overloaded"
        );
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let mut acc = TurnAccumulator::default();
        acc.apply(event(json!({
            "type": "content_block_start", "index": 0,
            "content_block": {"type": "text", "text": "partial"}
        })))
        .unwrap();
        assert!(acc.finish().is_err());
    }
}
