//! Maps raw engine events onto wire events.
//!
//! The translator owns the framing invariant of a stream: `connection`
//! comes first exactly once, at most one terminal event is produced, and
//! nothing follows it. Answer text is cut into word-sized fragments.

use crate::engine::{EngineEvent, EngineItem};
use crate::protocol::WireEvent;
use uuid::Uuid;

pub struct Translator {
    correlation_id: Uuid,
    connected: bool,
    finished: bool,
}

impl Translator {
    pub fn new(correlation_id: Uuid) -> Self {
        Self {
            correlation_id,
            connected: false,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn translate(&mut self, item: EngineItem) -> Vec<WireEvent> {
        if self.finished {
            return Vec::new();
        }

        let mut out = Vec::new();
        if !self.connected {
            self.connected = true;
            out.push(WireEvent::connected());
        }

        match item {
            Ok(EngineEvent::Started) => {}
            Ok(EngineEvent::ToolInvoking { name, args }) => {
                out.push(WireEvent::ToolCall { name, args });
            }
            Ok(EngineEvent::ToolReturned { output, .. }) => {
                out.push(WireEvent::ToolResult { content: output });
            }
            Ok(EngineEvent::Token(text)) => {
                out.extend(
                    split_words(&text)
                        .map(|fragment| WireEvent::Content {
                            text: fragment.to_string(),
                        }),
                );
            }
            Ok(EngineEvent::Finished) => {
                self.finished = true;
                out.push(WireEvent::complete());
            }
            Err(err) => {
                tracing::error!(
                    correlation_id = %self.correlation_id,
                    error = %err,
                    "agent run failed"
                );
                out.push(self.failure());
            }
        }
        out
    }

    /// The terminal event for a run that ended without one.
    pub fn abandoned(&mut self) -> Vec<WireEvent> {
        if self.finished {
            return Vec::new();
        }
        tracing::error!(
            correlation_id = %self.correlation_id,
            "agent run ended without a final answer"
        );

        let mut out = Vec::new();
        if !self.connected {
            self.connected = true;
            out.push(WireEvent::connected());
        }
        out.push(self.failure());
        out
    }

    fn failure(&mut self) -> WireEvent {
        self.finished = true;
        WireEvent::Error {
            message: format!(
                "Agent execution failed (reference: {})",
                self.correlation_id
            ),
        }
    }
}

/// Split text into fragments of one word plus the whitespace after it.
/// Leading whitespace stays with the first fragment, so the fragments
/// always concatenate back to `text`.
pub fn split_words(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let word_start = rest
            .find(|c: char| !c.is_whitespace())
            .unwrap_or(rest.len());
        let word_end = rest[word_start..]
            .find(char::is_whitespace)
            .map_or(rest.len(), |i| word_start + i);
        let end = rest[word_end..]
            .find(|c: char| !c.is_whitespace())
            .map_or(rest.len(), |i| word_end + i);

        let (fragment, tail) = rest.split_at(end);
        rest = tail;
        Some(fragment)
    })
}
