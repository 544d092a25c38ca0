use crate::error::EngineError;
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Raw progress of one agent run, before translation to wire events.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Started,
    ToolInvoking {
        name: String,
        args: serde_json::Value,
    },
    ToolReturned {
        name: String,
        output: String,
    },
    Token(String),
    Finished,
}

pub type EngineItem = Result<EngineEvent, EngineError>;

/// A lazy, ordered run. An `Err` item means the run failed and nothing
/// meaningful follows it.
pub type EngineStream = BoxStream<'static, EngineItem>;

pub trait AgentEngine: Send + Sync + 'static {
    /// Start answering `query`. The run should stop producing events soon
    /// after `cancel` fires or the returned stream is dropped.
    fn run(self: Arc<Self>, query: String, cancel: CancellationToken) -> EngineStream;
}
