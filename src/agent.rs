use crate::ai_sdk::{
    AssistantMessage, ContentBlock, MessageParam, MessageRequest, ResponseContentBlock,
    StreamEvent, ToolDefinitionApi, TurnAccumulator, UserMessage,
    assistant_content_from_response,
};
use crate::config::ServerConfig;
use crate::engine::{AgentEngine, EngineEvent, EngineItem, EngineStream};
use crate::error::EngineError;
use crate::sse::data_events;
use crate::tools::{MarketClient, ToolRegistry};
use chrono::{NaiveDate, Utc};
use futures::StreamExt;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

const MAX_TURNS: usize = 10;
const MAX_TOKENS: u32 = 4096;
const ENGINE_QUEUE: usize = 16;
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct Agent {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    tools: ToolRegistry,
}

impl Agent {
    pub fn new(api_key: String, base_url: String, model: String, tools: ToolRegistry) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
            model,
            tools,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        let market = MarketClient::new(config.market_data_url.clone());
        Self::new(
            config.anthropic_api_key.clone(),
            config.anthropic_url.clone(),
            config.model.clone(),
            ToolRegistry::new(market),
        )
    }

    fn request(&self, conversation: &[MessageParam]) -> MessageRequest {
        let tools_api: Vec<ToolDefinitionApi> = self
            .tools
            .definitions()
            .iter()
            .map(|t| ToolDefinitionApi {
                name: t.name.to_string(),
                description: t.description.to_string(),
                input_schema: t.input_schema.clone(),
            })
            .collect();

        MessageRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            system: system_prompt(Utc::now().date_naive()),
            messages: conversation.to_vec(),
            tools: tools_api,
            stream: true,
        }
    }

    /// Stream one assistant turn, forwarding text as it arrives.
    async fn stream_turn(
        &self,
        conversation: &[MessageParam],
        tx: &mpsc::Sender<EngineItem>,
    ) -> Result<Vec<ResponseContentBlock>, EngineError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&self.request(conversation))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await?;
            return Err(EngineError::Api { status, body });
        }

        let events = data_events(response.bytes_stream());
        tokio::pin!(events);

        let mut turn = TurnAccumulator::default();
        while let Some(data) = events.next().await {
            let event: StreamEvent = serde_json::from_str(&data?)?;
            if let Some(text) = turn.apply(event)? {
                emit(tx, EngineEvent::Token(text)).await?;
            }
            if turn.is_done() {
                break;
            }
        }

        tracing::debug!(stop_reason = ?turn.stop_reason(), "assistant turn complete");
        turn.finish()
    }

    async fn run_loop(
        &self,
        query: String,
        tx: &mpsc::Sender<EngineItem>,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let mut conversation = vec![MessageParam::User(UserMessage::from_text(query))];
        emit(tx, EngineEvent::Started).await?;

        for _ in 0..MAX_TURNS {
            let content = tokio::select! {
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                content = self.stream_turn(&conversation, tx) => content?,
            };

            conversation.push(MessageParam::Assistant(AssistantMessage::new(
                assistant_content_from_response(&content),
            )));

            let mut tool_results: Vec<ContentBlock> = Vec::new();
            for block in content {
                let ResponseContentBlock::ToolUse { id, name, input } = block else {
                    continue;
                };

                emit(
                    tx,
                    EngineEvent::ToolInvoking {
                        name: name.clone(),
                        args: input.clone(),
                    },
                )
                .await?;

                // A started tool call runs to completion even if the run is
                // cancelled meanwhile; its result is then dropped.
                let (output, is_error) = match self.tools.execute(&name, input).await {
                    Ok(output) => (output, false),
                    Err(err) => {
                        tracing::warn!(tool = %name, error = %err, "tool call failed");
                        (err.to_string(), true)
                    }
                };
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }

                emit(
                    tx,
                    EngineEvent::ToolReturned {
                        name,
                        output: output.clone(),
                    },
                )
                .await?;
                tool_results.push(ContentBlock::tool_result(id, output, is_error));
            }

            if tool_results.is_empty() {
                emit(tx, EngineEvent::Finished).await?;
                return Ok(());
            }
            conversation.push(MessageParam::User(UserMessage::new(tool_results)));
        }

        Err(EngineError::TurnLimit(MAX_TURNS))
    }
}

impl AgentEngine for Agent {
    fn run(self: Arc<Self>, query: String, cancel: CancellationToken) -> EngineStream {
        let (tx, rx) = mpsc::channel(ENGINE_QUEUE);
        tokio::spawn(async move {
            match self.run_loop(query, &tx, &cancel).await {
                Ok(()) => {}
                Err(EngineError::Cancelled) => tracing::debug!("agent run stopped"),
                Err(err) => {
                    let _ = tx.send(Err(err)).await;
                }
            }
        });
        ReceiverStream::new(rx).boxed()
    }
}

async fn emit(tx: &mpsc::Sender<EngineItem>, event: EngineEvent) -> Result<(), EngineError> {
    tx.send(Ok(event))
        .await
        .map_err(|_| EngineError::Cancelled)
}

fn system_prompt(today: NaiveDate) -> String {
    format!(
        "You are a financial data assistant. Today's date is {today}. \
         Use the available tools to look up stock prices before answering; \
         never guess a price. Resolve company names to their ticker symbols. \
         For historical questions pass explicit start_date and end_date values \
         (YYYY-MM-DD): a calendar quarter such as Q4 of last year runs from \
         October 1st to December 31st of the previous year. If a tool reports \
         an error, explain it briefly instead of retrying indefinitely."
    )
}
