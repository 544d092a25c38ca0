use crate::error::ToolError;
use std::future::Future;
use std::pin::Pin;

mod historical_price;
pub(crate) mod market;
mod realtime_price;

pub use market::MarketClient;

type ToolHandler = fn(
    MarketClient,
    serde_json::Value,
) -> Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send>>;

pub(crate) struct ToolDefinition {
    pub(crate) name: &'static str,
    pub(crate) description: &'static str,
    pub(crate) input_schema: serde_json::Value,
    pub(crate) handler: ToolHandler,
}

pub(crate) fn get_all_tools() -> Vec<ToolDefinition> {
    vec![
        realtime_price::definition(),
        historical_price::definition(),
    ]
}

/// The tools the agent may call, bound to one market data source.
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    market: MarketClient,
}

impl ToolRegistry {
    pub fn new(market: MarketClient) -> Self {
        Self {
            tools: get_all_tools(),
            market,
        }
    }

    pub(crate) fn definitions(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub async fn execute(&self, name: &str, input: serde_json::Value) -> Result<String, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        (tool.handler)(self.market.clone(), input).await
    }
}
