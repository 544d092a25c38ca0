use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};

use super::{MarketClient, ToolDefinition};
use crate::error::ToolError;

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct RealtimePriceInput {
    #[schemars(description = "The stock ticker symbol (e.g., 'AMZN' for Amazon).")]
    symbol: String,
}

pub(super) fn normalize_symbol(symbol: &str) -> Result<String, ToolError> {
    let symbol = symbol.trim().to_ascii_uppercase();
    if symbol.is_empty() {
        return Err(ToolError::Data("symbol must not be empty".to_string()));
    }
    Ok(symbol)
}

async fn realtime_price_impl(
    market: MarketClient,
    input: serde_json::Value,
) -> Result<String, ToolError> {
    let input: RealtimePriceInput = serde_json::from_value(input)?;
    let symbol = normalize_symbol(&input.symbol)?;

    let chart = market
        .chart(
            &symbol,
            &[("interval", "1d".to_string()), ("range", "1d".to_string())],
        )
        .await?;

    let currency = chart.meta.currency.as_deref().unwrap_or("USD");
    match chart.meta.regular_market_price.or_else(|| chart.last_close()) {
        Some(price) => Ok(format!(
            "The real-time stock price for {} is {} {}.",
            symbol, price, currency
        )),
        None => Err(ToolError::Data(format!(
            "Could not retrieve real-time price for {}. The symbol may be invalid.",
            symbol
        ))),
    }
}

pub(crate) fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "retrieve_realtime_stock_price",
        description: "Retrieves the real-time stock price for a given symbol. Returns the latest price and its currency.",
        input_schema: serde_json::to_value(schema_for!(RealtimePriceInput))
            .unwrap_or_default(),
        handler: |market, input| Box::pin(realtime_price_impl(market, input)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_are_trimmed_and_uppercased() {
        assert_eq!(normalize_symbol(" amzn ").unwrap(), "AMZN");
        assert!(normalize_symbol("   ").is_err());
    }
}
