use chrono::{Days, NaiveDate, Utc};
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

use super::realtime_price::normalize_symbol;
use super::{MarketClient, ToolDefinition};
use crate::error::ToolError;

const DAYS_PER_MONTH: u64 = 30;

fn default_months_ago() -> u32 {
    3
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct HistoricalPriceInput {
    #[schemars(description = "The stock ticker symbol (e.g., 'AMZN' for Amazon).")]
    symbol: String,
    #[schemars(description = "First day of the range, YYYY-MM-DD. For 'Q4 last year' use October 1st of last year.")]
    #[serde(default)]
    start_date: Option<String>,
    #[schemars(description = "Last day of the range (inclusive), YYYY-MM-DD. Defaults to today.")]
    #[serde(default)]
    end_date: Option<String>,
    #[schemars(description = "Used only when start_date is omitted: number of months back from end_date. Defaults to 3, one quarter.")]
    #[serde(default = "default_months_ago")]
    months_ago: u32,
}

fn parse_date(value: &str) -> Result<NaiveDate, ToolError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ToolError::InvalidDate(value.to_string()))
}

/// Resolve the inclusive date range a request asks for.
fn resolve_range(
    start_date: Option<&str>,
    end_date: Option<&str>,
    months_ago: u32,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate), ToolError> {
    let end = end_date.map(parse_date).transpose()?.unwrap_or(today);
    let start = match start_date {
        Some(start) => parse_date(start)?,
        None => end
            .checked_sub_days(Days::new(u64::from(months_ago) * DAYS_PER_MONTH))
            .ok_or_else(|| ToolError::Data("date range out of bounds".to_string()))?,
    };

    if start > end {
        return Err(ToolError::Data(format!(
            "start_date {} is after end_date {}",
            start, end
        )));
    }
    Ok((start, end))
}

fn unix_midnight(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

async fn historical_price_impl(
    market: MarketClient,
    input: serde_json::Value,
) -> Result<String, ToolError> {
    let input: HistoricalPriceInput = serde_json::from_value(input)?;
    let symbol = normalize_symbol(&input.symbol)?;
    let (start, end) = resolve_range(
        input.start_date.as_deref(),
        input.end_date.as_deref(),
        input.months_ago,
        Utc::now().date_naive(),
    )?;
    let after_end = end.checked_add_days(Days::new(1)).unwrap_or(end);

    let chart = market
        .chart(
            &symbol,
            &[
                ("interval", "1d".to_string()),
                ("period1", unix_midnight(start).to_string()),
                ("period2", unix_midnight(after_end).to_string()),
            ],
        )
        .await?;

    let bars = chart.daily_bars();
    if bars.is_empty() {
        return Ok(format!(
            "No historical data found for {} between {} and {}.",
            symbol, start, end
        ));
    }

    let mut out = format!("Historical Prices for {}:\n", symbol);
    let _ = writeln!(
        out,
        "{:<12}{:>10}{:>10}{:>10}{:>10}",
        "Date", "Open", "High", "Low", "Close"
    );
    for bar in bars {
        let _ = writeln!(
            out,
            "{:<12}{:>10.2}{:>10.2}{:>10.2}{:>10.2}",
            bar.date.to_string(),
            bar.open,
            bar.high,
            bar.low,
            bar.close
        );
    }
    Ok(out)
}

pub(crate) fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "retrieve_historical_stock_price",
        description: "Retrieves daily historical stock prices (Date, Open, High, Low, Close) for a given symbol over a date range. A request like 'Q4 last year' should be given as explicit start_date and end_date covering October 1st to December 31st of that year.",
        input_schema: serde_json::to_value(schema_for!(HistoricalPriceInput))
            .unwrap_or_default(),
        handler: |market, input| Box::pin(historical_price_impl(market, input)),
    }
}
