//! Client for a Yahoo-Finance-style `v8/finance/chart` endpoint.

use crate::error::ToolError;
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;

const USER_AGENT: &str = concat!("finagent/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct MarketClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChartResult {
    pub(crate) meta: ChartMeta,
    #[serde(default)]
    pub(crate) timestamp: Vec<i64>,
    #[serde(default)]
    pub(crate) indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChartMeta {
    pub(crate) currency: Option<String>,
    pub(crate) regular_market_price: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Indicators {
    #[serde(default)]
    pub(crate) quote: Vec<Quote>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Quote {
    #[serde(default)]
    pub(crate) open: Vec<Option<f64>>,
    #[serde(default)]
    pub(crate) high: Vec<Option<f64>>,
    #[serde(default)]
    pub(crate) low: Vec<Option<f64>>,
    #[serde(default)]
    pub(crate) close: Vec<Option<f64>>,
}

/// One trading day.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DailyBar {
    pub(crate) date: NaiveDate,
    pub(crate) open: f64,
    pub(crate) high: f64,
    pub(crate) low: f64,
    pub(crate) close: f64,
}

impl MarketClient {
    pub fn new(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub(crate) async fn chart(
        &self,
        symbol: &str,
        query: &[(&str, String)],
    ) -> Result<ChartResult, ToolError> {
        let url = self.chart_url(symbol)?;
        tracing::debug!(%url, "fetching market data");

        let response = self
            .http
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .query(query)
            .send()
            .await?;

        // Unknown symbols come back as 404 with an error body worth reading.
        let envelope: ChartEnvelope = response.json().await?;
        parse_chart(envelope)
    }

    /// The symbol is a single path segment, so `/`, `?` and `#` are escaped.
    fn chart_url(&self, symbol: &str) -> Result<reqwest::Url, ToolError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ToolError::Data(format!("invalid market data URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ToolError::Data("market data URL cannot take a path".to_string()))?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", symbol]);
        Ok(url)
    }
}

fn parse_chart(envelope: ChartEnvelope) -> Result<ChartResult, ToolError> {
    if let Some(error) = envelope.chart.error {
        let description = error
            .description
            .unwrap_or_else(|| "unknown market data error".to_string());
        return Err(ToolError::Data(description));
    }

    envelope
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| ToolError::Data("no market data returned".to_string()))
}

impl ChartResult {
    pub(crate) fn last_close(&self) -> Option<f64> {
        self.indicators
            .quote
            .first()
            .and_then(|q| q.close.iter().rev().find_map(|c| *c))
    }

    /// Daily bars with every price present; incomplete rows are skipped.
    pub(crate) fn daily_bars(&self) -> Vec<DailyBar> {
        let Some(quote) = self.indicators.quote.first() else {
            return Vec::new();
        };

        self.timestamp
            .iter()
            .enumerate()
            .filter_map(|(i, ts)| {
                let date = DateTime::from_timestamp(*ts, 0)?.date_naive();
                Some(DailyBar {
                    date,
                    open: (*quote.open.get(i)?)?,
                    high: (*quote.high.get(i)?)?,
                    low: (*quote.low.get(i)?)?,
                    close: (*quote.close.get(i)?)?,
                })
            })
            .collect()
    }
}
