use crate::auth::API_KEY_HEADER;
use crate::config::normalize_base_url;
use crate::protocol::{InvokeRequest, WireEvent};
use crate::sse::data_events;
use anyhow::{Context, bail};
use futures::StreamExt;
use reqwest::Client as HttpClient;
use std::future::Future;

/// Which ingress path to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Streaming,
    Gateway,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Streaming => "/invoke",
            Endpoint::Gateway => "/gateway/invoke",
        }
    }
}

#[derive(Clone)]
pub struct InvokeClient {
    base_url: String,
    api_key: String,
    http: HttpClient,
}

impl InvokeClient {
    pub fn new(base_url: &str, api_key: String) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            api_key,
            http: HttpClient::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send `query` and call `on_event` for every event, in order, as it
    /// arrives. Returns once the stream ends.
    pub async fn invoke<F, Fut>(
        &self,
        query: String,
        endpoint: Endpoint,
        mut on_event: F,
    ) -> anyhow::Result<()>
    where
        F: FnMut(WireEvent) -> Fut,
        Fut: Future<Output = ()>,
    {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, endpoint.path()))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&InvokeRequest { query })
            .send()
            .await
            .context("request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("invoke failed: {} - {}", status, body);
        }

        let events = data_events(response.bytes_stream());
        tokio::pin!(events);

        while let Some(data) = events.next().await {
            let data = data.context("stream interrupted")?;
            match serde_json::from_str::<WireEvent>(&data) {
                Ok(event) => on_event(event).await,
                Err(err) => tracing::debug!(error = %err, "skipping unrecognized frame"),
            }
        }

        Ok(())
    }

    pub async fn collect(&self, query: String, endpoint: Endpoint) -> anyhow::Result<Vec<WireEvent>> {
        let mut events = Vec::new();
        self.invoke(query, endpoint, |event| {
            events.push(event);
            std::future::ready(())
        })
        .await?;
        Ok(events)
    }
}
