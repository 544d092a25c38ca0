use clap::{Args, ValueEnum};
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";
pub const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MARKET_DATA_URL: &str = "https://query1.finance.yahoo.com";

/// Whether the gateway-style ingress can forward a response progressively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FlushMode {
    Buffered,
    Progressive,
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "FINAGENT_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// Key clients must send in the x-api-key header
    #[arg(long, env = "FINAGENT_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Anthropic API key used for inference
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: String,

    #[arg(long, env = "FINAGENT_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    #[arg(long, env = "ANTHROPIC_BASE_URL", default_value = DEFAULT_ANTHROPIC_URL)]
    pub anthropic_url: String,

    #[arg(long, env = "FINAGENT_MARKET_DATA_URL", default_value = DEFAULT_MARKET_DATA_URL)]
    pub market_data_url: String,

    /// Wall-clock budget for the streaming endpoint
    #[arg(long, env = "FINAGENT_STREAM_TIMEOUT_SECS", default_value_t = 900)]
    pub stream_timeout_secs: u64,

    /// Wall-clock budget for the gateway endpoint
    #[arg(long, env = "FINAGENT_GATEWAY_TIMEOUT_SECS", default_value_t = 29)]
    pub gateway_timeout_secs: u64,

    #[arg(long, env = "FINAGENT_GATEWAY_FLUSH", value_enum, default_value_t = FlushMode::Buffered)]
    pub gateway_flush: FlushMode,

    /// Events buffered per request between the agent and the client
    #[arg(long, env = "FINAGENT_QUEUE_CAPACITY", default_value_t = 32)]
    pub queue_capacity: usize,
}

/// Process-wide settings, built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: String,
    pub api_key: String,
    pub anthropic_api_key: String,
    pub model: String,
    pub anthropic_url: String,
    pub market_data_url: String,
    pub stream_timeout: Duration,
    pub gateway_timeout: Duration,
    pub gateway_flush: FlushMode,
    pub queue_capacity: usize,
}

impl ServerConfig {
    pub fn from_args(args: ServeArgs) -> anyhow::Result<Self> {
        if args.api_key.trim().is_empty() {
            anyhow::bail!("--api-key must not be empty");
        }
        if args.queue_capacity == 0 {
            anyhow::bail!("--queue-capacity must be at least 1");
        }

        Ok(Self {
            listen: args.listen,
            api_key: args.api_key,
            anthropic_api_key: args.anthropic_api_key,
            model: args.model,
            anthropic_url: normalize_base_url(&args.anthropic_url),
            market_data_url: normalize_base_url(&args.market_data_url),
            stream_timeout: Duration::from_secs(args.stream_timeout_secs),
            gateway_timeout: Duration::from_secs(args.gateway_timeout_secs),
            gateway_flush: args.gateway_flush,
            queue_capacity: args.queue_capacity,
        })
    }
}

pub fn normalize_base_url(value: &str) -> String {
    value.trim_end_matches('/').to_string()
}
