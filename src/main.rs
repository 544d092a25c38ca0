use clap::{Parser, Subcommand};
use finagent::client::{Endpoint, InvokeClient};
use finagent::config::{ServeArgs, ServerConfig};
use finagent::protocol::WireEvent;
use std::io::Write;

#[derive(Parser)]
#[command(name = "finagent", about = "Streaming stock-price agent over HTTP", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve(ServeArgs),

    /// Send one query to a running server and print the answer as it streams
    Ask {
        query: String,

        #[arg(long, env = "FINAGENT_URL", default_value = "http://127.0.0.1:8080")]
        url: String,

        #[arg(long, env = "FINAGENT_API_KEY", hide_env_values = true)]
        api_key: String,

        /// Use the bounded gateway endpoint
        #[arg(long)]
        gateway: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve(args) => finagent::server::run(ServerConfig::from_args(args)?).await,
        Commands::Ask {
            query,
            url,
            api_key,
            gateway,
        } => {
            let endpoint = if gateway {
                Endpoint::Gateway
            } else {
                Endpoint::Streaming
            };
            let client = InvokeClient::new(&url, api_key);
            client
                .invoke(query, endpoint, |event| {
                    print_event(event);
                    std::future::ready(())
                })
                .await
        }
    }
}

fn print_event(event: WireEvent) {
    match event {
        WireEvent::Connection { .. } => {}
        WireEvent::Content { text } => {
            print!("{}", text);
            let _ = std::io::stdout().flush();
        }
        WireEvent::ToolCall { name, args } => {
            eprintln!("\n→ tool: {}({})", name, args);
        }
        WireEvent::ToolResult { content } => {
            eprintln!("← {}", truncate(&content, 300));
        }
        WireEvent::Complete { .. } => println!(),
        WireEvent::Error { message } => eprintln!("\nerror: {}", message),
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...[truncated]", &s[..idx]),
        None => s.to_string(),
    }
}
