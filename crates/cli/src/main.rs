use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};
use zaif_core::{StreamEvent, TradingPair};
use zaif_private::{ActiveOrdersParams, PrivateApiConfig, PrivateClient};
use zaif_public::{PublicApiConfig, PublicClient};
use zaif_stream::{CancellationToken, StreamConfig, StreamManager};

#[derive(Parser)]
#[command(name = "zaif")]
#[command(about = "Zaif exchange client: stream live markets, query market data and your account")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Path to a TOML config file with [stream], [public] and [private] sections
    #[arg(short, long, env = "ZAIF_CONFIG")]
    config: Option<PathBuf>,

    /// Trading API key (overrides [private].key)
    #[arg(long, env = "ZAIF_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Trading API secret (overrides [private].secret)
    #[arg(long, env = "ZAIF_API_SECRET", hide_env_values = true)]
    api_secret: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream live market events as JSON lines
    Stream {
        /// Trading pair to subscribe to (repeatable, e.g. -p btc_jpy -p xem_jpy)
        #[arg(short, long = "pair", required = true)]
        pairs: Vec<String>,

        /// Stop after this many events across all pairs
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show the 24h ticker for a pair
    Ticker { pair: String },

    /// Show the last traded price for a pair
    LastPrice { pair: String },

    /// Show the order book for a pair
    Depth { pair: String },

    /// Show recent trades for a pair
    Trades { pair: String },

    /// Show pair metadata ("all" lists every pair)
    CurrencyPairs {
        #[arg(default_value = "all")]
        pair: String,
    },

    /// Show account balances and key permissions (needs API credentials)
    Balance,

    /// List open orders (needs API credentials)
    Orders {
        /// Only orders for this pair
        #[arg(short, long)]
        pair: Option<String>,
    },
}

/// Settings file layout; every section is optional.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Config {
    stream: StreamConfig,
    public: PublicApiConfig,
    private: PrivateApiConfig,
}

impl Config {
    /// Command-line and environment credentials win over the file.
    fn with_credentials(mut self, key: Option<String>, secret: Option<String>) -> Self {
        if let Some(key) = key {
            self.private.key = key;
        }
        if let Some(secret) = secret {
            self.private.secret = secret;
        }
        self
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?.with_credentials(cli.api_key, cli.api_secret);

    match cli.command {
        Commands::Stream { pairs, limit } => run_stream(config.stream, pairs, limit).await?,
        Commands::Ticker { pair } => {
            let client = PublicClient::new(config.public)?;
            print_json(&client.ticker(&TradingPair::from(pair)).await?)?;
        }
        Commands::LastPrice { pair } => {
            let client = PublicClient::new(config.public)?;
            print_json(&client.last_price(&TradingPair::from(pair)).await?)?;
        }
        Commands::Depth { pair } => {
            let client = PublicClient::new(config.public)?;
            print_json(&client.depth(&TradingPair::from(pair)).await?)?;
        }
        Commands::Trades { pair } => {
            let client = PublicClient::new(config.public)?;
            print_json(&client.trades(&TradingPair::from(pair)).await?)?;
        }
        Commands::CurrencyPairs { pair } => {
            let client = PublicClient::new(config.public)?;
            print_json(&client.currency_pairs(&pair).await?)?;
        }
        Commands::Balance => {
            let client = PrivateClient::new(config.private)?;
            print_json(&client.get_info().await?)?;
        }
        Commands::Orders { pair } => {
            let client = PrivateClient::new(config.private)?;
            let params = ActiveOrdersParams {
                currency_pair: pair.map(TradingPair::from),
                ..Default::default()
            };
            print_json(&client.active_orders(&params).await?)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_stream(config: StreamConfig, pairs: Vec<String>, limit: Option<usize>) -> Result<()> {
    let manager = Arc::new(StreamManager::with_config(config.clone()));

    // Every pair shares one channel; per-pair order is still preserved.
    let (tx, mut rx) = mpsc::channel::<StreamEvent>(config.channel_capacity);
    for pair in &pairs {
        manager.add_subscription(pair.as_str(), tx.clone()).await?;
    }
    drop(tx);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, stopping streams");
                cancel.cancel();
            }
        }
    });

    tracing::info!(pairs = ?pairs, "Starting streams");
    let reception = tokio::spawn({
        let manager = manager.clone();
        let cancel = cancel.clone();
        async move { manager.receive(cancel).await }
    });

    let mut received = 0usize;
    while let Some(event) = rx.recv().await {
        println!("{}", serde_json::to_string(&event)?);
        received += 1;
        if limit.is_some_and(|limit| received >= limit) {
            manager.close().await?;
            break;
        }
    }

    reception
        .await
        .context("Stream task failed")?
        .context("Market stream ended with an error")?;
    tracing::info!(events = received, "Streams stopped");
    Ok(())
}
