//! Order-book mirror relay entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use book_relay::api::{create_router, AppState};
use book_relay::config::Config;
use book_relay::decimal::Decimal;
use book_relay::market::{
    normalize_pair, HttpMarketSource, MarketSource, MockMarketSource, RawOrdersBuilder,
};
use book_relay::metrics;
use book_relay::orderbook::{finest_bucket_width, merge};
use book_relay::store::PairStore;
use book_relay::sync::{ShutdownHandle, SyncLoop};
use book_relay::utils::{abbreviate, shutdown_signal};

/// Order-book mirror relay.
#[derive(Parser, Debug)]
#[command(name = "book-relay")]
#[command(about = "Mirrors a market gateway's order books and streams their diffs")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "LOG_JSON")]
    log_json: bool,

    /// Use the in-memory demo source instead of the gateway.
    #[arg(long, global = true)]
    mock: bool,

    /// Market gateway base URL (overrides SOURCE_URL).
    #[arg(long, global = true)]
    source_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,

    /// HTTP server port (overrides PORT).
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the sync loop and HTTP server (default).
    Run {
        /// HTTP server port (overrides PORT).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// List the source's trading pairs.
    Pairs,

    /// Fetch one pair's book and print it merged at a bucket width.
    Snapshot {
        /// Pair key, e.g. `ltc_btc`, or raw id, e.g. `LTC/BTC`.
        pair: String,

        /// Bucket width, exactly `1 x 10^k` (e.g. `0.01` or `100`).
        #[arg(long)]
        spread: Option<Decimal>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("book_relay=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if args.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    // Initialize metrics
    metrics::init_metrics();

    let mut config = load_config()?;
    if let Some(url) = args.source_url {
        config.source_url = url;
    }

    // Handle subcommands
    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(&config),
        Some(Command::Pairs) => {
            if args.mock {
                cmd_pairs(demo_source()).await
            } else {
                cmd_pairs(HttpMarketSource::from_config(&config)?).await
            }
        }
        Some(Command::Snapshot { pair, spread }) => {
            let width = spread.unwrap_or_else(finest_bucket_width);
            if args.mock {
                cmd_snapshot(demo_source(), &pair, &width).await
            } else {
                cmd_snapshot(HttpMarketSource::from_config(&config)?, &pair, &width).await
            }
        }
        Some(Command::Run { port }) => {
            run_with(config, port.or(args.port), args.mock).await
        }
        None => run_with(config, args.port, args.mock).await,
    }
}

fn load_config() -> anyhow::Result<Config> {
    Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        anyhow::Error::new(e).context("configuration load failed")
    })
}

/// Check configuration validity.
fn cmd_check_config(config: &Config) -> anyhow::Result<()> {
    println!("======================================================================");
    println!("BOOK RELAY - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Source URL: {}", config.source_url);
    println!("  Poll Interval: {}ms", config.poll_interval_ms);
    println!("  HTTP Timeout: {}ms", config.http_timeout_ms);
    println!("  Port: {}", config.port);
    println!("  Static Dir: {}", config.static_dir);
    println!(
        "  Metrics: {}",
        if config.metrics_enabled {
            format!("Enabled (port {})", config.metrics_port)
        } else {
            "Disabled".to_string()
        }
    );
    let weights = config.pair_weights()?;
    if !weights.is_empty() {
        let mut weights: Vec<_> = weights.into_iter().collect();
        weights.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        for (pair, weight) in weights {
            println!("  Pair Weight: {} = {}", pair, weight);
        }
    }
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Print the source's pair list.
async fn cmd_pairs<S: MarketSource>(source: S) -> anyhow::Result<()> {
    let pairs = source.list_pairs().await.context("failed to list pairs")?;
    for pair_id in pairs {
        match normalize_pair(&pair_id) {
            Ok(key) => println!("{key:<16} {pair_id}"),
            Err(e) => println!("{:<16} {pair_id} ({e})", "-"),
        }
    }
    Ok(())
}

/// Fetch once and print one pair merged at `width`.
async fn cmd_snapshot<S: MarketSource>(source: S, pair: &str, width: &Decimal) -> anyhow::Result<()> {
    let wanted = normalize_pair(pair).unwrap_or_else(|_| pair.to_lowercase());
    let orders = source.list_orders().await.context("failed to fetch orders")?;

    let (pair_id, raw) = orders
        .iter()
        .find(|(id, _)| normalize_pair(id).is_ok_and(|key| key == wanted))
        .with_context(|| format!("pair {wanted} not listed by the source"))?;

    let book = raw
        .to_book(0)
        .with_context(|| format!("malformed orders for {pair_id}"))?;
    let book = merge(&merge(&book, &finest_bucket_width())?, width)?;
    println!("{book}");
    Ok(())
}

async fn run_with(config: Config, port: Option<u16>, mock: bool) -> anyhow::Result<()> {
    if mock {
        info!("Using in-memory demo source");
        run(config, port, demo_source()).await
    } else {
        let source = HttpMarketSource::from_config(&config)?;
        run(config, port, source).await
    }
}

/// Run the sync loop and HTTP server until a shutdown signal.
async fn run<S: MarketSource + 'static>(
    mut config: Config,
    port_override: Option<u16>,
    source: S,
) -> anyhow::Result<()> {
    if let Some(port) = port_override {
        config.port = port;
    }

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    info!("Configuration loaded successfully");
    info!("Source: {}", config.source_url);
    info!("Poll interval: {:?}", config.poll_interval());

    if config.metrics_enabled {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!("Prometheus metrics on {}", addr);
    }

    let store = Arc::new(PairStore::with_weights(config.pair_weights()?));
    let (diffs, _) = broadcast::channel(config.broadcast_capacity);
    let (shutdown, shutdown_rx) = ShutdownHandle::new();

    // Start sync loop
    let sync = SyncLoop::new(
        source,
        Arc::clone(&store),
        diffs.clone(),
        config.poll_interval(),
        shutdown_rx,
    )
    .spawn();

    // Start HTTP server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let router = create_router(AppState::new(Arc::clone(&store), diffs), &config.static_dir);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_shutdown.shutdown();
        })
        .await?;

    shutdown.shutdown();
    if let Err(e) = sync.await {
        warn!("Sync loop task failed: {}", e);
    }

    if let Ok(info) = store.info() {
        info!(
            "Stopped relay for node {} ({} pairs)",
            abbreviate(&info.node_pub_key, 12),
            store.len()
        );
    }

    Ok(())
}

/// In-memory source with two liquid pairs.
fn demo_source() -> MockMarketSource {
    let source = MockMarketSource::new();
    source.set_pairs(["LTC/BTC", "ETH/BTC"]);
    source.set_orders(
        "LTC/BTC",
        RawOrdersBuilder::new()
            .sell("0.00812", 150_000_000)
            .sell("0.00815", 220_000_000)
            .sell("0.0082", 500_000_000)
            .buy("0.00808", 90_000_000)
            .buy("0.008", 300_000_000)
            .build(),
    );
    source.set_orders(
        "ETH/BTC",
        RawOrdersBuilder::new()
            .sell("0.0531", 40_000_000)
            .sell("0.0534", 75_000_000)
            .buy("0.0529", 120_000_000)
            .build(),
    );
    source
}
