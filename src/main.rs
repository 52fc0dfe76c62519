//! crawl-indexer main entry point
//!
//! Loads the configuration, connects the search backends and serves the crawl API
//! until SIGINT or SIGTERM.

use anyhow::Context;
use clap::Parser;
use crawl_indexer::config::{load_config_with_hash, Config};
use crawl_indexer::crawler::{build_http_client, CrawlLauncher, CrawlSettings};
use crawl_indexer::logging::{self, ElasticLogLayer, ShippingHandle};
use crawl_indexer::server::{self, AppState, Lifecycle};
use crawl_indexer::sink;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter};

/// crawl-indexer: crawls websites into Elasticsearch or App Search
///
/// Accepts crawl requests on `POST /crawl`, walks each site from its seed URL and
/// indexes every page it reaches.
#[derive(Parser, Debug)]
#[command(name = "crawl-indexer")]
#[command(version)]
#[command(about = "Crawls websites into search backends", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Override the listen port from the configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// Validate the configuration and exit without connecting anything
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_handle = setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Some(port) = cli.port {
        config.server.port = port;
    }

    if cli.check {
        print_check(&config, &config_hash);
        return Ok(());
    }

    serve(config, log_handle).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG` takes precedence over the flags when set. The returned handle fills
/// the log shipping slot once the configuration is known.
fn setup_logging(verbose: u8, quiet: bool) -> ShippingHandle {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            EnvFilter::new("error")
        } else {
            match verbose {
                0 => EnvFilter::new("crawl_indexer=info,warn"),
                1 => EnvFilter::new("crawl_indexer=debug,tower_http=debug,info"),
                2 => EnvFilter::new("crawl_indexer=trace,debug"),
                _ => EnvFilter::new("trace"),
            }
        }
    });

    let (shipping, handle) = reload::Layer::new(None::<ElasticLogLayer>);

    tracing_subscriber::registry()
        .with(shipping)
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false),
        )
        .init();

    handle
}

/// Handles `--check`: prints the effective configuration without secrets
fn print_check(config: &Config, hash: &str) {
    println!("=== crawl-indexer configuration ===\n");
    println!("Hash: {}", hash);

    println!("\nServer:");
    println!("  Port: {}", config.server.port);
    println!("  Shutdown grace: {}s", config.server.shutdown_grace_secs);
    println!("  Header read timeout: {}ms", config.server.read_header_timeout_ms);

    println!("\nCrawler:");
    println!("  User agent: {}", config.crawler.user_agent);
    println!("  Max concurrent fetches: {}", config.crawler.max_concurrent_fetches);
    if config.crawler.max_pages > 0 {
        println!("  Max pages per run: {}", config.crawler.max_pages);
    } else {
        println!("  Max pages per run: unlimited");
    }
    println!("  Index batch size: {}", config.crawler.index_batch_size);
    println!(
        "  Timeouts: connect {}s, headers {}s, body {}s, drain {}s",
        config.crawler.connect_timeout_secs,
        config.crawler.response_header_timeout_secs,
        config.crawler.body_timeout_secs,
        config.crawler.drain_timeout_secs
    );

    println!("\nBackends:");
    if let Some(es) = &config.elasticsearch {
        println!(
            "  elasticsearch: {} (auth: {})",
            es.endpoint.as_deref().unwrap_or("-"),
            if es.username.is_some() { "basic" } else { "none" }
        );
        for index in &es.ensure_indices {
            println!("    * ensure index {}", index);
        }
    }
    if let Some(app_search) = &config.app_search {
        println!(
            "  app-search: {}{}",
            app_search.endpoint.as_deref().unwrap_or("-"),
            app_search.api_path
        );
    }

    if let Some(shipping) = &config.log_shipping {
        println!("\nLog shipping:");
        println!("  Index: {} (level {})", shipping.index, shipping.level);
    }

    println!("\n✓ Configuration is valid");
}

/// Connects the backends and serves the API until shutdown
async fn serve(config: Config, log_handle: ShippingHandle) -> anyhow::Result<()> {
    let sinks = sink::connect(&config)
        .await
        .context("failed to connect search backends")?;
    tracing::info!(backends = ?sinks.backends(), "Search backends connected");

    let shipping = match (&config.log_shipping, sinks.elasticsearch()) {
        (Some(shipping_config), Some(es)) => Some(
            logging::start(shipping_config, es, &log_handle)
                .await
                .context("failed to start log shipping")?,
        ),
        (Some(_), None) => anyhow::bail!("[log-shipping] requires [elasticsearch]"),
        (None, _) => None,
    };

    let client = build_http_client(&config.crawler).context("failed to build HTTP client")?;
    let lifecycle = Lifecycle::new(config.server.shutdown_grace())
        .with_read_header_timeout(config.server.read_header_timeout());

    let launcher = CrawlLauncher::new(
        client,
        CrawlSettings::from_config(&config.crawler),
        sinks,
        lifecycle.tracker(),
        lifecycle.shutdown_token(),
    );
    let router = server::router(AppState::new(launcher));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);

    lifecycle.listen_for_signals();
    let result = lifecycle.run(listener, router).await;

    if let Some(shipping) = shipping {
        shipping.stop(config.server.shutdown_grace()).await;
    }
    result?;

    Ok(())
}
