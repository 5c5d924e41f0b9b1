use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use mcp_tushare::cache::{ListingCache, SystemClock};
use mcp_tushare::config::Config;
use mcp_tushare::mcp::{McpServer, RequestHandler};
use mcp_tushare::tushare::{TushareApi, TushareClient};

#[derive(Debug, Parser)]
#[command(name = "mcp-tushare", version, about = "MCP server for Tushare Pro market data")]
struct Args {
    /// Optional config file (toml/yaml/json)
    #[arg(long, env = "MCP_TUSHARE_CONFIG")]
    config: Option<String>,

    /// Port to listen on; overrides PORT and the config file
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    init_logging()?;

    let args = Args::parse();
    let config = Config::load(args.config.as_deref(), args.port)?;

    let client = TushareClient::from_config(&config.upstream)?;
    if !client.has_default_token() {
        warn!(
            "No Tushare token configured! Set the {} environment variable; calls without a per-call token will fail.",
            config.upstream.token_env
        );
    }
    let api: Arc<dyn TushareApi> = Arc::new(client);

    let cache = Arc::new(ListingCache::with_ttl(
        api.clone(),
        Arc::new(SystemClock),
        config.cache.listing_ttl()?,
    ));

    let handler = RequestHandler::new(api, cache, &config);
    info!(
        endpoint = %config.upstream.endpoint,
        timeout_seconds = config.upstream.timeout_seconds,
        listing_ttl_hours = config.cache.listing_ttl_hours,
        "Tushare MCP server starting"
    );

    McpServer::new(handler).run(&config).await
}

fn init_logging() -> Result<()> {
    // Support both LOG_LEVEL and RUST_LOG environment variables
    let filter = if let Ok(rust_log) = std::env::var("RUST_LOG") {
        tracing_subscriber::EnvFilter::try_new(rust_log)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    } else if let Ok(log_level) = std::env::var("LOG_LEVEL") {
        let level_str = match log_level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "warn" | "warning" => "warn",
            "error" => "error",
            _ => "info",
        };
        tracing_subscriber::EnvFilter::new(level_str)
    } else {
        tracing_subscriber::EnvFilter::new("info")
    };

    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
