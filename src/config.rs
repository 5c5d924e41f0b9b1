use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// Default configuration constants
const DEFAULT_ENDPOINT: &str = "http://api.tushare.pro";
const DEFAULT_TIMEOUT_SECONDS: u64 = 8;
const DEFAULT_TOKEN_ENV: &str = "TUSHARE_TOKEN";
const DEFAULT_LISTING_TTL_HOURS: u64 = 6;
const DEFAULT_SEARCH_MAX_RESULTS: usize = 200;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_PATH: &str = "/mcp";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub search: SearchConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    pub endpoint: String,
    pub timeout_seconds: u64,
    /// Name of the environment variable holding the default token. The
    /// token is looked up on every call, never stored here.
    pub token_env: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    pub listing_ttl_hours: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    pub max_results: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl CacheConfig {
    /// Listing TTL as a chrono duration; fails when the hour count does not
    /// fit a `chrono::Duration`.
    pub fn listing_ttl(&self) -> Result<chrono::Duration> {
        i64::try_from(self.listing_ttl_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "cache.listing_ttl_hours is too large: {}",
                    self.listing_ttl_hours
                )
            })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig {
                endpoint: DEFAULT_ENDPOINT.to_string(),
                timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
                token_env: DEFAULT_TOKEN_ENV.to_string(),
            },
            cache: CacheConfig {
                listing_ttl_hours: DEFAULT_LISTING_TTL_HOURS,
            },
            search: SearchConfig {
                max_results: DEFAULT_SEARCH_MAX_RESULTS,
            },
            server: ServerConfig {
                host: DEFAULT_HOST.to_string(),
                port: DEFAULT_PORT,
                path: DEFAULT_PATH.to_string(),
            },
        }
    }
}

impl Config {
    pub fn load(config_path: Option<&str>, port_override: Option<u16>) -> Result<Self> {
        let mut settings = config::Config::builder();

        // Default values
        settings = settings
            .set_default("upstream.endpoint", DEFAULT_ENDPOINT)?
            .set_default("upstream.timeout_seconds", DEFAULT_TIMEOUT_SECONDS)?
            .set_default("upstream.token_env", DEFAULT_TOKEN_ENV)?
            .set_default("cache.listing_ttl_hours", DEFAULT_LISTING_TTL_HOURS)?
            .set_default("search.max_results", DEFAULT_SEARCH_MAX_RESULTS as u64)?
            .set_default("server.host", DEFAULT_HOST)?
            .set_default("server.port", DEFAULT_PORT as u64)?
            .set_default("server.path", DEFAULT_PATH)?;

        // Load from config file if provided
        if let Some(path) = config_path
            && Path::new(path).exists()
        {
            settings = settings.add_source(config::File::with_name(path));
        }

        // Override with environment variables (TUSHARE__UPSTREAM__TIMEOUT_SECONDS=...)
        settings = settings.add_source(
            config::Environment::with_prefix("TUSHARE")
                .prefix_separator("__")
                .separator("__"),
        );

        // Hosting platforms hand the port over as PORT
        if let Ok(port) = std::env::var("PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid PORT value '{}': {}", port, e))?;
            settings = settings.set_override("server.port", port as u64)?;
        }

        if let Some(port) = port_override {
            settings = settings.set_override("server.port", port as u64)?;
        }

        let config: Config = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.upstream.timeout_seconds == 0 {
            return Err(anyhow::anyhow!("upstream.timeout_seconds must be positive"));
        }
        self.cache.listing_ttl()?;
        if !self.server.path.starts_with('/') {
            return Err(anyhow::anyhow!(
                "server.path must start with '/', got '{}'",
                self.server.path
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
