pub mod types;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::UpstreamConfig;
use crate::error::TushareError;

pub use types::{QueryEnvelope, QueryRequest, Row, Scalar};
use types::{UpstreamRequest, UpstreamResponse, rows_from_columns};

// Keep HTTP error bodies short in envelope messages
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Seam between tools/cache and the upstream API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TushareApi: Send + Sync {
    /// Issue one upstream query. Never fails: every failure is carried in the
    /// returned envelope's `error`.
    async fn query(&self, request: QueryRequest) -> QueryEnvelope;
}

/// Where the token comes from when a call does not bring its own.
#[derive(Debug, Clone)]
pub enum DefaultToken {
    /// Read the named environment variable on every call.
    Env(String),
    Fixed(Option<String>),
}

impl DefaultToken {
    fn resolve(&self) -> Option<String> {
        match self {
            DefaultToken::Env(var) => std::env::var(var).ok(),
            DefaultToken::Fixed(token) => token.clone(),
        }
        .filter(|t| !t.trim().is_empty())
    }

    fn describe(&self) -> String {
        match self {
            DefaultToken::Env(var) => var.clone(),
            DefaultToken::Fixed(_) => "TUSHARE_TOKEN".to_string(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.resolve().is_some()
    }
}

#[derive(Debug, Clone)]
pub struct TushareClient {
    http: Client,
    endpoint: String,
    timeout: Duration,
    default_token: DefaultToken,
}

impl TushareClient {
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        default_token: DefaultToken,
    ) -> Result<Self, TushareError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TushareError::Transport(error_chain(&e)))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            timeout,
            default_token,
        })
    }

    pub fn from_config(config: &UpstreamConfig) -> Result<Self, TushareError> {
        Self::new(
            config.endpoint.clone(),
            config.timeout(),
            DefaultToken::Env(config.token_env.clone()),
        )
    }

    pub fn has_default_token(&self) -> bool {
        self.default_token.is_available()
    }

    fn resolve_token(&self, explicit: Option<&str>) -> Result<String, TushareError> {
        explicit
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string)
            .or_else(|| self.default_token.resolve())
            .ok_or_else(|| TushareError::MissingToken {
                env: self.default_token.describe(),
            })
    }

    fn classify(&self, err: reqwest::Error) -> TushareError {
        if err.is_timeout() {
            TushareError::Timeout {
                budget: self.timeout,
            }
        } else if err.is_decode() {
            TushareError::Decode(error_chain(&err))
        } else {
            TushareError::Transport(error_chain(&err))
        }
    }

    async fn execute(&self, request: &QueryRequest) -> Result<QueryEnvelope, TushareError> {
        let token = self.resolve_token(request.token.as_deref())?;

        let body = UpstreamRequest {
            api_name: &request.api_name,
            token: &token,
            params: &request.params,
            fields: request.fields.as_deref(),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TushareError::Status {
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.classify(e))?;
        let raw: Value =
            serde_json::from_slice(&bytes).map_err(|e| TushareError::Decode(e.to_string()))?;
        let parsed: UpstreamResponse = serde_json::from_value(raw.clone())
            .map_err(|e| TushareError::Decode(e.to_string()))?;

        if parsed.code != 0 {
            return Err(TushareError::Business {
                code: parsed.code,
                msg: parsed.msg.unwrap_or_default(),
            });
        }

        let data = parsed.data.unwrap_or_default();
        let rows = rows_from_columns(&data.fields, data.items);
        Ok(QueryEnvelope::success(
            request.api_name.clone(),
            data.fields,
            rows,
            Some(raw),
        ))
    }
}

#[async_trait]
impl TushareApi for TushareClient {
    async fn query(&self, request: QueryRequest) -> QueryEnvelope {
        let params = Value::Object(request.params.clone());

        match self.execute(&request).await {
            Ok(envelope) => {
                info!(
                    api_name = %request.api_name,
                    params = %params,
                    fields = ?request.fields,
                    rows = envelope.rows.len(),
                    field_count = envelope.fields.as_ref().map_or(0, Vec::len),
                    "Tushare call succeeded"
                );
                envelope
            }
            Err(e) => {
                warn!(
                    api_name = %request.api_name,
                    params = %params,
                    fields = ?request.fields,
                    error = %e,
                    "Tushare call failed"
                );
                QueryEnvelope::failure(request.api_name, e)
            }
        }
    }
}

/// Render an error with its sources; reqwest's top-level message alone hides
/// the actual cause (DNS, refused connection, ...).
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
