use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum McpError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for McpError {
    fn from(err: anyhow::Error) -> Self {
        McpError::Internal(err.to_string())
    }
}

pub type McpResult<T> = std::result::Result<T, McpError>;

/// Failure of a single upstream call. `Display` is what ends up in the
/// envelope's `error` field, so keep messages actionable.
#[derive(Error, Debug)]
pub enum TushareError {
    #[error(
        "Tushare token is not configured: set the {env} environment variable or pass a token with the call"
    )]
    MissingToken { env: String },

    #[error(
        "Tushare request timed out after {}s; narrow the query (e.g. shorten the date range) and retry",
        .budget.as_secs_f64()
    )]
    Timeout { budget: Duration },

    #[error("Tushare transport error: {0}")]
    Transport(String),

    #[error("Tushare HTTP error: status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Tushare response could not be parsed: {0}")]
    Decode(String),

    #[error("Tushare API error (code {code}): {msg}")]
    Business { code: i64, msg: String },
}

/// Validation and empty-result failures raised by tools before or after an
/// otherwise successful upstream call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("{0} must not be empty")]
    EmptyArgument(&'static str),

    #[error("Stock not found: {0}; check the ts_code (e.g. 000001.SZ, 600519.SH)")]
    StockNotFound(String),

    #[error("No data for {ts_code} between {start_date} and {end_date}; check the code and date range (YYYYMMDD)")]
    NoDataInRange {
        ts_code: String,
        start_date: String,
        end_date: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_error_carries_code_and_message() {
        let err = TushareError::Business {
            code: 40203,
            msg: "抱歉，您没有访问该接口的权限".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("40203"));
        assert!(text.contains("没有访问该接口的权限"));
    }

    #[test]
    fn test_timeout_message_suggests_fix() {
        let text = TushareError::Timeout {
            budget: Duration::from_secs(8),
        }
        .to_string();
        assert!(text.contains("timed out"));
        assert!(text.contains("shorten the date range"));
    }

    #[test]
    fn test_missing_token_names_env_var() {
        let err = TushareError::MissingToken {
            env: "TUSHARE_TOKEN".to_string(),
        };
        assert!(err.to_string().contains("TUSHARE_TOKEN"));
    }

    #[test]
    fn test_anyhow_maps_to_internal() {
        let err: McpError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, McpError::Internal(ref m) if m == "boom"));
    }
}
