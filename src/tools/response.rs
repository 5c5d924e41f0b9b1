use crate::error::McpResult;
use crate::tushare::Row;
use serde::Serialize;
use serde_json::Value;

/// Data part of a tool result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    Rows(Vec<Row>),
    Row(Option<Row>),
}

/// Result object returned by the dedicated market-data tools. Failures are
/// reported in `error`, never as protocol errors.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub error: Option<String>,
    #[serde(flatten)]
    pub payload: Payload,
}

impl ToolResponse {
    pub fn rows(rows: Vec<Row>) -> Self {
        Self {
            error: None,
            payload: Payload::Rows(rows),
        }
    }

    pub fn row(row: Row) -> Self {
        Self {
            error: None,
            payload: Payload::Row(Some(row)),
        }
    }

    /// Failure shaped like a `rows` result
    pub fn rows_error(error: impl std::fmt::Display) -> Self {
        Self {
            error: Some(error.to_string()),
            payload: Payload::Rows(Vec::new()),
        }
    }

    /// Failure shaped like a single-`row` result
    pub fn row_error(error: impl std::fmt::Display) -> Self {
        Self {
            error: Some(error.to_string()),
            payload: Payload::Row(None),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Helper trait for converting tool results to responses
pub trait IntoToolResponse {
    fn into_response(self) -> McpResult<Value>;
}

impl IntoToolResponse for ToolResponse {
    fn into_response(self) -> McpResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
