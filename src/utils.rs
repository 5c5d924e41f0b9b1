use crate::error::{DomainError, McpError, McpResult};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Parse JSON value into a typed parameter struct. A missing `arguments`
/// object is treated as empty so that field-level validation can report it.
pub fn parse_params<T: DeserializeOwned>(params: Value) -> McpResult<T> {
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params
    };
    serde_json::from_value(params).map_err(|e| McpError::InvalidParameter(e.to_string()))
}

/// Trimmed value of a required text argument. Absent, `null` and blank all
/// count as empty.
pub fn require_non_empty<'a>(
    value: Option<&'a str>,
    name: &'static str,
) -> Result<&'a str, DomainError> {
    match value.map(str::trim) {
        Some(trimmed) if !trimmed.is_empty() => Ok(trimmed),
        _ => Err(DomainError::EmptyArgument(name)),
    }
}
