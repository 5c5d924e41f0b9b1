use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::Tool;
use crate::error::{McpError, McpResult};
use crate::tushare::{QueryEnvelope, QueryRequest, TushareApi};
use crate::utils::parse_params;

pub const PONG: &str = "pong";

/// Liveness check; does no I/O.
pub struct PingTool;

#[async_trait]
impl Tool for PingTool {
    fn description(&self) -> &str {
        "Liveness check; returns \"pong\""
    }

    async fn execute(&self, _params: Value) -> McpResult<Value> {
        Ok(Value::String(PONG.to_string()))
    }
}

/// Raw access to any Tushare Pro endpoint not covered by a dedicated tool.
pub struct TushareQueryTool {
    api: Arc<dyn TushareApi>,
}

impl TushareQueryTool {
    pub fn new(api: Arc<dyn TushareApi>) -> Self {
        Self { api }
    }
}

#[derive(Debug, Deserialize)]
struct TushareQueryParams {
    api_name: Option<String>,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    fields: Value,
    token: Option<String>,
}

/// Upstream `params` as an object. A string holding a JSON object is decoded,
/// since clients often send the object pre-encoded.
fn params_object(value: Value) -> McpResult<Map<String, Value>> {
    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        Value::String(text) if text.trim().is_empty() => Ok(Map::new()),
        Value::String(text) => match serde_json::from_str(&text) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(McpError::InvalidParameter(format!(
                "params must be a JSON object, got the string {:?}",
                text
            ))),
        },
        other => Err(McpError::InvalidParameter(format!(
            "params must be a JSON object, got {}",
            other
        ))),
    }
}

/// Upstream `fields` as a comma-separated list; an array of names is joined.
fn fields_list(value: Value) -> McpResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(fields) => Ok(Some(fields)),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(name) => Ok(name),
                other => Err(McpError::InvalidParameter(format!(
                    "fields entries must be strings, got {}",
                    other
                ))),
            })
            .collect::<McpResult<Vec<_>>>()
            .map(|names| Some(names.join(","))),
        other => Err(McpError::InvalidParameter(format!(
            "fields must be a comma-separated string, got {}",
            other
        ))),
    }
}

impl TushareQueryTool {
    fn build_request(params: TushareQueryParams) -> McpResult<QueryRequest> {
        Ok(QueryRequest {
            api_name: params.api_name.unwrap_or_default(),
            params: params_object(params.params)?,
            fields: fields_list(params.fields)?,
            token: params.token,
        })
    }
}

#[async_trait]
impl Tool for TushareQueryTool {
    fn description(&self) -> &str {
        "Call any Tushare Pro API by name with raw params and optional comma-separated fields; returns {error, api_name, fields, rows, raw}"
    }

    async fn execute(&self, params: Value) -> McpResult<Value> {
        let api_name = params
            .get("api_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let request = parse_params::<TushareQueryParams>(params).and_then(Self::build_request);
        let envelope = match request {
            Ok(request) => self.api.query(request).await,
            Err(e) => {
                debug!(api_name = %api_name, error = %e, "Rejected tushare_query arguments");
                QueryEnvelope::failure(api_name, e)
            }
        };

        Ok(serde_json::to_value(envelope)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tushare::{MockTushareApi, Row};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    #[tokio::test]
    async fn test_ping() {
        let result = PingTool.execute(Value::Null).await.unwrap();
        assert_eq!(result, json!("pong"));
    }

    #[tokio::test]
    async fn test_passthrough_forwards_everything() {
        let mut api = MockTushareApi::new();
        api.expect_query()
            .withf(|r| {
                r.api_name == "trade_cal"
                    && r.params.get("exchange") == Some(&json!("SSE"))
                    && r.fields.as_deref() == Some("cal_date,is_open")
                    && r.token.as_deref() == Some("caller-token")
            })
            .times(1)
            .returning(|_| {
                QueryEnvelope::success(
                    "trade_cal",
                    vec!["cal_date".to_string(), "is_open".to_string()],
                    vec![Row::new().with("cal_date", "20240102").with("is_open", crate::tushare::Scalar::Int(1))],
                    Some(json!({"code": 0})),
                )
            });

        let tool = TushareQueryTool::new(Arc::new(api));
        let result = tool
            .execute(json!({
                "api_name": "trade_cal",
                "params": {"exchange": "SSE"},
                "fields": "cal_date,is_open",
                "token": "caller-token"
            }))
            .await
            .unwrap();

        assert_eq!(
            result,
            json!({
                "error": null,
                "api_name": "trade_cal",
                "fields": ["cal_date", "is_open"],
                "rows": [{"cal_date": "20240102", "is_open": 1}],
                "raw": {"code": 0}
            })
        );
    }

    #[tokio::test]
    async fn test_passthrough_does_not_validate() {
        let mut api = MockTushareApi::new();
        api.expect_query()
            .withf(|r| r.api_name.is_empty() && r.params.is_empty() && r.fields.is_none())
            .times(1)
            .returning(|r| QueryEnvelope::failure(r.api_name, "Tushare API error (code -1): 接口名不存在"));

        let tool = TushareQueryTool::new(Arc::new(api));
        let result = tool.execute(json!({})).await.unwrap();

        assert_eq!(result["error"], "Tushare API error (code -1): 接口名不存在");
        assert_eq!(result["rows"], json!([]));
        assert_eq!(result["fields"], Value::Null);
    }

    #[tokio::test]
    async fn test_string_params_holding_an_object_are_decoded() {
        let mut api = MockTushareApi::new();
        api.expect_query()
            .withf(|r| {
                r.api_name == "trade_cal"
                    && r.params.get("exchange") == Some(&json!("SSE"))
                    && r.params.get("start_date") == Some(&json!("20240101"))
                    && r.fields.as_deref() == Some("cal_date,is_open")
            })
            .times(1)
            .returning(|r| QueryEnvelope::success(r.api_name, vec![], vec![], None));

        let tool = TushareQueryTool::new(Arc::new(api));
        let result = tool
            .execute(json!({
                "api_name": "trade_cal",
                "params": "{\"exchange\": \"SSE\", \"start_date\": \"20240101\"}",
                "fields": ["cal_date", "is_open"]
            }))
            .await
            .unwrap();

        assert_eq!(result["error"], Value::Null);
    }

    #[rstest]
    #[case(json!({"api_name": "daily", "params": "ts_code=000001.SZ"}), "params must be a JSON object")]
    #[case(json!({"api_name": "daily", "params": "[1, 2]"}), "params must be a JSON object")]
    #[case(json!({"api_name": "daily", "params": [1, 2]}), "params must be a JSON object")]
    #[case(json!({"api_name": "daily", "fields": 7}), "fields must be a comma-separated string")]
    #[case(json!({"api_name": "daily", "token": 12345}), "invalid type")]
    #[tokio::test]
    async fn test_unusable_arguments_become_an_error_envelope(
        #[case] params: Value,
        #[case] expected: &str,
    ) {
        let mut api = MockTushareApi::new();
        api.expect_query().times(0);

        let tool = TushareQueryTool::new(Arc::new(api));
        let result = tool.execute(params).await.unwrap();

        let error = result["error"].as_str().unwrap();
        assert!(error.contains(expected), "unexpected error: {}", error);
        assert_eq!(result["api_name"], "daily");
        assert_eq!(result["rows"], json!([]));
    }

    #[tokio::test]
    async fn test_mistyped_api_name_is_an_error_envelope() {
        let mut api = MockTushareApi::new();
        api.expect_query().times(0);

        let tool = TushareQueryTool::new(Arc::new(api));
        let result = tool.execute(json!({"api_name": 42})).await.unwrap();

        assert!(result["error"].as_str().unwrap().contains("invalid type"));
        assert_eq!(result["api_name"], "");
    }
}
