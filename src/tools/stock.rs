use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::{IntoToolResponse, Tool, ToolResponse};
use crate::error::{DomainError, McpResult};
use crate::tushare::{QueryRequest, Scalar, TushareApi};
use crate::utils::{parse_params, require_non_empty};

const STOCK_BASIC_FIELDS: &[&str] = &[
    "ts_code",
    "symbol",
    "name",
    "area",
    "industry",
    "fullname",
    "market",
    "exchange",
    "list_date",
    "list_status",
    "is_hs",
];

const DAILY_FIELDS: &[&str] = &[
    "ts_code",
    "trade_date",
    "open",
    "high",
    "low",
    "close",
    "pre_close",
    "change",
    "pct_chg",
    "vol",
    "amount",
];

pub struct StockBasicTool {
    api: Arc<dyn TushareApi>,
}

pub struct DailyTool {
    api: Arc<dyn TushareApi>,
}

impl StockBasicTool {
    pub fn new(api: Arc<dyn TushareApi>) -> Self {
        Self { api }
    }
}

impl DailyTool {
    pub fn new(api: Arc<dyn TushareApi>) -> Self {
        Self { api }
    }
}

#[derive(Debug, Deserialize)]
struct StockBasicParams {
    ts_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DailyParams {
    ts_code: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
}

#[async_trait]
impl Tool for StockBasicTool {
    fn description(&self) -> &str {
        "Basic profile of one stock (industry, area, full name, listing date, status) by ts_code, e.g. 000001.SZ or 600519.SH"
    }

    async fn execute(&self, params: Value) -> McpResult<Value> {
        let params: StockBasicParams = match parse_params(params) {
            Ok(params) => params,
            Err(e) => return ToolResponse::row_error(e).into_response(),
        };

        let ts_code = match require_non_empty(params.ts_code.as_deref(), "ts_code") {
            Ok(code) => code,
            Err(e) => return ToolResponse::row_error(e).into_response(),
        };

        let request = QueryRequest::new("stock_basic")
            .param("ts_code", ts_code)
            .fields(STOCK_BASIC_FIELDS);
        let envelope = self.api.query(request).await;

        if let Some(error) = envelope.error {
            return ToolResponse::row_error(error).into_response();
        }

        match envelope.rows.into_iter().next() {
            Some(row) => ToolResponse::row(row).into_response(),
            None => {
                ToolResponse::row_error(DomainError::StockNotFound(ts_code.to_string()))
                    .into_response()
            }
        }
    }
}

#[async_trait]
impl Tool for DailyTool {
    fn description(&self) -> &str {
        "Daily price bars (open/high/low/close, previous close, change, pct change, volume, amount) for a stock between start_date and end_date (YYYYMMDD), oldest first"
    }

    async fn execute(&self, params: Value) -> McpResult<Value> {
        let params: DailyParams = match parse_params(params) {
            Ok(params) => params,
            Err(e) => return ToolResponse::rows_error(e).into_response(),
        };

        let validated = require_non_empty(params.ts_code.as_deref(), "ts_code").and_then(|code| {
            let start = require_non_empty(params.start_date.as_deref(), "start_date")?;
            let end = require_non_empty(params.end_date.as_deref(), "end_date")?;
            Ok((code, start, end))
        });
        let (ts_code, start_date, end_date) = match validated {
            Ok(args) => args,
            Err(e) => return ToolResponse::rows_error(e).into_response(),
        };

        let request = QueryRequest::new("daily")
            .param("ts_code", ts_code)
            .param("start_date", start_date)
            .param("end_date", end_date)
            .fields(DAILY_FIELDS);
        let envelope = self.api.query(request).await;

        if let Some(error) = envelope.error {
            return ToolResponse::rows_error(error).into_response();
        }

        if envelope.rows.is_empty() {
            return ToolResponse::rows_error(DomainError::NoDataInRange {
                ts_code: ts_code.to_string(),
                start_date: start_date.to_string(),
                end_date: end_date.to_string(),
            })
            .into_response();
        }

        // Upstream returns newest first; YYYYMMDD sorts lexically
        let mut rows = envelope.rows;
        rows.sort_by(|a, b| {
            let a = a.get("trade_date").unwrap_or(&Scalar::Null);
            let b = b.get("trade_date").unwrap_or(&Scalar::Null);
            a.cmp_loose(b)
        });

        ToolResponse::rows(rows).into_response()
    }
}
