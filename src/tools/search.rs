use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::{IntoToolResponse, Tool, ToolResponse};
use crate::cache::ListingCache;
use crate::error::McpResult;
use crate::tushare::Row;
use crate::utils::{parse_params, require_non_empty};

pub const DEFAULT_MAX_RESULTS: usize = 200;

pub struct SearchStocksTool {
    cache: Arc<ListingCache>,
    max_results: usize,
}

impl SearchStocksTool {
    pub fn new(cache: Arc<ListingCache>, max_results: usize) -> Self {
        Self { cache, max_results }
    }
}

#[derive(Debug, Deserialize)]
struct SearchStocksParams {
    keyword: Option<String>,
}

/// Case-insensitive substring match on code and name, first `limit` hits in
/// listing order.
fn filter_listing(rows: &[Row], keyword: &str, limit: usize) -> Vec<Row> {
    let needle = keyword.to_lowercase();
    let matches = |field: &str, row: &Row| {
        row.get_str(field)
            .is_some_and(|v| v.to_lowercase().contains(&needle))
    };

    rows.iter()
        .filter(|row| matches("ts_code", row) || matches("name", row))
        .take(limit)
        .cloned()
        .collect()
}

#[async_trait]
impl Tool for SearchStocksTool {
    fn description(&self) -> &str {
        "Search listed stocks whose code or name contains the keyword (e.g. 平安, 银行, 000001); returns up to 200 rows"
    }

    async fn execute(&self, params: Value) -> McpResult<Value> {
        let params: SearchStocksParams = match parse_params(params) {
            Ok(params) => params,
            Err(e) => return ToolResponse::rows_error(e).into_response(),
        };

        let keyword = match require_non_empty(params.keyword.as_deref(), "keyword") {
            Ok(keyword) => keyword,
            Err(e) => return ToolResponse::rows_error(e).into_response(),
        };

        let listing = match self.cache.get_full_listing().await {
            Ok(rows) => rows,
            Err(envelope) => {
                let error = envelope.error.unwrap_or_default();
                return ToolResponse::rows_error(error).into_response();
            }
        };

        let results = filter_listing(&listing, keyword, self.max_results);
        debug!(keyword, matches = results.len(), "Stock search finished");

        ToolResponse::rows(results).into_response()
    }
}
