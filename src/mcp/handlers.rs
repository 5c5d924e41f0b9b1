use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::cache::ListingCache;
use crate::config::Config;
use crate::error::McpError;
use crate::tools::{Tool, query, search, stock};
use crate::tushare::TushareApi;

use super::types::{CallToolResult, Property, Tool as McpTool, ToolContent, ToolInputSchema};

pub struct RequestHandler {
    tools: HashMap<String, Box<dyn Tool + Send + Sync>>,
}

macro_rules! register_tool {
    ($tools:expr, $name:expr, $tool:expr) => {
        $tools.insert($name.to_string(), Box::new($tool));
    };
}

impl RequestHandler {
    pub fn new(api: Arc<dyn TushareApi>, cache: Arc<ListingCache>, config: &Config) -> Self {
        let mut tools: HashMap<String, Box<dyn Tool + Send + Sync>> = HashMap::new();

        register_tool!(tools, "ping", query::PingTool);
        register_tool!(
            tools,
            "tushare_query",
            query::TushareQueryTool::new(api.clone())
        );
        register_tool!(
            tools,
            "search_stocks",
            search::SearchStocksTool::new(cache, config.search.max_results)
        );
        register_tool!(tools, "stock_basic", stock::StockBasicTool::new(api.clone()));
        register_tool!(tools, "daily", stock::DailyTool::new(api));

        Self { tools }
    }

    pub fn list_tools(&self) -> Vec<McpTool> {
        let mut tool_list: Vec<McpTool> = self
            .tools
            .iter()
            .map(|(name, tool)| Self::tool_to_mcp_tool(name, tool.as_ref()))
            .collect();
        tool_list.sort_by(|a, b| a.name.cmp(&b.name));
        tool_list
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| McpError::NotFound(format!("Tool not found: {}", name)))?;

        // Argument problems are reported to the caller as a tool failure,
        // not a protocol fault
        let result = match tool.execute(arguments).await {
            Ok(result) => result,
            Err(McpError::InvalidParameter(msg)) => {
                serde_json::json!({ "error": format!("Invalid parameter: {}", msg) })
            }
            Err(e) => return Err(e),
        };

        let is_error = result.get("error").is_some_and(|e| !e.is_null());
        let text = match result.as_str() {
            Some(text) => text.to_string(),
            None => serde_json::to_string_pretty(&result)?,
        };

        Ok(CallToolResult {
            content: vec![ToolContent::Text { text }],
            is_error,
        })
    }

    fn string_prop(description: &str) -> Property {
        Property {
            property_type: "string".to_string(),
            description: Some(description.to_string()),
        }
    }

    fn object_prop(description: &str) -> Property {
        Property {
            property_type: "object".to_string(),
            description: Some(description.to_string()),
        }
    }

    fn tool_to_mcp_tool(name: &str, tool: &(dyn Tool + Send + Sync)) -> McpTool {
        let mut properties = BTreeMap::new();
        let required: Vec<&str> = match name {
            "search_stocks" => {
                properties.insert(
                    "keyword".to_string(),
                    Self::string_prop("Part of a stock code or name, e.g. 平安, 新能源, 000001"),
                );
                vec!["keyword"]
            }
            "stock_basic" => {
                properties.insert(
                    "ts_code".to_string(),
                    Self::string_prop("Tushare code, e.g. 000001.SZ or 600519.SH"),
                );
                vec!["ts_code"]
            }
            "daily" => {
                properties.insert(
                    "ts_code".to_string(),
                    Self::string_prop("Tushare code, e.g. 000001.SZ"),
                );
                properties.insert(
                    "start_date".to_string(),
                    Self::string_prop("First trade date, YYYYMMDD"),
                );
                properties.insert(
                    "end_date".to_string(),
                    Self::string_prop("Last trade date, YYYYMMDD"),
                );
                vec!["ts_code", "start_date", "end_date"]
            }
            "tushare_query" => {
                properties.insert(
                    "api_name".to_string(),
                    Self::string_prop("Tushare Pro API name, e.g. trade_cal, income, daily_basic"),
                );
                properties.insert(
                    "params".to_string(),
                    Self::object_prop("API parameters, e.g. {\"ts_code\": \"000001.SZ\"}"),
                );
                properties.insert(
                    "fields".to_string(),
                    Self::string_prop("Comma-separated output fields (optional)"),
                );
                properties.insert(
                    "token".to_string(),
                    Self::string_prop("Tushare token overriding the server default (optional)"),
                );
                vec!["api_name"]
            }
            _ => vec![],
        };

        McpTool {
            name: name.to_string(),
            description: tool.description().to_string(),
            input_schema: ToolInputSchema {
                schema_type: "object".to_string(),
                properties,
                required: required.into_iter().map(str::to_string).collect(),
            },
        }
    }
}
