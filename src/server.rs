//! MCP Server implementation with Analytics Reporting tools.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult, Content, ErrorCode, ErrorData as McpError, Implementation,
        ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    schemars::{self, JsonSchema},
    tool, tool_handler, tool_router, ServerHandler,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::api::{QuerySource, ReportClient, SourceArgs};
use crate::debug::DebugLogger;
use crate::error::ReportError;
use crate::fields::FieldSpec;

/// Analytics Reporting MCP Server.
#[derive(Clone)]
pub struct AnalyticsReportServer {
    client: ReportClient,
    debug: Arc<DebugLogger>,
    tool_router: ToolRouter<Self>,
}

impl AnalyticsReportServer {
    pub fn new(client: ReportClient, debug: Arc<DebugLogger>) -> Self {
        Self {
            client,
            debug,
            tool_router: Self::tool_router(),
        }
    }

    fn fail(&self, tool_name: &str, error: ReportError) -> McpError {
        self.debug.log_error(tool_name, &error.to_string());
        to_mcp_error(error)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert a report error to McpError; input errors become invalid params.
fn to_mcp_error(e: ReportError) -> McpError {
    let code = if e.is_input_error() {
        ErrorCode::INVALID_PARAMS
    } else {
        ErrorCode::INTERNAL_ERROR
    };
    McpError {
        code,
        message: Cow::from(e.to_string()),
        data: None,
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

// ============================================================================
// Tool Parameter Structs
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueryReportParams {
    /// Analytics view (profile) ID
    pub view_id: String,
    /// Start date: YYYY-MM-DD, "today", "yesterday" or "NDaysAgo"
    pub start_date: Value,
    /// End date: YYYY-MM-DD, "today", "yesterday" or "NDaysAgo"
    pub end_date: Value,
    /// Metric names (e.g. "ga:users") or objects {"expression": "...", "alias": "..."}
    pub metrics: Vec<Value>,
    /// Dimension names (e.g. "ga:date") or objects {"name": "..."}
    pub dimensions: Option<Vec<Value>>,
    /// Extra request keys forwarded verbatim (e.g. {"samplingLevel": "LARGE", "pageSize": 10000})
    pub options: Option<Map<String, Value>>,
}

impl QueryReportParams {
    fn into_source_args(self) -> SourceArgs {
        SourceArgs {
            view_id: self.view_id,
            start_date: self.start_date,
            end_date: self.end_date,
            metrics: self.metrics.into_iter().map(FieldSpec::from).collect(),
            dimensions: self
                .dimensions
                .map(|dims| dims.into_iter().map(FieldSpec::from).collect()),
            options: self.options.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DescribeSourceParams {
    #[serde(flatten)]
    pub query: QueryReportParams,
    /// Free-text description stored with the catalog entry
    pub description: Option<String>,
    /// Arbitrary metadata stored with the catalog entry
    pub metadata: Option<Map<String, Value>>,
}

// ============================================================================
// Tool Implementations
// ============================================================================

#[tool_router]
impl AnalyticsReportServer {
    #[tool(description = "Run an Analytics Reporting query and return all pages as one typed table. Required: view_id, start_date, end_date, metrics.")]
    async fn query_report(&self, Parameters(params): Parameters<QueryReportParams>) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("query_report", &json!(params));

        let source = QuerySource::new(params.into_source_args());
        let table = source
            .read(&self.client)
            .await
            .map_err(|e| self.fail("query_report", e))?;

        let result = table.to_json();
        self.debug.log_tool_result("query_report", &result);

        Ok(CallToolResult::success(vec![Content::text(pretty(&result))]))
    }

    #[tool(description = "Validate report query parameters and return the catalog entry describing them as a named data source, without fetching data.")]
    async fn describe_report_source(&self, Parameters(params): Parameters<DescribeSourceParams>) -> Result<CallToolResult, McpError> {
        self.debug.log_tool_call("describe_report_source", &json!(params));

        let mut source = QuerySource::new(params.query.into_source_args());
        if let Some(description) = params.description {
            source = source.with_description(description);
        }
        if let Some(metadata) = params.metadata {
            source = source.with_metadata(metadata);
        }

        source
            .validate()
            .map_err(|e| self.fail("describe_report_source", e))?;
        let result = source
            .describe()
            .map_err(|e| self.fail("describe_report_source", e))?;

        self.debug.log_tool_result("describe_report_source", &result);

        Ok(CallToolResult::success(vec![Content::text(pretty(&result))]))
    }
}

// ============================================================================
// Server Handler Implementation
// ============================================================================

#[tool_handler]
impl ServerHandler for AnalyticsReportServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Analytics Reporting MCP Server - Query Google Analytics views by date range, \
                metrics and dimensions. Results are returned as typed tables spanning all pages."
                    .to_string(),
            ),
        }
    }
}
