//! Interactive tools exposed via Model Context Protocol
//!
//! Each tool builds one connector, issues its remote call(s), and converts any
//! failure into the tool's declared error shape at the boundary. JSON-RPC
//! errors are reserved for inbound protocol faults (bad params, unknown tool).

use rust_mcp_sdk::{
    macros,
    schema::{CallToolRequestParams, CallToolResult, ContentBlock, TextContent, Tool},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

use crate::domain::chart::{extract_health_rows, render_error_document, render_health_chart};
use crate::mcp::rpc::{json_rpc_error, json_rpc_error_with_data, json_rpc_result};
use crate::{errors::AppError, AppState};

pub const SERVICE_ANALYZER_VIEW_ENDPOINT: &str =
    "/servicesNS/nobody/SA-ITOA/itoa_interface/service_analyzer_view";
pub const SEARCH_EXPORT_ENDPOINT: &str = "/services/search/jobs/export";
pub const INDEXES_ENDPOINT: &str = "/services/data/indexes";
pub const SERVICE_LISTING_ENDPOINT: &str = "/servicesNS/nobody/SA-ITOA/itoa_interface/service";

#[derive(Debug, Deserialize)]
pub struct SearchQueryParams {
    pub search_query: String,
}

#[macros::mcp_tool(
    name = "get_service_analyzer_view",
    description = "Retrieve the high-level service health view from the ITSI Service Analyzer"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct GetServiceAnalyzerViewTool {}

#[macros::mcp_tool(
    name = "run_splunk_search",
    description = "Execute a Splunk search query (SPL) and return the exported results"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct RunSplunkSearchTool {
    pub search_query: String,
}

#[macros::mcp_tool(
    name = "get_splunk_indexes",
    description = "List all configured Splunk indexes"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct GetSplunkIndexesTool {}

#[macros::mcp_tool(
    name = "visualize_service_health",
    description = "Generate an HTML bar chart of ITSI service health scores"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct VisualizeServiceHealthTool {}

pub fn build_tools_list() -> Vec<Tool> {
    vec![
        GetServiceAnalyzerViewTool::tool(),
        RunSplunkSearchTool::tool(),
        GetSplunkIndexesTool::tool(),
        VisualizeServiceHealthTool::tool(),
    ]
}

async fn fetch_analyzer_view(state: &AppState) -> Result<Value, AppError> {
    let connector = state.connector.connect()?;
    connector.get(SERVICE_ANALYZER_VIEW_ENDPOINT, &[]).await
}

async fn run_search(state: &AppState, search_query: &str) -> Result<Value, AppError> {
    let connector = state.connector.connect()?;
    // The query goes through verbatim; output_mode keeps the export JSON.
    connector
        .post_form(
            SEARCH_EXPORT_ENDPOINT,
            &[("search", search_query), ("output_mode", "json")],
        )
        .await
}

async fn fetch_indexes(state: &AppState) -> Result<Value, AppError> {
    let connector = state.connector.connect()?;
    connector.get(INDEXES_ENDPOINT, &[]).await
}

async fn render_service_health(state: &AppState) -> Result<String, AppError> {
    let connector = state.connector.connect()?;
    let services = connector.get(SERVICE_LISTING_ENDPOINT, &[]).await?;
    let rows = extract_health_rows(&services)?;
    Ok(render_health_chart(&rows))
}

/// Boundary conversion for the JSON pass-through tools: success returns the
/// payload unmodified, failure returns `{"error": message}` in the same shape.
fn json_tool_result(id: Option<Value>, tool_name: &str, outcome: Result<Value, AppError>) -> Value {
    let (payload, is_error) = match outcome {
        Ok(payload) => (payload, None),
        Err(err) => {
            error!(tool = tool_name, error = %err, "tool call failed");
            (json!({ "error": err.to_string() }), Some(true))
        }
    };

    json_rpc_result(
        id,
        serde_json::to_value(CallToolResult {
            content: vec![ContentBlock::from(TextContent::new(
                payload.to_string(),
                None,
                None,
            ))],
            is_error,
            meta: None,
            structured_content: payload.as_object().cloned(),
        })
        .expect("tool result serialization"),
    )
}

/// Boundary conversion for the visualization tool: the return is always a
/// renderable HTML document, even on failure.
fn document_tool_result(id: Option<Value>, tool_name: &str, outcome: Result<String, AppError>) -> Value {
    let document = match outcome {
        Ok(document) => document,
        Err(err) => {
            error!(tool = tool_name, error = %err, "tool call failed");
            render_error_document(&err.to_string())
        }
    };

    json_rpc_result(
        id,
        serde_json::to_value(CallToolResult {
            content: vec![ContentBlock::from(TextContent::new(document, None, None))],
            is_error: None,
            meta: None,
            structured_content: None,
        })
        .expect("tool result serialization"),
    )
}

pub async fn handle_tools_call(state: &AppState, id: Option<Value>, params: Option<Value>) -> Value {
    let Some(raw_params) = params else {
        return json_rpc_error(id, -32602, "Invalid params");
    };

    let tool_call: CallToolRequestParams = match serde_json::from_value(raw_params) {
        Ok(value) => value,
        Err(_) => return json_rpc_error(id, -32602, "Invalid params"),
    };

    match tool_call.name.as_str() {
        "get_service_analyzer_view" => json_tool_result(
            id,
            "get_service_analyzer_view",
            fetch_analyzer_view(state).await,
        ),
        "run_splunk_search" => {
            let query_params: SearchQueryParams =
                match serde_json::from_value(json!(tool_call.arguments.unwrap_or_default())) {
                    Ok(value) => value,
                    Err(_) => return json_rpc_error(id, -32602, "Invalid params"),
                };

            json_tool_result(
                id,
                "run_splunk_search",
                run_search(state, &query_params.search_query).await,
            )
        }
        "get_splunk_indexes" => json_tool_result(id, "get_splunk_indexes", fetch_indexes(state).await),
        "visualize_service_health" => document_tool_result(
            id,
            "visualize_service_health",
            render_service_health(state).await,
        ),
        _ => json_rpc_error_with_data(
            id,
            -32601,
            "Method not found",
            Some(json!({
                "code": "tool_not_found",
                "message": "unknown tool name",
                "details": {
                    "name": tool_call.name,
                },
            })),
        ),
    }
}
