use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod splunk_client;

use splunk_client::ConnectorProvider;

#[derive(Clone)]
pub struct AppState {
    pub api_token: Arc<str>,
    pub connector: Arc<dyn ConnectorProvider>,
}

impl AppState {
    pub fn new(api_token: String, connector: Arc<dyn ConnectorProvider>) -> Self {
        Self {
            api_token: Arc::<str>::from(api_token),
            connector,
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/mcp", post(http::handlers::mcp_endpoint))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer_token,
        ));

    Router::new()
        .route("/health", get(http::handlers::health))
        .route("/.well-known/mcp", get(http::handlers::discovery))
        .merge(protected)
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::domain::tools::{
        INDEXES_ENDPOINT, SEARCH_EXPORT_ENDPOINT, SERVICE_ANALYZER_VIEW_ENDPOINT,
        SERVICE_LISTING_ENDPOINT,
    };
    use crate::errors::AppError;
    use crate::splunk_client::{ConnectorProvider, SplunkApi};

    use super::*;

    const TEST_TOKEN: &str = "token-1234567890ab";

    fn analyzer_view_payload() -> Value {
        json!({
            "aggregate_health": 87,
            "services": [{"key": "svc-1", "severity": "normal"}]
        })
    }

    fn indexes_payload() -> Value {
        json!({"entry": [{"name": "main"}, {"name": "_internal"}]})
    }

    fn export_payload() -> Value {
        json!({"results": [{"_raw": "log line", "host": "web-01"}]})
    }

    fn default_service_listing() -> Value {
        json!([
            {"title": "B", "health_score": 90},
            {"title": "A", "health_score": 10},
            {"health_score": 55},
            {"title": "NoScore"},
        ])
    }

    struct MockProvider {
        service_listing: Value,
        fail_remote: bool,
        fail_connect: bool,
        connects: Arc<AtomicUsize>,
        remote_calls: Arc<AtomicUsize>,
        post_forms: Arc<Mutex<Vec<(String, Vec<(String, String)>)>>>,
    }

    impl MockProvider {
        fn new() -> Self {
            Self {
                service_listing: default_service_listing(),
                fail_remote: false,
                fail_connect: false,
                connects: Arc::new(AtomicUsize::new(0)),
                remote_calls: Arc::new(AtomicUsize::new(0)),
                post_forms: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn with_service_listing(listing: Value) -> Self {
            Self {
                service_listing: listing,
                ..Self::new()
            }
        }

        fn failing_remote() -> Self {
            Self {
                fail_remote: true,
                ..Self::new()
            }
        }

        fn failing_connect() -> Self {
            Self {
                fail_connect: true,
                ..Self::new()
            }
        }
    }

    impl ConnectorProvider for MockProvider {
        fn connect(&self) -> Result<Box<dyn SplunkApi>, AppError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail_connect {
                return Err(AppError::configuration(
                    "missing Splunk credentials: SPLUNK_URL, SPLUNK_USERNAME, and SPLUNK_PASSWORD are required",
                ));
            }

            Ok(Box::new(MockApi {
                service_listing: self.service_listing.clone(),
                fail_remote: self.fail_remote,
                remote_calls: self.remote_calls.clone(),
                post_forms: self.post_forms.clone(),
            }))
        }
    }

    struct MockApi {
        service_listing: Value,
        fail_remote: bool,
        remote_calls: Arc<AtomicUsize>,
        post_forms: Arc<Mutex<Vec<(String, Vec<(String, String)>)>>>,
    }

    #[async_trait::async_trait]
    impl SplunkApi for MockApi {
        async fn get(&self, endpoint: &str, _params: &[(&str, &str)]) -> Result<Value, AppError> {
            self.remote_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_remote {
                return Err(AppError::remote_request(format!(
                    "GET {endpoint} returned HTTP 503"
                )));
            }

            match endpoint {
                SERVICE_ANALYZER_VIEW_ENDPOINT => Ok(analyzer_view_payload()),
                INDEXES_ENDPOINT => Ok(indexes_payload()),
                SERVICE_LISTING_ENDPOINT => Ok(self.service_listing.clone()),
                _ => Err(AppError::internal(format!("unexpected endpoint {endpoint}"))),
            }
        }

        async fn post_form(&self, endpoint: &str, form: &[(&str, &str)]) -> Result<Value, AppError> {
            self.remote_calls.fetch_add(1, Ordering::SeqCst);
            self.post_forms.lock().expect("post form lock").push((
                endpoint.to_string(),
                form.iter()
                    .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
                    .collect(),
            ));

            if self.fail_remote {
                return Err(AppError::remote_request(format!(
                    "POST {endpoint} returned HTTP 503"
                )));
            }

            Ok(export_payload())
        }
    }

    fn app_with(provider: MockProvider) -> Router {
        let state = AppState::new(TEST_TOKEN.to_string(), Arc::new(provider));
        build_app(state)
    }

    fn app() -> Router {
        app_with(MockProvider::new())
    }

    async fn post_mcp(app: Router, body: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/mcp")
                    .method("POST")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::AUTHORIZATION, format!("Bearer {TEST_TOKEN}"))
                    .body(Body::from(body.to_string()))
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        let body_json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("valid json response")
        };

        (status, body_json)
    }

    fn tool_call_body(id: u64, name: &str, arguments: Value) -> String {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": {"name": name, "arguments": arguments}
        })
        .to_string()
    }

    fn document_from(body_json: &Value) -> &str {
        body_json["result"]["content"][0]["text"]
            .as_str()
            .expect("text content")
    }

    #[tokio::test]
    async fn health_is_public() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        assert_eq!(body, "{\"status\":\"ok\"}");
    }

    #[tokio::test]
    async fn discovery_is_public() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/.well-known/mcp")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::OK);
        let body = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        let body_json: serde_json::Value =
            serde_json::from_slice(&body).expect("valid json response");
        assert_eq!(body_json["mcp_endpoint"], "/mcp");
    }

    #[tokio::test]
    async fn root_get_is_not_found() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .method("GET")
                    .body(Body::empty())
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn mcp_requires_token() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/mcp")
                    .method("POST")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
                    .expect("request build"),
            )
            .await
            .expect("request execution");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn mcp_initialize_returns_result() {
        let (status, body_json) = post_mcp(
            app(),
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","clientInfo":{"name":"test-client","version":"1.0.0"},"capabilities":{}}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body_json["jsonrpc"], "2.0");
        assert_eq!(body_json["id"], 1);
        assert_eq!(body_json["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(
            body_json["result"]["serverInfo"]["name"],
            env!("CARGO_PKG_NAME")
        );
        assert_eq!(
            body_json["result"]["serverInfo"]["version"],
            env!("CARGO_PKG_VERSION")
        );
        assert!(body_json["result"]["capabilities"]["tools"].is_object());
        assert!(body_json["result"]["capabilities"]["resources"].is_null());
        assert!(body_json["result"]["capabilities"]["prompts"].is_null());
    }

    #[tokio::test]
    async fn mcp_unknown_method_returns_method_not_found() {
        let (status, body_json) =
            post_mcp(app(), r#"{"jsonrpc":"2.0","id":1,"method":"unknown"}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body_json["error"]["code"], -32601);
        assert_eq!(body_json["error"]["message"], "Method not found");
    }

    #[tokio::test]
    async fn mcp_parse_error_for_invalid_json() {
        let (status, body_json) = post_mcp(app(), "{").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body_json["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn mcp_tools_list_returns_the_four_tools() {
        let (status, body_json) = post_mcp(
            app(),
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list","params":{}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body_json["id"], 2);
        let tools = body_json["result"]["tools"]
            .as_array()
            .expect("tools array");
        let names: Vec<&str> = tools
            .iter()
            .filter_map(|tool| tool["name"].as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "get_service_analyzer_view",
                "run_splunk_search",
                "get_splunk_indexes",
                "visualize_service_health",
            ]
        );
    }

    #[tokio::test]
    async fn analyzer_view_passes_payload_through() {
        let (status, body_json) = post_mcp(
            app(),
            &tool_call_body(3, "get_service_analyzer_view", json!({})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body_json["id"], 3);
        assert_eq!(
            body_json["result"]["structuredContent"],
            analyzer_view_payload()
        );
        assert!(body_json.get("error").is_none());
    }

    #[tokio::test]
    async fn indexes_listing_is_idempotent() {
        let provider = MockProvider::new();
        let state = AppState::new(TEST_TOKEN.to_string(), Arc::new(provider));

        let (_, first) = post_mcp(
            build_app(state.clone()),
            &tool_call_body(4, "get_splunk_indexes", json!({})),
        )
        .await;
        let (_, second) = post_mcp(
            build_app(state),
            &tool_call_body(5, "get_splunk_indexes", json!({})),
        )
        .await;

        assert_eq!(first["result"]["structuredContent"], indexes_payload());
        assert_eq!(
            first["result"]["structuredContent"],
            second["result"]["structuredContent"]
        );
    }

    #[tokio::test]
    async fn each_tool_call_builds_a_fresh_connector() {
        let provider = MockProvider::new();
        let connects = provider.connects.clone();
        let state = AppState::new(TEST_TOKEN.to_string(), Arc::new(provider));

        let _ = post_mcp(
            build_app(state.clone()),
            &tool_call_body(6, "get_splunk_indexes", json!({})),
        )
        .await;
        let _ = post_mcp(
            build_app(state),
            &tool_call_body(7, "get_splunk_indexes", json!({})),
        )
        .await;

        assert_eq!(connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn search_passes_query_verbatim_and_payload_back() {
        let provider = MockProvider::new();
        let post_forms = provider.post_forms.clone();
        let query = "search index=_internal | head 10";

        let (status, body_json) = post_mcp(
            app_with(provider),
            &tool_call_body(8, "run_splunk_search", json!({"search_query": query})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body_json["result"]["structuredContent"], export_payload());

        let recorded = post_forms.lock().expect("post form lock");
        assert_eq!(recorded.len(), 1);
        let (endpoint, form) = &recorded[0];
        assert_eq!(endpoint, SEARCH_EXPORT_ENDPOINT);
        assert!(form.contains(&("search".to_string(), query.to_string())));
        assert!(form.contains(&("output_mode".to_string(), "json".to_string())));
    }

    #[tokio::test]
    async fn search_without_query_returns_invalid_params() {
        let (status, body_json) =
            post_mcp(app(), &tool_call_body(9, "run_splunk_search", json!({}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body_json["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn remote_failure_becomes_error_field_not_rpc_error() {
        let (status, body_json) = post_mcp(
            app_with(MockProvider::failing_remote()),
            &tool_call_body(10, "get_splunk_indexes", json!({})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body_json.get("error").is_none());
        assert_eq!(body_json["result"]["isError"], true);
        let message = body_json["result"]["structuredContent"]["error"]
            .as_str()
            .expect("error message");
        assert!(message.contains("HTTP 503"));
    }

    #[tokio::test]
    async fn connect_failure_issues_no_remote_call() {
        let provider = MockProvider::failing_connect();
        let remote_calls = provider.remote_calls.clone();

        let (status, body_json) = post_mcp(
            app_with(provider),
            &tool_call_body(11, "get_service_analyzer_view", json!({})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let message = body_json["result"]["structuredContent"]["error"]
            .as_str()
            .expect("error message");
        assert!(message.contains("configuration error"));
        assert_eq!(remote_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn visualize_renders_chart_in_input_order() {
        let (status, body_json) = post_mcp(
            app(),
            &tool_call_body(12, "visualize_service_health", json!({})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let document = document_from(&body_json);
        assert!(document.starts_with("<!DOCTYPE html>"));
        assert!(document.contains(r#""labels":["B","A","N/A","NoScore"]"#));
        assert!(document.contains("rgba(75, 192, 192, 0.8)"));
        assert!(document.contains("rgba(255, 99, 132, 0.8)"));
        assert!(body_json["result"].get("structuredContent").is_none());
    }

    #[tokio::test]
    async fn visualize_with_empty_listing_returns_no_data_document() {
        let (status, body_json) = post_mcp(
            app_with(MockProvider::with_service_listing(json!([]))),
            &tool_call_body(13, "visualize_service_health", json!({})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let document = document_from(&body_json);
        assert!(document.contains("No Data"));
        assert!(!document.contains("Error"));
    }

    #[tokio::test]
    async fn visualize_with_non_array_listing_returns_error_document() {
        let (status, body_json) = post_mcp(
            app_with(MockProvider::with_service_listing(json!({"entry": []}))),
            &tool_call_body(14, "visualize_service_health", json!({})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let document = document_from(&body_json);
        assert!(document.contains("Could not generate visualization"));
        assert!(document.contains("transform error"));
    }

    #[tokio::test]
    async fn visualize_remote_failure_returns_error_document() {
        let (status, body_json) = post_mcp(
            app_with(MockProvider::failing_remote()),
            &tool_call_body(15, "visualize_service_health", json!({})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let document = document_from(&body_json);
        assert!(document.starts_with("<html>"));
        assert!(document.contains("Could not generate visualization"));
    }

    #[tokio::test]
    async fn mcp_tools_call_unknown_tool_returns_tool_not_found_data() {
        let (status, body_json) =
            post_mcp(app(), &tool_call_body(16, "unknown_tool", json!({}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body_json["error"]["code"], -32601);
        assert_eq!(body_json["error"]["data"]["code"], "tool_not_found");
    }

    #[tokio::test]
    async fn mcp_tools_call_malformed_params_returns_invalid_params() {
        let (status, body_json) = post_mcp(
            app(),
            r#"{"jsonrpc":"2.0","id":17,"method":"tools/call","params":{"name":"run_splunk_search","arguments":"not-an-object"}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body_json["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn mcp_notification_returns_no_content() {
        let (status, body_json) = post_mcp(app(), r#"{"jsonrpc":"2.0","method":"ping"}"#).await;

        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body_json, Value::Null);
    }

    #[tokio::test]
    async fn mcp_batch_mixed_requests_return_only_id_responses() {
        let (status, body_json) = post_mcp(
            app(),
            r#"[{"jsonrpc":"2.0","method":"ping"},{"jsonrpc":"2.0","id":100,"method":"ping"},{"jsonrpc":"2.0","id":200,"method":"tools/list","params":{}}]"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let responses = body_json.as_array().expect("batch response array");
        assert_eq!(responses.len(), 2);
        let ids: Vec<i64> = responses
            .iter()
            .filter_map(|item| item["id"].as_i64())
            .collect();
        assert!(ids.contains(&100));
        assert!(ids.contains(&200));
    }
}
