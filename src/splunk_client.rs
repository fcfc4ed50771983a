//! Authenticated HTTP access to the Splunk management API
//!
//! Owns endpoint normalization, HTTP Basic credentials, and the JSON response
//! envelope shared by every tool. One connector is built per tool invocation
//! and dropped when the invocation completes.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{config::SplunkCredentials, errors::AppError};

/// Splunk management (splunkd) port, appended to the configured base URL.
pub const MANAGEMENT_PORT: u16 = 8089;

#[async_trait]
pub trait SplunkApi: Send + Sync {
    async fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value, AppError>;
    async fn post_form(&self, endpoint: &str, form: &[(&str, &str)]) -> Result<Value, AppError>;
}

/// Builds one connector per tool invocation. The indirection keeps the tool
/// surface testable against a mock API without touching the network.
pub trait ConnectorProvider: Send + Sync {
    fn connect(&self) -> Result<Box<dyn SplunkApi>, AppError>;
}

pub struct SplunkConnectorProvider {
    credentials: SplunkCredentials,
}

impl SplunkConnectorProvider {
    pub fn new(credentials: SplunkCredentials) -> Self {
        Self { credentials }
    }
}

impl ConnectorProvider for SplunkConnectorProvider {
    fn connect(&self) -> Result<Box<dyn SplunkApi>, AppError> {
        Ok(Box::new(SplunkConnector::new(&self.credentials)?))
    }
}

/// Connector bound to a single splunkd endpoint and account.
///
/// Certificate verification is disabled because Splunk management ports
/// commonly serve self-signed certificates. No retries and no timeout beyond
/// the transport defaults; a hung remote call blocks the invocation.
#[derive(Debug)]
pub struct SplunkConnector {
    base_url: String,
    username: String,
    password: String,
    client: reqwest::Client,
}

impl SplunkConnector {
    pub fn new(credentials: &SplunkCredentials) -> Result<Self, AppError> {
        if credentials.base_url.trim().is_empty()
            || credentials.username.trim().is_empty()
            || credentials.password.trim().is_empty()
        {
            return Err(AppError::configuration(
                "missing Splunk credentials: SPLUNK_URL, SPLUNK_USERNAME, and SPLUNK_PASSWORD are required",
            ));
        }

        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| AppError::internal(format!("failed to build http client: {err}")))?;

        Ok(Self {
            base_url: normalize_base_url(&credentials.base_url),
            username: credentials.username.clone(),
            password: credentials.password.clone(),
            client,
        })
    }
}

#[async_trait]
impl SplunkApi for SplunkConnector {
    async fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value, AppError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let query = merge_query_params(params);

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .query(&query)
            .send()
            .await
            .map_err(|err| AppError::remote_request(format!("GET {endpoint} failed: {err}")))?;

        read_json_response("GET", endpoint, response).await
    }

    async fn post_form(&self, endpoint: &str, form: &[(&str, &str)]) -> Result<Value, AppError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .form(form)
            .send()
            .await
            .map_err(|err| AppError::remote_request(format!("POST {endpoint} failed: {err}")))?;

        read_json_response("POST", endpoint, response).await
    }
}

fn normalize_base_url(base_url: &str) -> String {
    format!("{}:{MANAGEMENT_PORT}", base_url.trim().trim_end_matches('/'))
}

/// Merges caller params onto the forced `output_mode=json` default. A caller
/// value for `output_mode` wins, but the key is always present in the request.
fn merge_query_params(params: &[(&str, &str)]) -> Vec<(String, String)> {
    let mut merged = vec![("output_mode".to_string(), "json".to_string())];

    for (key, value) in params {
        match merged.iter_mut().find(|(existing, _)| existing == key) {
            Some(entry) => entry.1 = (*value).to_string(),
            None => merged.push(((*key).to_string(), (*value).to_string())),
        }
    }

    merged
}

async fn read_json_response(
    method: &str,
    endpoint: &str,
    response: reqwest::Response,
) -> Result<Value, AppError> {
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::remote_request(format!(
            "{method} {endpoint} returned HTTP {status}"
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|err| AppError::remote_request(format!("{method} {endpoint} body read failed: {err}")))?;

    parse_json_body(&body)
        .ok_or_else(|| AppError::remote_request(format!("{method} {endpoint} returned a non-JSON body")))
}

/// Parses a response body as one JSON document, falling back to the
/// newline-delimited stream the search export endpoint produces for larger
/// result sets. Stream records are collected under a `results` key.
fn parse_json_body(body: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Some(value);
    }

    let lines: Vec<&str> = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        return None;
    }

    let records = lines
        .into_iter()
        .map(serde_json::from_str::<Value>)
        .collect::<Result<Vec<_>, _>>()
        .ok()?;

    Some(json!({ "results": records }))
}
