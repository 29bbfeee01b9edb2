//! RestClient - HTTP access to the data store's REST endpoint
//!
//! TigerStyle: One client per tier profile; headers fixed at construction.
//!
//! Tables live under `<url>/rest/v1/<table>` and functions under
//! `<url>/rest/v1/rpc/<function>`. Filters use the `column=op.value` form.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;

use super::client::{Filter, SelectQuery, StoreClient};
use crate::config::ConnectionConfig;
use crate::constants::{
    CLIENT_INFO_CACHE_BYPASS, CLIENT_INFO_PRIMARY, CLIENT_INFO_SERVICE,
    HTTP_REQUEST_TIMEOUT_MS_DEFAULT, REST_PATH_PREFIX, SCHEMA_RELOAD_RPC,
};
use crate::error::{StoreError, StoreResult};

// =============================================================================
// Options
// =============================================================================

/// Construction parameters for a [`RestClient`].
#[derive(Clone)]
pub struct RestClientOptions {
    /// Store endpoint
    pub base_url: String,
    /// Key sent as `apikey` and as the bearer token
    pub api_key: String,
    /// Name used in logs
    pub label: String,
    /// Value of the `x-client-info` header, for server-side log correlation
    pub client_info: String,
    /// Additional fixed headers
    pub extra_headers: Vec<(String, String)>,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl std::fmt::Debug for RestClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClientOptions")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("label", &self.label)
            .field("client_info", &self.client_info)
            .field("extra_headers", &self.extra_headers)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl RestClientOptions {
    /// Options with no extra headers.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, label: &str) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            label: label.to_string(),
            client_info: format!("tiered-fallback/{label}"),
            extra_headers: Vec::new(),
            request_timeout: Duration::from_millis(HTTP_REQUEST_TIMEOUT_MS_DEFAULT),
        }
    }

    /// Primary tier: public key, default caching behaviour.
    #[must_use]
    pub fn primary(conn: &ConnectionConfig) -> Self {
        let mut options = Self::new(&conn.url, &conn.anon_key, "primary");
        options.client_info = CLIENT_INFO_PRIMARY.to_string();
        options
    }

    /// Cache-bypass tier: public key plus cache-defeating headers.
    #[must_use]
    pub fn cache_bypass(conn: &ConnectionConfig) -> Self {
        let mut options = Self::new(&conn.url, &conn.anon_key, "cache_bypass")
            .header("Cache-Control", "no-cache, no-store, must-revalidate")
            .header("Pragma", "no-cache")
            .header("Expires", "0");
        options.client_info = CLIENT_INFO_CACHE_BYPASS.to_string();
        options
    }

    /// Service profile used by the direct SQL tier: elevated key.
    #[must_use]
    pub fn service(conn: &ConnectionConfig) -> Self {
        let mut options = Self::new(&conn.url, &conn.service_key, "direct_sql")
            .header("Cache-Control", "no-cache");
        options.client_info = CLIENT_INFO_SERVICE.to_string();
        options
    }

    /// Add a fixed header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    /// Override the per-request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn header_map(&self) -> StoreResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", header_value(&self.api_key)?);
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", self.api_key))?);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert("x-client-info", header_value(&self.client_info)?);

        for (name, value) in &self.extra_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| StoreError::invalid_request(format!("bad header name {name}: {e}")))?;
            headers.insert(name, header_value(value)?);
        }
        Ok(headers)
    }
}

fn header_value(value: &str) -> StoreResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| StoreError::invalid_request(format!("bad header value: {e}")))
}

// =============================================================================
// RestClient
// =============================================================================

/// A [`StoreClient`] speaking to the store's REST endpoint.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
    label: String,
}

impl RestClient {
    /// Build a client from options.
    ///
    /// # Errors
    /// Returns an error if the URL or a header is invalid, or the HTTP client
    /// cannot be built.
    pub fn new(options: RestClientOptions) -> StoreResult<Self> {
        let mut base_url = Url::parse(&options.base_url)
            .map_err(|e| StoreError::invalid_request(format!("bad store url: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .default_headers(options.header_map()?)
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| StoreError::connection(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            label: options.label,
        })
    }

    /// URL for a table, with filters and select options encoded.
    ///
    /// # Errors
    /// Returns an error if the table name cannot form a path segment.
    pub fn table_url(
        &self,
        table: &str,
        filters: &[Filter],
        query: Option<&SelectQuery>,
    ) -> StoreResult<Url> {
        check_segment(table)?;
        let mut url = self.endpoint_url(table)?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(query) = query {
                pairs.append_pair("select", &query.columns);
            }
            for filter in filters {
                pairs.append_pair(
                    &filter.column,
                    &format!("{}.{}", filter.op.as_str(), filter.value),
                );
            }
            if let Some(query) = query {
                if let Some((column, descending)) = &query.order {
                    let direction = if *descending { "desc" } else { "asc" };
                    pairs.append_pair("order", &format!("{column}.{direction}"));
                }
                if let Some(limit) = query.limit {
                    pairs.append_pair("limit", &limit.to_string());
                }
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    /// URL for a server-side function.
    ///
    /// # Errors
    /// Returns an error if the function name cannot form a path segment.
    pub fn rpc_url(&self, function: &str) -> StoreResult<Url> {
        check_segment(function)?;
        self.endpoint_url(&format!("rpc/{function}"))
    }

    fn endpoint_url(&self, path: &str) -> StoreResult<Url> {
        self.base_url
            .join(&format!("{REST_PATH_PREFIX}{path}"))
            .map_err(|e| StoreError::invalid_request(format!("bad endpoint {path}: {e}")))
    }

    async fn send(&self, request: RequestBuilder) -> StoreResult<Value> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(parse_error_body(status, &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    fn write_request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("Prefer", "return=representation")
    }
}

fn check_segment(name: &str) -> StoreResult<()> {
    if name.is_empty() || name.contains(['/', '?', '#']) {
        return Err(StoreError::invalid_request(format!(
            "invalid resource name {name:?}"
        )));
    }
    Ok(())
}

/// Error body returned by the REST endpoint.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    code: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

/// Turn a non-success response into a [`StoreError`].
pub(crate) fn parse_error_body(status: StatusCode, body: &str) -> StoreError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) if parsed.message.is_some() => StoreError::Query {
            message: parsed.message.unwrap_or_default(),
            code: parsed.code,
            details: parsed.details,
            hint: parsed.hint,
        },
        _ => {
            let text = body.trim();
            if text.is_empty() {
                StoreError::query(format!("HTTP {status}"))
            } else {
                StoreError::query(format!("HTTP {status}: {text}"))
            }
        }
    }
}

#[async_trait]
impl StoreClient for RestClient {
    fn label(&self) -> &str {
        &self.label
    }

    async fn select(&self, table: &str, query: &SelectQuery) -> StoreResult<Value> {
        let url = self.table_url(table, &query.filters, Some(query))?;
        self.send(self.http.get(url)).await
    }

    async fn insert(&self, table: &str, rows: Value) -> StoreResult<Value> {
        let url = self.table_url(table, &[], None)?;
        self.send(self.write_request(Method::POST, url).json(&rows))
            .await
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> StoreResult<Value> {
        let url = self.table_url(table, filters, None)?;
        self.send(self.write_request(Method::PATCH, url).json(&patch))
            .await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> StoreResult<Value> {
        let url = self.table_url(table, filters, None)?;
        self.send(self.write_request(Method::DELETE, url)).await
    }

    async fn rpc(&self, function: &str, params: Value) -> StoreResult<Value> {
        let url = self.rpc_url(function)?;
        self.send(self.http.post(url).json(&params)).await
    }

    async fn reload_schema(&self) -> StoreResult<()> {
        self.rpc(SCHEMA_RELOAD_RPC, serde_json::json!({})).await?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
