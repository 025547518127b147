use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::WidgetConfig;
use crate::error::{Error, Result};
use crate::model::{ApiRequest, ApiResponse};

#[derive(Debug, Serialize)]
struct QueryPayload {
    query: String,
    context: QueryContext,
    parameters: QueryParameters,
}

#[derive(Debug, Serialize)]
struct QueryContext {
    selected_text: String,
    page_url: String,
    page_title: String,
}

#[derive(Debug, Serialize)]
struct QueryParameters {
    temperature: f64,
    max_tokens: u32,
}

impl Default for QueryParameters {
    fn default() -> Self {
        QueryParameters {
            temperature: 0.7,
            max_tokens: 500,
        }
    }
}

impl From<&ApiRequest> for QueryPayload {
    fn from(request: &ApiRequest) -> Self {
        QueryPayload {
            query: request.query.clone(),
            context: QueryContext {
                selected_text: request.selected_text.clone(),
                page_url: request.page_context.url.clone(),
                page_title: request.page_context.title.clone(),
            },
            parameters: QueryParameters::default(),
        }
    }
}

/// Snapshot of the client's effective configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_endpoint: String,
    pub timeout_ms: u64,
}

/// HTTP client for the question-answering backend.
///
/// Stateless with respect to conversation content; the only state it carries
/// is the advisory online flag maintained by query results and health checks.
/// The health-monitor task and user-initiated queries may both update the
/// flag; last writer wins.
pub struct ApiClient {
    endpoint: String,
    timeout: Duration,
    http: reqwest::Client,
    online: Arc<AtomicBool>,
    last_check: Arc<Mutex<Option<DateTime<Utc>>>>,
    monitor: Option<JoinHandle<()>>,
}

impl ApiClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let endpoint: String = endpoint.into();
        ApiClient {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            timeout,
            http: reqwest::Client::new(),
            online: Arc::new(AtomicBool::new(true)),
            last_check: Arc::new(Mutex::new(None)),
            monitor: None,
        }
    }

    pub fn from_config(config: &WidgetConfig) -> Self {
        Self::new(config.api_endpoint.clone(), config.timeout())
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            api_endpoint: self.endpoint.clone(),
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn last_check_time(&self) -> Option<DateTime<Utc>> {
        *self.last_check.lock().unwrap()
    }

    fn mark_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        *self.last_check.lock().unwrap() = Some(Utc::now());
    }

    #[cfg(test)]
    pub(crate) fn force_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Send a query to the backend and normalize its answer.
    ///
    /// Transport failures are categorized: timeouts and connection failures
    /// mark the service offline, HTTP 429 leaves it online, HTTP 503 marks it
    /// offline, and anything else non-2xx or unparsable is a generic error.
    pub async fn send_query(&self, request: &ApiRequest) -> Result<ApiResponse> {
        request.validate()?;

        let payload = QueryPayload::from(request);
        let url = format!("{}/api/agent/query", self.endpoint);
        debug!("POST {}", url);

        let response = match self
            .http
            .post(&url)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let err = if e.is_timeout() {
                    Error::Timeout(self.timeout.as_millis() as u64)
                } else if e.is_connect() {
                    Error::NetworkUnavailable
                } else {
                    Error::Generic(format!("Error sending query to backend: {}", e))
                };
                if err.takes_service_offline() {
                    self.mark_online(false);
                }
                return Err(err);
            }
        };

        let status = response.status();
        match status.as_u16() {
            429 => {
                // Rate limited, but the service itself is still up.
                self.mark_online(true);
                return Err(Error::RateLimited);
            }
            503 => {
                self.mark_online(false);
                return Err(Error::ServiceUnavailable);
            }
            _ if !status.is_success() => {
                let message = response
                    .json::<Value>()
                    .await
                    .ok()
                    .and_then(|v| {
                        v.get("message")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    })
                    .unwrap_or_else(|| format!("HTTP {}", status));
                return Err(Error::Generic(format!(
                    "Error sending query to backend: {}",
                    message
                )));
            }
            _ => {}
        }

        self.mark_online(true);

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Generic(format!("Invalid response format from API: {}", e)))?;
        normalize_response(body)
    }

    /// Probe `{endpoint}/health`, updating the online flag and last-check time.
    pub async fn check_health(&self) -> bool {
        let url = format!("{}/health", self.endpoint);
        let healthy = Self::probe(&self.http, &url, self.timeout).await;
        self.mark_online(healthy);
        healthy
    }

    async fn probe(http: &reqwest::Client, url: &str, timeout: Duration) -> bool {
        let response = match http.get(url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("health check failed: {}", e);
                return false;
            }
        };
        if !response.status().is_success() {
            return false;
        }
        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!("health check returned unparsable body: {}", e);
                return false;
            }
        };
        matches!(
            body.get("status").and_then(Value::as_str),
            Some("healthy") | Some("ok")
        ) || body
            .get("message")
            .and_then(Value::as_str)
            .is_some_and(|m| m.contains("running"))
    }

    /// Run a health check immediately and then on a repeating timer.
    ///
    /// Calling this again replaces any existing monitor.
    pub fn start_connection_monitoring(&mut self, interval: Duration) {
        self.stop_connection_monitoring();

        let http = self.http.clone();
        let url = format!("{}/health", self.endpoint);
        let timeout = self.timeout;
        let online = self.online.clone();
        let last_check = self.last_check.clone();

        self.monitor = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                // First tick fires immediately.
                ticker.tick().await;
                let healthy = Self::probe(&http, &url, timeout).await;
                online.store(healthy, Ordering::SeqCst);
                *last_check.lock().unwrap() = Some(Utc::now());
            }
        }));
    }

    /// Stop the health-check timer. No-op when none is running.
    pub fn stop_connection_monitoring(&mut self) {
        if let Some(handle) = self.monitor.take() {
            handle.abort();
        }
    }
}

impl Drop for ApiClient {
    fn drop(&mut self) {
        self.stop_connection_monitoring();
    }
}

/// Reduce the backend's heterogeneous response shapes to the canonical form.
///
/// Fields are accepted under snake_case or camelCase names and under an
/// optional nested `data` wrapper. A body carrying an error envelope
/// (`{status:"error", errors:[..]}`) fails with the joined error messages.
pub(crate) fn normalize_response(body: Value) -> Result<ApiResponse> {
    if !body.is_object() {
        return Err(Error::Generic("Invalid response format from API".into()));
    }

    if body.get("status").and_then(Value::as_str) == Some("error") {
        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            let joined = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(Error::Generic(format!("API Error: {}", joined)));
        }
    }

    let data = match body.get("data") {
        Some(nested) if nested.is_object() => nested,
        _ => &body,
    };

    let answer = field(data, &["answer"])
        .and_then(Value::as_str)
        .filter(|a| !a.trim().is_empty())
        .ok_or_else(|| Error::Generic("response contained no answer".into()))?;

    ApiResponse::new(
        answer,
        field(data, &["sources"]).map(string_list).unwrap_or_default(),
        field(data, &["confidence"]).and_then(Value::as_f64),
        field(data, &["retrieved_context", "retrievedContext"])
            .map(context_list)
            .unwrap_or_default(),
        field(data, &["followup_questions", "followupQuestions"])
            .map(string_list)
            .unwrap_or_default(),
        Utc::now(),
    )
}

/// Look a field up under any of its accepted names, then under a nested
/// `data` wrapper.
fn field<'a>(data: &'a Value, names: &[&str]) -> Option<&'a Value> {
    for name in names {
        if let Some(value) = data.get(name) {
            return Some(value);
        }
    }
    if let Some(nested) = data.get("data") {
        for name in names {
            if let Some(value) = nested.get(name) {
                return Some(value);
            }
        }
    }
    None
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Retrieved-context entries arrive either as bare strings or as objects
/// with a `content` field.
fn context_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    item.as_str()
                        .or_else(|| item.get("content").and_then(Value::as_str))
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}
