//! HTTP client for the guard API.
//!
//! [`GuardApi`] is the seam the provisioning workflow and the traffic
//! generator talk to; [`GuardClient`] is its reqwest implementation.

use crate::api_types::{
    Agent, BudgetSnapshot, BudgetSpec, CreateAgentRequest, HealthStatus, JsonObject,
    ResponsesRequest, Run,
};
use crate::config::GuardConfig;
use crate::error::{ClientError, Result, extract_detail};
use async_trait::async_trait;
use reqwest::{Method, Url};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Header carrying the guard API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Operations the guard exposes to this tool.
///
/// Calls are issued one at a time and never retried.
#[async_trait]
pub trait GuardApi: Send + Sync {
    /// `GET /health`
    async fn health(&self) -> Result<HealthStatus>;

    /// `POST /v1/agents`
    async fn create_agent(&self, name: &str) -> Result<Agent>;

    /// `POST /v1/agents/{agent_id}/budget`
    async fn set_budget(&self, agent_id: &str, budget: &BudgetSpec) -> Result<BudgetSnapshot>;

    /// `POST /v1/agents/{agent_id}/runs`
    async fn create_run(&self, agent_id: &str) -> Result<Run>;

    /// `POST /v1/agents/{agent_id}/runs/{run_id}/openai/responses`
    ///
    /// The provider's response is passed through untouched.
    async fn create_response(
        &self,
        agent_id: &str,
        run_id: &str,
        request: &ResponsesRequest,
    ) -> Result<Value>;
}

/// Guard API client over HTTP.
pub struct GuardClient {
    client: reqwest::Client,
    base_url: String,
    root: Url,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl GuardClient {
    /// Create a client from config.
    pub fn new(config: &GuardConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = config.normalized_base_url().to_string();
        let root = Url::parse(&base_url)
            .map_err(|e| ClientError::Config(format!("invalid base URL {base_url}: {e}")))?;
        if root.cannot_be_a_base() {
            return Err(ClientError::Config(format!(
                "base URL cannot carry a path: {base_url}"
            )));
        }

        Ok(Self {
            client,
            base_url,
            root,
            api_key: config.api_key().map(str::to_string),
            timeout_secs: config.timeout_secs,
        })
    }

    /// Base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL for `segments` below the base URL. Each segment is
    /// percent-encoded, so ids containing `/` or `?` stay one segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.root.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ClientError::Config(format!("base URL cannot carry a path: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send one request and decode the body as JSON.
    ///
    /// An empty 2xx body decodes to an empty object.
    async fn request(
        &self,
        method: Method,
        url: &Url,
        body: Option<Value>,
        authenticated: bool,
    ) -> Result<Value> {
        let path = url.path();
        debug!(method = %method, url = %url, "Sending guard request");

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");

        if authenticated && let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.map_send_error(e, url.as_str()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.map_send_error(e, url.as_str()))?;

        if !status.is_success() {
            return Err(ClientError::Http {
                status: status.as_u16(),
                method: method.to_string(),
                path: path.to_string(),
                detail: extract_detail(&text),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Object(JsonObject::new()));
        }

        serde_json::from_str(&text)
            .map_err(|e| ClientError::schema(path, format!("response is not valid JSON: {e}")))
    }

    /// Like [`request`](Self::request), but the body must be a JSON object.
    async fn request_object(
        &self,
        method: Method,
        url: &Url,
        body: Option<Value>,
        authenticated: bool,
    ) -> Result<JsonObject> {
        match self.request(method, url, body, authenticated).await? {
            Value::Object(map) => Ok(map),
            _ => Err(ClientError::schema(url.path(), "Expected JSON object response")),
        }
    }

    fn map_send_error(&self, error: reqwest::Error, url: &str) -> ClientError {
        if error.is_timeout() {
            ClientError::Timeout {
                secs: self.timeout_secs,
                url: url.to_string(),
            }
        } else if error.is_connect() {
            ClientError::ConnectionFailed(format!("{url}: {error}"))
        } else {
            ClientError::Transport(error)
        }
    }
}

fn to_body<T: serde::Serialize>(payload: &T) -> Result<Value> {
    serde_json::to_value(payload)
        .map_err(|e| ClientError::validation(format!("request body could not be encoded: {e}")))
}

#[async_trait]
impl GuardApi for GuardClient {
    async fn health(&self) -> Result<HealthStatus> {
        let url = self.endpoint(&["health"])?;
        let body = self.request_object(Method::GET, &url, None, false).await?;
        Ok(HealthStatus::from_object(&body))
    }

    async fn create_agent(&self, name: &str) -> Result<Agent> {
        let url = self.endpoint(&["v1", "agents"])?;
        let payload = to_body(&CreateAgentRequest { name })?;
        let body = self
            .request_object(Method::POST, &url, Some(payload), true)
            .await?;
        Agent::from_object(url.path(), body)
    }

    async fn set_budget(&self, agent_id: &str, budget: &BudgetSpec) -> Result<BudgetSnapshot> {
        let url = self.endpoint(&["v1", "agents", agent_id, "budget"])?;
        let body = self
            .request_object(Method::POST, &url, Some(to_body(budget)?), true)
            .await?;
        Ok(BudgetSnapshot::from_object(body))
    }

    async fn create_run(&self, agent_id: &str) -> Result<Run> {
        let url = self.endpoint(&["v1", "agents", agent_id, "runs"])?;
        let body = self
            .request_object(Method::POST, &url, Some(Value::Object(JsonObject::new())), true)
            .await?;
        Run::from_object(url.path(), body)
    }

    async fn create_response(
        &self,
        agent_id: &str,
        run_id: &str,
        request: &ResponsesRequest,
    ) -> Result<Value> {
        let url = self.endpoint(&[
            "v1", "agents", agent_id, "runs", run_id, "openai", "responses",
        ])?;
        self.request(Method::POST, &url, Some(to_body(request)?), true)
            .await
    }
}
