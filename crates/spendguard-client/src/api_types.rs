//! Request and response types for the guard API.

use crate::error::{ClientError, Result};
use serde::Serialize;
use serde_json::{Map, Value};

/// A JSON object returned by the guard.
pub type JsonObject = Map<String, Value>;

/// Result of `GET /health`.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthStatus {
    /// Value of the `status` field, if it was a string
    pub status: Option<String>,
}

impl HealthStatus {
    pub(crate) fn from_object(body: &JsonObject) -> Self {
        Self {
            status: body
                .get("status")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }

    /// Only an exact `ok` counts as healthy.
    pub fn is_ok(&self) -> bool {
        self.status.as_deref() == Some("ok")
    }
}

/// Body of `POST /v1/agents`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateAgentRequest<'a> {
    pub name: &'a str,
}

/// Agent returned by `POST /v1/agents`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Agent {
    #[serde(skip)]
    pub agent_id: String,

    /// Full response body
    #[serde(flatten)]
    pub raw: JsonObject,
}

impl Agent {
    pub(crate) fn from_object(endpoint: &str, raw: JsonObject) -> Result<Self> {
        let agent_id = required_id(endpoint, &raw, "agent_id")?;
        Ok(Self { agent_id, raw })
    }
}

/// Budget for an agent, the body of `POST /v1/agents/{id}/budget`.
///
/// Both amounts are validated at construction, so a `BudgetSpec` that exists
/// is always safe to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BudgetSpec {
    hard_limit_cents: i64,
    topup_cents: i64,
}

impl BudgetSpec {
    /// Validate a budget. `topup_cents` defaults to `hard_limit_cents`.
    pub fn new(hard_limit_cents: i64, topup_cents: Option<i64>) -> Result<Self> {
        if hard_limit_cents <= 0 {
            return Err(ClientError::validation(format!(
                "hard limit must be greater than 0 cents (got {hard_limit_cents})"
            )));
        }
        let topup_cents = topup_cents.unwrap_or(hard_limit_cents);
        if topup_cents <= 0 {
            return Err(ClientError::validation(format!(
                "topup must be greater than 0 cents (got {topup_cents})"
            )));
        }
        Ok(Self {
            hard_limit_cents,
            topup_cents,
        })
    }

    pub fn hard_limit_cents(&self) -> i64 {
        self.hard_limit_cents
    }

    pub fn topup_cents(&self) -> i64 {
        self.topup_cents
    }
}

/// Budget state returned by the guard after it was set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetSnapshot {
    #[serde(skip)]
    pub hard_limit_cents: Option<i64>,

    #[serde(skip)]
    pub remaining_cents: Option<i64>,

    /// Full response body
    #[serde(flatten)]
    pub raw: JsonObject,
}

impl BudgetSnapshot {
    pub(crate) fn from_object(raw: JsonObject) -> Self {
        Self {
            hard_limit_cents: raw.get("hard_limit_cents").and_then(Value::as_i64),
            remaining_cents: raw.get("remaining_cents").and_then(Value::as_i64),
            raw,
        }
    }
}

/// Run returned by `POST /v1/agents/{id}/runs`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Run {
    #[serde(skip)]
    pub run_id: String,

    /// Full response body
    #[serde(flatten)]
    pub raw: JsonObject,
}

impl Run {
    pub(crate) fn from_object(endpoint: &str, raw: JsonObject) -> Result<Self> {
        let run_id = required_id(endpoint, &raw, "run_id")?;
        Ok(Self { run_id, raw })
    }
}

/// Reasoning options for a metered request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reasoning {
    pub effort: String,
}

/// Body of a metered `POST /v1/agents/{agent}/runs/{run}/openai/responses`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponsesRequest {
    pub model: String,
    pub input: String,
    pub max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Reasoning>,
}

fn required_id(endpoint: &str, body: &JsonObject, field: &str) -> Result<String> {
    match body.get(field) {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::String(_)) => Err(ClientError::schema(
            endpoint,
            format!("'{field}' is empty"),
        )),
        Some(other) => Err(ClientError::schema(
            endpoint,
            format!("'{field}' is not a string: {other}"),
        )),
        None => Err(ClientError::schema(
            endpoint,
            format!("response is missing '{field}'"),
        )),
    }
}
