//! Error types for the guard client.
//!
//! Nothing here is retried. Transport failures, unhealthy status and malformed
//! responses all abort the workflow that hit them.

use thiserror::Error;

/// Guard client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Guard answered with a non-2xx status
    #[error("HTTP {status} {method} {path}: {detail}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Request method
        method: String,
        /// Request path
        path: String,
        /// Server-provided `detail`, or the raw body
        detail: String,
    },

    /// Network timeout
    #[error("Request timed out after {secs}s: {url}")]
    Timeout {
        /// Configured per-call timeout
        secs: u64,
        /// Request URL
        url: String,
    },

    /// Connection failed
    #[error("Request failed: {0}")]
    ConnectionFailed(String),

    /// Other HTTP client error
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Input rejected before any request was sent
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Response did not have the expected shape
    #[error("Unexpected response from {endpoint}: {message}")]
    Schema {
        /// Endpoint that returned the response
        endpoint: String,
        /// What was wrong with it
        message: String,
    },

    /// `/health` did not report `status=ok`
    #[error("Health check failed: /health did not return status=ok (got {status})")]
    Unhealthy {
        /// Reported status, or `missing`
        status: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a schema error for `endpoint`.
    pub fn schema(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Check if this error came from the network or a non-2xx response.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::Http { .. }
                | ClientError::Timeout { .. }
                | ClientError::ConnectionFailed(_)
                | ClientError::Transport(_)
        )
    }

    /// Check if this error was raised before any request was sent.
    pub fn is_validation(&self) -> bool {
        matches!(self, ClientError::Validation(_) | ClientError::Config(_))
    }

    /// Check if the guard broke its response contract.
    pub fn is_schema(&self) -> bool {
        matches!(self, ClientError::Schema { .. } | ClientError::Unhealthy { .. })
    }

    /// Get a user-friendly error message.
    pub fn friendly_message(&self) -> String {
        match self {
            ClientError::Http { status, detail, .. } => match status {
                401 | 403 => format!("Guard rejected the credentials ({status}): {detail}"),
                402 => format!("Budget exhausted ({status}): {detail}"),
                _ => format!("Guard returned HTTP {status}: {detail}"),
            },
            ClientError::Timeout { secs, .. } => {
                format!("Request timed out after {secs}s. Is the guard reachable?")
            }
            ClientError::ConnectionFailed(msg) => {
                format!("Could not connect to the guard: {msg}")
            }
            ClientError::Validation(msg) => format!("Invalid input: {msg}"),
            _ => self.to_string(),
        }
    }

    /// Get suggested action for this error.
    pub fn suggested_action(&self) -> &'static str {
        match self {
            ClientError::Http { status: 401 | 403, .. } => {
                "Check --api-key or CAP_API_KEY for hosted deployments."
            }
            ClientError::Http { status: 402, .. } => "Raise the hard limit or top up the agent.",
            ClientError::Http { status: 404, .. } => "Check --base-url points at the guard.",
            ClientError::Timeout { .. } => "Increase --timeout-secs or check the guard's health.",
            ClientError::ConnectionFailed(_) => "Verify the guard is running at --base-url.",
            ClientError::Unhealthy { .. } => "Wait for the guard to report healthy, or pass --skip-health-check.",
            ClientError::Schema { .. } => "Check that the guard version matches this tool.",
            ClientError::Validation(_) | ClientError::Config(_) => "Fix the arguments and run again.",
            ClientError::Transport(e) if e.is_timeout() => "Request timed out. Try again.",
            ClientError::Transport(e) if e.is_connect() => "Could not connect. Check your network.",
            _ => "Check the logs for details.",
        }
    }
}

/// Pull the `detail` string out of an error body.
///
/// Returns the body verbatim when it is not a JSON object with a string
/// `detail`, and `request failed` when the body is empty.
pub fn extract_detail(body: &str) -> String {
    if body.trim().is_empty() {
        return "request failed".to_string();
    }

    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => match map.get("detail") {
            Some(serde_json::Value::String(detail)) => detail.clone(),
            _ => body.to_string(),
        },
        _ => body.to_string(),
    }
}

/// Result type for guard client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
