//! Error taxonomy of the gateway core.
//!
//! Token, executor and cache failures propagate to callers as typed
//! outcomes. Generation failures never leave the generation pipeline.

use thiserror::Error;

/// Maximum number of upstream error body bytes carried in an error.
pub const ERROR_BODY_LIMIT: usize = 512;

/// Refresh of the bearer token pair failed. Fatal to the in-flight caller.
#[derive(Debug, Clone, Error)]
pub enum TokenRefreshError {
    #[error("token refresh endpoint is not configured")]
    NotConfigured,

    #[error("token refresh request failed: {0}")]
    Transport(String),

    #[error("token refresh rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("token refresh response is malformed: {0}")]
    Malformed(String),
}

/// Outcome classes of an outbound call made through the bounded executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("upstream call timed out after {0} ms")]
    Timeout(u64),

    #[error("upstream resource not found: {0}")]
    NotFound(String),

    #[error("upstream returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("upstream response exceeded {limit} bytes")]
    ResponseTooLarge { limit: usize },

    #[error("upstream transport error: {0}")]
    Transport(String),

    #[error("authentication failed: {0}")]
    Auth(#[from] TokenRefreshError),

    #[error("upstream call cancelled by caller")]
    Cancelled,

    #[error("upstream response could not be decoded: {0}")]
    Decode(String),
}

impl ExecutorError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecutorError::Timeout(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ExecutorError::NotFound(_))
    }

    /// Non-2xx statuses and oversized bodies both count as upstream errors.
    pub fn is_upstream_error(&self) -> bool {
        matches!(
            self,
            ExecutorError::Upstream { .. } | ExecutorError::ResponseTooLarge { .. }
        )
    }

    /// Status code for upstream failures, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ExecutorError::Upstream { status, .. } => Some(*status),
            ExecutorError::NotFound(_) => Some(404),
            _ => None,
        }
    }

    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            ExecutorError::Timeout(_) => "timeout",
            ExecutorError::NotFound(_) => "not_found",
            ExecutorError::Upstream { .. } => "upstream",
            ExecutorError::ResponseTooLarge { .. } => "too_large",
            ExecutorError::Transport(_) => "transport",
            ExecutorError::Auth(_) => "auth",
            ExecutorError::Cancelled => "cancelled",
            ExecutorError::Decode(_) => "decode",
        }
    }
}

/// Internal failure of the structured generation pipeline.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("generation envelope carries no text payload")]
    EmptyEnvelope,

    #[error("generation payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("generation output failed validation: {0}")]
    Validation(String),
}

/// Failure of the durable password store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("password store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("password store document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("password storage is unavailable")]
    StorageUnavailable,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("password must not be empty")]
    EmptyPassword,
}

/// Cuts an upstream body down to [`ERROR_BODY_LIMIT`] bytes on a char boundary.
pub fn truncate_body(body: &str) -> String {
    if body.len() <= ERROR_BODY_LIMIT {
        return body.to_owned();
    }
    let mut end = ERROR_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
