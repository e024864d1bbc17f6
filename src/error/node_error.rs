use thiserror::Error;

/// Node-level errors. A node failure terminates the node; whether it
/// terminates the flow depends on the `error_handling` mode of the nearest
/// enclosing loop.
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    #[error("path not found: {0}")]
    PathNotFound(String),
    #[error("invalid condition: {0}")]
    ConditionInvalid(String),
    #[error("value is not iterable: {0}")]
    NotIterable(String),
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("node execution exceeded time limit")]
    Timeout,
    #[error("node canceled")]
    Canceled,
    #[error("assertion failed: {0}")]
    AssertFailed(String),
    #[error("script error: {0}")]
    JsError(String),
    #[error("configuration error: {0}")]
    ConfigError(String),
    #[error("serialization error: {0}")]
    SerializationError(String),
    #[error("data corruption: {0}")]
    Corruption(String),
    #[error("repository error: {0}")]
    Repository(String),
}

impl From<crate::error::RepoError> for NodeError {
    fn from(e: crate::error::RepoError) -> Self {
        NodeError::Repository(e.to_string())
    }
}

impl NodeError {
    /// Whether the error represents cancellation rather than failure. The
    /// runner reports canceled and timed-out nodes with distinct terminal
    /// states instead of `FAILED`.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, NodeError::Canceled)
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(e: serde_json::Error) -> Self {
        NodeError::SerializationError(e.to_string())
    }
}
