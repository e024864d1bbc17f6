use thiserror::Error;

/// Storage-facade errors. `Corruption` carries a repair hint but the core
/// never attempts auto-repair.
#[derive(Debug, Error, Clone)]
pub enum RepoError {
    #[error("entity not found: {0}")]
    NotFound(String),
    #[error("conflicting write: {0}")]
    Conflict(String),
    #[error("store corruption: {detail} (hint: {repair_hint})")]
    Corruption { detail: String, repair_hint: String },
}

impl RepoError {
    pub fn corruption(detail: impl Into<String>, repair_hint: impl Into<String>) -> Self {
        RepoError::Corruption {
            detail: detail.into(),
            repair_hint: repair_hint.into(),
        }
    }
}
