//! Error types, layered the way execution is layered: [`NodeError`] for a
//! single node run, [`FlowError`] for a whole flow, [`RepoError`] for the
//! storage facade.

mod flow_error;
mod node_error;
mod repo_error;

pub use flow_error::FlowError;
pub use node_error::NodeError;
pub use repo_error::RepoError;

/// Convenience alias for flow-level results.
pub type FlowResult<T> = Result<T, FlowError>;
