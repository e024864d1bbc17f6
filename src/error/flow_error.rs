use super::{NodeError, RepoError};
use thiserror::Error;

/// Flow-level errors.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("invalid id: {0}")]
    InvalidId(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("flow has no start node")]
    NoStartNode,
    #[error("flow has multiple start nodes")]
    MultipleStartNodes,
    #[error("edge {edge_id} references missing node {node_id}")]
    EdgeEndpointMissing { edge_id: String, node_id: String },
    #[error("duplicate node name in flow: {0}")]
    DuplicateNodeName(String),
    #[error("cycle detected outside loop edges")]
    CycleDetected,
    #[error("flow canceled")]
    Canceled,
    #[error("node {node_id} failed: {source}")]
    NodeFailed {
        node_id: String,
        #[source]
        source: NodeError,
    },
    #[error("flow file error: {0}")]
    FlowFile(String),
    #[error(transparent)]
    Repository(#[from] RepoError),
    #[error("data corruption: {0}")]
    Corruption(String),
}

impl From<NodeError> for FlowError {
    fn from(value: NodeError) -> Self {
        match value {
            NodeError::Canceled => FlowError::Canceled,
            other => FlowError::NodeFailed {
                node_id: String::new(),
                source: other,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_error_display() {
        assert_eq!(
            FlowError::InvalidId("zz".into()).to_string(),
            "invalid id: zz"
        );
        assert_eq!(FlowError::NoStartNode.to_string(), "flow has no start node");
        assert_eq!(
            FlowError::MultipleStartNodes.to_string(),
            "flow has multiple start nodes"
        );
        assert_eq!(FlowError::Canceled.to_string(), "flow canceled");
        let err = FlowError::EdgeEndpointMissing {
            edge_id: "e1".into(),
            node_id: "n1".into(),
        };
        assert!(err.to_string().contains("e1"));
        assert!(err.to_string().contains("n1"));
    }

    #[test]
    fn test_from_node_error() {
        let err: FlowError = NodeError::Canceled.into();
        assert!(matches!(err, FlowError::Canceled));

        let err: FlowError = NodeError::Timeout.into();
        assert!(matches!(err, FlowError::NodeFailed { .. }));
    }
}
