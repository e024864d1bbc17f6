//! Execution recorder: a thin writer over the repository.
//!
//! Every node run (and every loop iteration) produces one `NodeExecution`
//! row. Input/output snapshot trees are serialized to JSON and compressed
//! with zstd once they pass a size threshold; the codec used is recorded
//! next to the payload so readers know whether to decompress first.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::error::{NodeError, RepoError};
use crate::ident::{Id, IdSource};
use crate::model::{CompressKind, IterationContext, NodeExecution, NodeState};
use crate::repo::Repository;

/// Payloads above this many serialized bytes are compressed.
const COMPRESS_THRESHOLD: usize = 1024;
const ZSTD_LEVEL: i32 = 3;

pub struct ExecutionRecorder {
    repo: Arc<dyn Repository>,
    ids: Arc<dyn IdSource>,
}

impl ExecutionRecorder {
    pub fn new(repo: Arc<dyn Repository>, ids: Arc<dyn IdSource>) -> Self {
        Self { repo, ids }
    }

    /// Persist one execution row; returns its id.
    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        node_id: Id,
        name: &str,
        state: NodeState,
        iteration: Option<&IterationContext>,
        input_tree: &Value,
        output_tree: &Value,
        error: Option<&NodeError>,
    ) -> Result<Id, RepoError> {
        let (input_data, input_kind) = encode_tree(input_tree);
        let (output_data, output_kind) = encode_tree(output_tree);
        let id = self.ids.next_id();
        let execution = NodeExecution {
            id,
            node_id,
            name: name.to_string(),
            state,
            completed_at: match state {
                NodeState::Running => None,
                _ => Some(Utc::now()),
            },
            input_data,
            input_data_compress_kind: input_kind,
            output_data,
            output_data_compress_kind: output_kind,
            error: error.map(|e| e.to_string()),
            iteration_context: iteration.cloned(),
        };
        self.repo.create_execution(execution).await?;
        Ok(id)
    }
}

/// Serialize a snapshot tree, compressing above the threshold.
pub fn encode_tree(tree: &Value) -> (Vec<u8>, CompressKind) {
    let raw = serde_json::to_vec(tree).unwrap_or_default();
    if raw.len() <= COMPRESS_THRESHOLD {
        return (raw, CompressKind::None);
    }
    match zstd::bulk::compress(&raw, ZSTD_LEVEL) {
        Ok(compressed) if compressed.len() < raw.len() => (compressed, CompressKind::Zstd),
        _ => (raw, CompressKind::None),
    }
}

/// Decode a stored snapshot payload back into a JSON tree.
pub fn decode_payload(bytes: &[u8], kind: CompressKind) -> Result<Value, NodeError> {
    let raw = match kind {
        CompressKind::None => bytes.to_vec(),
        CompressKind::Zstd => zstd::stream::decode_all(bytes)
            .map_err(|e| NodeError::Corruption(format!("zstd payload: {e}")))?,
    };
    if raw.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&raw).map_err(|e| NodeError::Corruption(format!("stored tree: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::FakeIdSource;
    use crate::repo::MemoryRepository;
    use serde_json::json;

    fn recorder() -> (ExecutionRecorder, Arc<MemoryRepository>) {
        let repo = Arc::new(MemoryRepository::new());
        let recorder = ExecutionRecorder::new(repo.clone(), Arc::new(FakeIdSource::new()));
        (recorder, repo)
    }

    #[test]
    fn test_small_payload_stays_uncompressed() {
        let (bytes, kind) = encode_tree(&json!({"a": 1}));
        assert_eq!(kind, CompressKind::None);
        assert_eq!(decode_payload(&bytes, kind).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_large_payload_is_compressed() {
        let big = json!({"body": "x".repeat(4096)});
        let (bytes, kind) = encode_tree(&big);
        assert_eq!(kind, CompressKind::Zstd);
        assert!(bytes.len() < 4096);
        assert_eq!(decode_payload(&bytes, kind).unwrap(), big);
    }

    #[test]
    fn test_decode_empty_is_null() {
        assert_eq!(
            decode_payload(&[], CompressKind::None).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_decode_bad_zstd_is_corruption() {
        assert!(matches!(
            decode_payload(b"not zstd", CompressKind::Zstd),
            Err(NodeError::Corruption(_))
        ));
    }

    #[tokio::test]
    async fn test_record_writes_row() {
        let (recorder, repo) = recorder();
        let ids = FakeIdSource::new();
        let node = ids.next_id();

        let exec_id = recorder
            .record(
                node,
                "Request 1",
                NodeState::Success,
                None,
                &json!({"in": 1}),
                &json!({"out": 2}),
                None,
            )
            .await
            .unwrap();

        let rows = repo.list_executions(node).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, exec_id);
        assert_eq!(rows[0].state, NodeState::Success);
        assert!(rows[0].completed_at.is_some());
        assert_eq!(
            decode_payload(&rows[0].output_data, rows[0].output_data_compress_kind).unwrap(),
            json!({"out": 2})
        );
    }

    #[tokio::test]
    async fn test_record_iteration_row() {
        let (recorder, repo) = recorder();
        let ids = FakeIdSource::new();
        let node = ids.next_id();
        let ctx = IterationContext {
            iteration_path: vec![2],
            execution_index: 2,
            parent_nodes: vec![node],
        };

        recorder
            .record(
                node,
                &NodeExecution::iteration_name(2),
                NodeState::Failed,
                Some(&ctx),
                &json!({"index": 2}),
                &Value::Null,
                Some(&NodeError::RequestFailed("boom".into())),
            )
            .await
            .unwrap();

        let rows = repo.list_executions(node).await.unwrap();
        assert_eq!(rows[0].name, "Iteration 2");
        assert_eq!(rows[0].iteration_context.as_ref().unwrap().iteration_path, vec![2]);
        assert!(rows[0].error.as_ref().unwrap().contains("boom"));
    }
}
