//! Data model: flows, nodes, edges, variables, HTTP request templates,
//! response records and node-execution rows.
//!
//! Ordered collections (headers, query params, body entries, variables)
//! are doubly linked lists per parent: `prev_id`/`next_id`, one head
//! (`prev = None`) and one tail (`next = None`) per chain. "Default" rows
//! are excluded from the chain and stay self-isolated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ident::Id;

/// Node kind discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Request,
    Condition,
    For,
    ForEach,
    Js,
    NoOp,
}

/// Sub-kind for no-op nodes; only `Start` is significant at flow entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoopKind {
    Start,
    Then,
    Else,
    Loop,
}

/// Labelled output port on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Handle {
    Unspecified,
    Then,
    Else,
    Loop,
}

/// Edge annotation; the runner uses `Loop` to recognise loop-body edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    Unspecified,
    Loop,
}

/// Per-iteration failure policy of loop nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorHandling {
    Ignore,
    Break,
    Fail,
}

/// Terminal and transient node states reported by the runner and stored on
/// execution rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
    Running,
    Success,
    Failed,
    Canceled,
    TimedOut,
}

/// Compression codec marker for stored payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompressKind {
    #[default]
    None,
    Zstd,
}

// ---- flow graph entities ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub id: Id,
    pub workspace_id: Id,
    pub name: String,
}

/// Generic node header. `name` is unique within a flow; the reference
/// system keys by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: Id,
    pub flow_id: Id,
    pub name: String,
    pub kind: NodeKind,
    pub position_x: f64,
    pub position_y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoopNode {
    pub flow_node_id: Id,
    pub noop_kind: NoopKind,
}

/// Binds a node to a stored HTTP request template, optionally with a delta
/// override layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestNode {
    pub flow_node_id: Id,
    pub endpoint_id: Option<Id>,
    pub example_id: Option<Id>,
    pub delta_example_id: Option<Id>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionNode {
    pub flow_node_id: Id,
    pub condition: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForNode {
    pub flow_node_id: Id,
    pub iter_count: i64,
    pub error_handling: ErrorHandling,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForEachNode {
    pub flow_node_id: Id,
    pub iter_expression: String,
    pub break_condition: Option<String>,
    pub error_handling: ErrorHandling,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsNode {
    pub flow_node_id: Id,
    #[serde(with = "serde_bytes_b64")]
    pub code: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: Id,
    pub flow_id: Id,
    pub source_id: Id,
    pub target_id: Id,
    pub source_handle: Handle,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowVariable {
    pub id: Id,
    pub flow_id: Id,
    pub name: String,
    pub value: String,
    pub enabled: bool,
    pub prev_id: Option<Id>,
    pub next_id: Option<Id>,
}

/// Workspace-scoped environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub id: Id,
    pub workspace_id: Id,
    pub name: String,
}

/// Environment variable; same shape as a flow variable at workspace scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvVariable {
    pub id: Id,
    pub env_id: Id,
    pub name: String,
    pub value: String,
    pub enabled: bool,
    pub prev_id: Option<Id>,
    pub next_id: Option<Id>,
}

// ---- HTTP request templates ----

/// Stored HTTP request template. Delta templates layer over a base via
/// `delta_parent_id` on their rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRequestDef {
    pub id: Id,
    pub workspace_id: Id,
    pub name: String,
    pub method: String,
    pub url: String,
}

/// Which ordered key/value collection a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KvKind {
    Header,
    Query,
    BodyForm,
    BodyUrlencoded,
}

/// One header / query parameter / body form row of a request template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpKv {
    pub id: Id,
    pub http_id: Id,
    pub kind: KvKind,
    pub key: String,
    pub value: String,
    pub enabled: bool,
    /// Marks this row as an override of a base-template row.
    pub delta_parent_id: Option<Id>,
    pub prev_id: Option<Id>,
    pub next_id: Option<Id>,
}

/// Raw request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpBodyRaw {
    pub id: Id,
    pub http_id: Id,
    #[serde(with = "serde_bytes_b64")]
    pub data: Vec<u8>,
    pub compress_kind: CompressKind,
}

/// Response assertion attached to a request template. A failed assertion is
/// recorded on the node's outputs but does not by itself fail the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpAssert {
    pub id: Id,
    pub http_id: Id,
    pub expression: String,
    pub enabled: bool,
    pub delta_parent_id: Option<Id>,
    pub prev_id: Option<Id>,
    pub next_id: Option<Id>,
}

/// Persisted record of one HTTP exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpResponseRecord {
    pub id: Id,
    pub http_id: Id,
    pub status: u16,
    #[serde(with = "serde_bytes_b64")]
    pub body: Vec<u8>,
    pub body_compress_kind: CompressKind,
    pub headers: Vec<(String, String)>,
    pub duration_ms: u64,
    pub size: u64,
    pub time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Transport error captured when the exchange failed; the record is
    /// still written with an empty body in that case.
    pub error: Option<String>,
}

// ---- execution records ----

/// Name of the synthetic row summarising loop-iteration failures.
pub const ERROR_SUMMARY_NAME: &str = "Error Summary";

/// Prefix of per-iteration execution rows.
pub const ITERATION_PREFIX: &str = "Iteration ";

/// Identifies an iteration's position within possibly nested loops without
/// reference to in-memory pointers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationContext {
    pub iteration_path: Vec<i64>,
    pub execution_index: i64,
    /// Enclosing loop-node id chain, outermost first; display only.
    pub parent_nodes: Vec<Id>,
}

impl IterationContext {
    /// Child context one loop level deeper.
    pub fn descend(&self, index: i64, loop_node: Id) -> Self {
        let mut child = self.clone();
        child.iteration_path.push(index);
        child.parent_nodes.push(loop_node);
        child
    }
}

/// Persisted record of one node invocation (or one loop iteration).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecution {
    pub id: Id,
    pub node_id: Id,
    pub name: String,
    pub state: NodeState,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(with = "serde_bytes_b64")]
    pub input_data: Vec<u8>,
    pub input_data_compress_kind: CompressKind,
    #[serde(with = "serde_bytes_b64")]
    pub output_data: Vec<u8>,
    pub output_data_compress_kind: CompressKind,
    pub error: Option<String>,
    pub iteration_context: Option<IterationContext>,
}

impl NodeExecution {
    /// Display name for iteration row `i`.
    pub fn iteration_name(i: i64) -> String {
        format!("{ITERATION_PREFIX}{i}")
    }

    /// Whether `name` marks a per-iteration (or error-summary) row. The
    /// reference resolver excludes such rows when locating a node's last
    /// output.
    pub fn is_iteration_row(name: &str) -> bool {
        name.starts_with(ITERATION_PREFIX) || name == ERROR_SUMMARY_NAME
    }
}

/// Outcome of one flow run, aggregated for reporters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRunSummary {
    pub flow_id: Id,
    pub flow_name: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub status: FlowStatus,
    pub error: Option<String>,
    pub nodes: Vec<NodeRunSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRunSummary {
    pub node_id: Id,
    pub execution_id: Id,
    pub name: String,
    pub state: NodeState,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub iteration_context: Option<IterationContext>,
}

/// Terminal flow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowStatus {
    Success,
    Failed,
    Canceled,
    Skipped,
}

/// Untyped JSON tree helper used for execution snapshots.
pub type Tree = Value;

mod serde_bytes_b64 {
    //! Byte payloads serialise as base64 strings in JSON contexts.

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(de)?;
        STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::{FakeIdSource, IdSource};

    #[test]
    fn test_iteration_row_names() {
        assert_eq!(NodeExecution::iteration_name(0), "Iteration 0");
        assert!(NodeExecution::is_iteration_row("Iteration 3"));
        assert!(NodeExecution::is_iteration_row(ERROR_SUMMARY_NAME));
        assert!(!NodeExecution::is_iteration_row("Request 1"));
    }

    #[test]
    fn test_iteration_context_descend() {
        let ids = FakeIdSource::new();
        let outer = ids.next_id();
        let inner = ids.next_id();
        let root = IterationContext::default();
        let level1 = root.descend(2, outer);
        let level2 = level1.descend(0, inner);
        assert_eq!(level2.iteration_path, vec![2, 0]);
        assert_eq!(level2.parent_nodes, vec![outer, inner]);
    }

    #[test]
    fn test_node_state_serde_form() {
        let json = serde_json::to_string(&NodeState::TimedOut).unwrap();
        assert_eq!(json, "\"TIMED_OUT\"");
        let back: NodeState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, NodeState::TimedOut);
    }

    #[test]
    fn test_bytes_round_trip() {
        let ids = FakeIdSource::new();
        let node = JsNode {
            flow_node_id: ids.next_id(),
            code: b"ns.write('x', 1)".to_vec(),
        };
        let json = serde_json::to_string(&node).unwrap();
        let back: JsNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code, node.code);
    }
}
