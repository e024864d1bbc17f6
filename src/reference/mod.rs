//! Reference resolver.
//!
//! Walks backward from a target node and exposes the union of upstream
//! outputs and per-kind schema defaults as a completion tree for the
//! editor, plus a value lookup for fully-qualified paths. Iteration rows
//! (`"Iteration N"`, `"Error Summary"`) are never surfaced as a node's
//! output.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::edges::EdgeMap;
use crate::error::{FlowResult, NodeError};
use crate::ident::Id;
use crate::model::{CompressKind, NodeKind};
use crate::namespace::{read_value, stringify};
use crate::repo::Repository;
use crate::runner::record::decode_payload;

/// What a completion entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Variable,
    NodeOutput,
    Env,
    Object,
    Array,
    Scalar,
}

/// One entry of the completion forest.
#[derive(Debug, Clone)]
pub struct RefNode {
    pub key: String,
    pub kind: RefKind,
    pub children: Vec<RefNode>,
}

pub struct ReferenceResolver {
    repo: Arc<dyn Repository>,
}

impl ReferenceResolver {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Completion forest for a flow-node target, filtered by `prefix`.
    pub async fn completions_for_node(
        &self,
        flow_node_id: Id,
        prefix: &str,
    ) -> FlowResult<Vec<RefNode>> {
        let scope = self.node_scope(flow_node_id).await?;
        let mut out = Vec::new();
        for (key, value) in scope.variables {
            out.push(tree_from_value(&key, &value, RefKind::Variable));
        }
        for (key, value) in scope.upstream {
            out.push(tree_from_value(&key, &value, RefKind::NodeOutput));
        }
        for (key, value) in scope.own {
            out.push(tree_from_value(&key, &value, RefKind::NodeOutput));
        }
        Ok(filter_prefix(out, prefix))
    }

    /// Stringified value behind a fully-qualified path, for a flow-node
    /// target.
    pub async fn value_for_node_path(
        &self,
        flow_node_id: Id,
        path: &str,
    ) -> FlowResult<Result<String, NodeError>> {
        let scope = self.node_scope(flow_node_id).await?;
        let mut root = Map::new();
        for (key, value) in scope
            .variables
            .into_iter()
            .chain(scope.upstream)
            .chain(scope.own)
        {
            root.insert(key, value);
        }
        Ok(read_value(&Value::Object(root), path).map(|v| stringify(&v)))
    }

    /// Env-variable completion tree: variables grouped under `env`, each
    /// listing the environments defining it.
    pub async fn completions_for_env(
        &self,
        workspace_id: Id,
        prefix: &str,
    ) -> FlowResult<Vec<RefNode>> {
        let mut children: Vec<RefNode> = Vec::new();
        for env in self.repo.list_environments(workspace_id).await? {
            for variable in self.repo.list_env_variables(env.id).await? {
                if !variable.enabled {
                    continue;
                }
                match children.iter_mut().find(|c| c.key == variable.name) {
                    Some(entry) => entry.children.push(RefNode {
                        key: env.name.clone(),
                        kind: RefKind::Env,
                        children: Vec::new(),
                    }),
                    None => children.push(RefNode {
                        key: variable.name.clone(),
                        kind: RefKind::Variable,
                        children: vec![RefNode {
                            key: env.name.clone(),
                            kind: RefKind::Env,
                            children: Vec::new(),
                        }],
                    }),
                }
            }
        }
        let forest = vec![RefNode {
            key: "env".to_string(),
            kind: RefKind::Env,
            children,
        }];
        Ok(filter_prefix(forest, prefix))
    }

    /// Completion tree for a stored HTTP response, under the root key
    /// `response`.
    pub async fn completions_for_response(
        &self,
        response_id: Id,
        prefix: &str,
    ) -> FlowResult<Vec<RefNode>> {
        let record = self.repo.get_response(response_id).await?;
        let body_bytes = match record.body_compress_kind {
            CompressKind::None => record.body.clone(),
            CompressKind::Zstd => zstd::stream::decode_all(record.body.as_slice())
                .map_err(|e| crate::error::FlowError::Corruption(format!("response body: {e}")))?,
        };
        let body = parse_body_value(&body_bytes);
        let headers: Map<String, Value> = record
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let value = json!({
            "status": record.status,
            "body": body,
            "headers": headers,
            "duration": record.duration_ms,
        });
        let forest = vec![tree_from_value("response", &value, RefKind::NodeOutput)];
        Ok(filter_prefix(forest, prefix))
    }

    /// Gather the visible scope of a node: flow variables, upstream node
    /// outputs (latest non-iteration execution, or schema defaults), and
    /// for request targets the unprefixed own exchange.
    async fn node_scope(&self, flow_node_id: Id) -> FlowResult<NodeScope> {
        let target = self.repo.get_node(flow_node_id).await?;
        let nodes = self.repo.list_nodes(target.flow_id).await?;
        let edges = self.repo.list_edges(target.flow_id).await?;
        let edge_map = EdgeMap::build(&edges);
        let reachable = edge_map.reachable_before(flow_node_id);

        let mut variables = Vec::new();
        for variable in self.repo.list_flow_variables(target.flow_id).await? {
            if !variable.enabled {
                continue;
            }
            let value = serde_json::from_str::<Value>(&variable.value)
                .unwrap_or(Value::String(variable.value.clone()));
            variables.push((variable.name, value));
        }

        let mut upstream = Vec::new();
        for node in nodes.iter().filter(|n| reachable.contains(&n.id)) {
            let output = self.node_output_or_schema(node.id, node.kind).await?;
            if let Some(value) = output {
                upstream.push((node.name.clone(), value));
            }
        }

        let mut own = Vec::new();
        if target.kind == NodeKind::Request {
            let value = self
                .node_output_or_schema(target.id, target.kind)
                .await?
                .unwrap_or_else(request_schema);
            // authors write `response.status` without naming their own node
            if let Value::Object(map) = value {
                for (key, child) in map {
                    if key == "request" || key == "response" {
                        own.push((key, child));
                    }
                }
            }
        }

        Ok(NodeScope {
            variables,
            upstream,
            own,
        })
    }

    /// A node's latest non-iteration output, or its kind schema when it has
    /// not run yet.
    async fn node_output_or_schema(
        &self,
        node_id: Id,
        kind: NodeKind,
    ) -> FlowResult<Option<Value>> {
        if let Some(execution) = self.repo.latest_main_execution(node_id).await? {
            debug_assert!(!crate::model::NodeExecution::is_iteration_row(&execution.name));
            let tree = decode_payload(&execution.output_data, execution.output_data_compress_kind)
                .map_err(|e| crate::error::FlowError::Corruption(e.to_string()))?;
            // stored trees are keyed by the writing node's name
            if let Value::Object(map) = tree {
                if let Some((_, value)) = map.into_iter().next() {
                    return Ok(Some(value));
                }
            }
            return Ok(None);
        }
        Ok(match kind {
            NodeKind::Request => Some(request_schema()),
            NodeKind::For => Some(json!({ "index": 0 })),
            NodeKind::ForEach => Some(json!({ "item": null, "key": 0 })),
            _ => None,
        })
    }
}

struct NodeScope {
    variables: Vec<(String, Value)>,
    upstream: Vec<(String, Value)>,
    own: Vec<(String, Value)>,
}

fn request_schema() -> Value {
    json!({
        "request": { "headers": {}, "queries": {}, "body": null },
        "response": { "status": 0, "body": null, "headers": {}, "duration": 0 },
    })
}

fn parse_body_value(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

fn tree_from_value(key: &str, value: &Value, kind: RefKind) -> RefNode {
    let (kind, children) = match value {
        Value::Object(map) => (
            if kind == RefKind::Scalar { RefKind::Object } else { kind },
            map.iter()
                .map(|(k, v)| tree_from_value(k, v, RefKind::Scalar))
                .collect(),
        ),
        Value::Array(items) => (
            RefKind::Array,
            items
                .iter()
                .enumerate()
                .map(|(i, v)| tree_from_value(&format!("[{i}]"), v, RefKind::Scalar))
                .collect(),
        ),
        _ => (kind, Vec::new()),
    };
    RefNode {
        key: key.to_string(),
        kind,
        children,
    }
}

/// Keep only entries whose key path begins with the query prefix.
fn filter_prefix(forest: Vec<RefNode>, prefix: &str) -> Vec<RefNode> {
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return forest;
    }
    let (head, rest) = match prefix.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (prefix, None),
    };
    forest
        .into_iter()
        .filter_map(|node| match rest {
            None => node.key.starts_with(head).then_some(node),
            Some(rest) if node.key == head => {
                let RefNode { key, kind, children } = node;
                Some(RefNode {
                    key,
                    kind,
                    children: filter_prefix(children, rest),
                })
            }
            Some(_) => None,
        })
        .collect()
}
