//! Collection loop node.
//!
//! Evaluates `iter_expression` against the namespace: arrays iterate by
//! ascending index publishing `{item, key: index}`, objects iterate in
//! insertion order publishing `{item, key: name}`. An optional break
//! condition is checked before each iteration.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{NodeOutcome, NodeRequest, NodeRunner};
use crate::error::NodeError;
use crate::expr;
use crate::ident::Id;
use crate::model::{
    ErrorHandling, Handle, NodeExecution, NodeKind, NodeState, ERROR_SUMMARY_NAME,
};
use crate::runner::events::{emit_node_event, NodeStatusEvent};

pub struct ForEachRunner {
    id: Id,
    name: String,
    iter_expression: String,
    break_condition: Option<String>,
    error_handling: ErrorHandling,
}

impl ForEachRunner {
    pub fn new(
        id: Id,
        name: impl Into<String>,
        iter_expression: impl Into<String>,
        break_condition: Option<String>,
        error_handling: ErrorHandling,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            iter_expression: iter_expression.into(),
            break_condition,
            error_handling,
        }
    }

    /// The iteration source may be written as a bare path or wrapped in
    /// template braces.
    fn source_path(&self) -> &str {
        let trimmed = self.iter_expression.trim();
        trimmed
            .strip_prefix("{{")
            .and_then(|rest| rest.strip_suffix("}}"))
            .map(str::trim)
            .unwrap_or(trimmed)
    }
}

#[async_trait]
impl NodeRunner for ForEachRunner {
    fn id(&self) -> Id {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::ForEach
    }

    async fn run(&self, req: &NodeRequest) -> Result<NodeOutcome, NodeError> {
        req.check_cancelled()?;

        let source = req.tracker.read(self.source_path())?;
        let entries: Vec<(Value, Value)> = match source {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (json!(i), item))
                .collect(),
            Value::Object(map) => map
                .into_iter()
                .map(|(key, item)| (json!(key), item))
                .collect(),
            _ => return Err(NodeError::NotIterable(self.iter_expression.clone())),
        };

        let mut first_error: Option<NodeError> = None;

        for (i, (key, item)) in entries.into_iter().enumerate() {
            req.check_cancelled()?;
            if let Some(condition) = &self.break_condition {
                if expr::evaluate(condition, req.tracker.as_ref())? {
                    break;
                }
            }

            let iter_ctx = req.iteration.descend(i as i64, self.id);
            let published = json!({ "item": item, "key": key });
            req.tracker.write(self.name.clone(), published.clone());

            emit_node_event(
                &req.events,
                NodeStatusEvent {
                    node_id: self.id,
                    node_name: NodeExecution::iteration_name(i as i64),
                    state: NodeState::Running,
                    error: None,
                    iteration: Some(iter_ctx.clone()),
                },
            );

            let outcome = req.subflow.run_subflow(self.id, &iter_ctx, &req.cancel).await?;
            let state = if outcome.error.is_some() {
                NodeState::Failed
            } else {
                NodeState::Success
            };
            req.recorder
                .record(
                    self.id,
                    &NodeExecution::iteration_name(i as i64),
                    state,
                    Some(&iter_ctx),
                    &published,
                    &outcome.outputs,
                    outcome.error.as_ref(),
                )
                .await?;
            emit_node_event(
                &req.events,
                NodeStatusEvent {
                    node_id: self.id,
                    node_name: NodeExecution::iteration_name(i as i64),
                    state,
                    error: outcome.error.as_ref().map(|e| e.to_string()),
                    iteration: Some(iter_ctx),
                },
            );

            if let Some(error) = outcome.error {
                if first_error.is_none() {
                    first_error = Some(error);
                }
                match self.error_handling {
                    ErrorHandling::Ignore => continue,
                    ErrorHandling::Break => break,
                    ErrorHandling::Fail => break,
                }
            }
        }

        if let Some(error) = &first_error {
            req.recorder
                .record(
                    self.id,
                    ERROR_SUMMARY_NAME,
                    NodeState::Failed,
                    Some(&req.iteration),
                    &json!({ "source": self.iter_expression }),
                    &json!(null),
                    Some(error),
                )
                .await?;
        }

        if self.error_handling == ErrorHandling::Fail {
            if let Some(error) = first_error {
                return Err(error);
            }
        }

        Ok(NodeOutcome::next(Handle::Unspecified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::{FakeIdSource, IdSource};

    #[test]
    fn test_source_path_strips_braces() {
        let ids = FakeIdSource::new();
        let runner = ForEachRunner::new(
            ids.next_id(),
            "each",
            "{{ upstream.users }}",
            None,
            ErrorHandling::Fail,
        );
        assert_eq!(runner.source_path(), "upstream.users");

        let runner = ForEachRunner::new(
            ids.next_id(),
            "each",
            "upstream.users",
            None,
            ErrorHandling::Fail,
        );
        assert_eq!(runner.source_path(), "upstream.users");
    }
}
