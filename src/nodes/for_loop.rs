//! Counted loop node.
//!
//! Publishes `{index}` under its own name before each pass, drives the
//! LOOP-edged body subgraph to completion, and records one execution row
//! per iteration. Iterations run sequentially so iteration `i+1` observes
//! iteration `i`'s writes.

use async_trait::async_trait;
use serde_json::json;

use super::{NodeOutcome, NodeRequest, NodeRunner};
use crate::error::NodeError;
use crate::ident::Id;
use crate::model::{
    ErrorHandling, Handle, NodeExecution, NodeKind, NodeState, ERROR_SUMMARY_NAME,
};
use crate::runner::events::{emit_node_event, NodeStatusEvent};

pub struct ForRunner {
    id: Id,
    name: String,
    iter_count: i64,
    error_handling: ErrorHandling,
}

impl ForRunner {
    pub fn new(
        id: Id,
        name: impl Into<String>,
        iter_count: i64,
        error_handling: ErrorHandling,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            iter_count,
            error_handling,
        }
    }
}

#[async_trait]
impl NodeRunner for ForRunner {
    fn id(&self) -> Id {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::For
    }

    async fn run(&self, req: &NodeRequest) -> Result<NodeOutcome, NodeError> {
        let mut first_error: Option<NodeError> = None;

        for i in 0..self.iter_count {
            req.check_cancelled()?;
            let iter_ctx = req.iteration.descend(i, self.id);
            req.tracker.write(self.name.clone(), json!({ "index": i }));

            emit_node_event(
                &req.events,
                NodeStatusEvent {
                    node_id: self.id,
                    node_name: NodeExecution::iteration_name(i),
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
                    &NodeExecution::iteration_name(i),
                    state,
                    Some(&iter_ctx),
                    &json!({ "index": i }),
                    &outcome.outputs,
                    outcome.error.as_ref(),
                )
                .await?;
            emit_node_event(
                &req.events,
                NodeStatusEvent {
                    node_id: self.id,
                    node_name: NodeExecution::iteration_name(i),
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
                    &json!({ "iter_count": self.iter_count }),
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
