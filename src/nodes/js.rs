//! Script node: hands its code plus a snapshot of the namespace to the
//! remote JS evaluator and merges the returned writes back under the
//! node's name.

use async_trait::async_trait;
use serde_json::Value;

use super::{NodeOutcome, NodeRequest, NodeRunner};
use crate::error::NodeError;
use crate::ident::Id;
use crate::model::{Handle, NodeKind};

pub struct JsRunner {
    id: Id,
    name: String,
    code: Vec<u8>,
}

impl JsRunner {
    pub fn new(id: Id, name: impl Into<String>, code: Vec<u8>) -> Self {
        Self {
            id,
            name: name.into(),
            code,
        }
    }
}

#[async_trait]
impl NodeRunner for JsRunner {
    fn id(&self) -> Id {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Js
    }

    async fn run(&self, req: &NodeRequest) -> Result<NodeOutcome, NodeError> {
        req.check_cancelled()?;
        let snapshot = req.tracker.shared().read().snapshot();

        let eval = req.js.eval(&self.code, snapshot);
        let result = tokio::select! {
            result = tokio::time::timeout(req.per_node_timeout, eval) => {
                result.map_err(|_| NodeError::Timeout)??
            }
            _ = req.cancel.cancelled() => return Err(NodeError::Canceled),
        };

        req.tracker
            .write(self.name.clone(), Value::Object(result.written_vars.clone()));

        Ok(NodeOutcome {
            next_handles: vec![Handle::Unspecified],
            outputs: result.written_vars,
            soft_error: None,
        })
    }
}
