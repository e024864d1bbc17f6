//! Condition node: evaluates a boolean expression over the namespace and
//! exits on the THEN or ELSE handle.

use async_trait::async_trait;

use super::{NodeOutcome, NodeRequest, NodeRunner};
use crate::error::NodeError;
use crate::expr;
use crate::ident::Id;
use crate::model::{Handle, NodeKind};

pub struct ConditionRunner {
    id: Id,
    name: String,
    condition: String,
}

impl ConditionRunner {
    pub fn new(id: Id, name: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            condition: condition.into(),
        }
    }
}

#[async_trait]
impl NodeRunner for ConditionRunner {
    fn id(&self) -> Id {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Condition
    }

    async fn run(&self, req: &NodeRequest) -> Result<NodeOutcome, NodeError> {
        req.check_cancelled()?;
        let truth = expr::evaluate(&self.condition, req.tracker.as_ref())?;
        let handle = if truth { Handle::Then } else { Handle::Else };
        tracing::debug!(node = %self.name, condition = %self.condition, result = truth, "condition evaluated");
        Ok(NodeOutcome::next(handle))
    }
}
