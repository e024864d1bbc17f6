//! Start node: the single entry point of a flow. Produces no outputs and
//! returns immediately with the unspecified handle.

use async_trait::async_trait;

use super::{NodeOutcome, NodeRequest, NodeRunner};
use crate::error::NodeError;
use crate::ident::Id;
use crate::model::{Handle, NodeKind};

pub struct StartRunner {
    id: Id,
    name: String,
}

impl StartRunner {
    pub fn new(id: Id, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

#[async_trait]
impl NodeRunner for StartRunner {
    fn id(&self) -> Id {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::NoOp
    }

    async fn run(&self, req: &NodeRequest) -> Result<NodeOutcome, NodeError> {
        req.check_cancelled()?;
        Ok(NodeOutcome::next(Handle::Unspecified))
    }
}
