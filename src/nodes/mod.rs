//! Node execution contracts and the six node kinds.
//!
//! Every node kind implements [`NodeRunner`]. The runner hands each
//! invocation a [`NodeRequest`] carrying the tracked namespace, the
//! cancellation token, the iteration context, and the shared clients.
//! Loop nodes drive their body subgraphs through the [`SubflowRunner`]
//! handle and stream per-iteration results through the event sender,
//! recording one execution row per iteration as they go.

pub mod condition;
pub mod for_each;
pub mod for_loop;
pub mod js;
pub mod request;
pub mod start;

pub use condition::ConditionRunner;
pub use for_each::ForEachRunner;
pub use for_loop::ForRunner;
pub use js::JsRunner;
pub use request::{materialize_request, RequestRunner, RequestSpec};
pub use start::StartRunner;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::NodeError;
use crate::httpclient::HttpClientProvider;
use crate::ident::{Id, IdSource};
use crate::jsclient::JsEvaluator;
use crate::model::{Handle, IterationContext, NodeKind};
use crate::namespace::NamespaceTracker;
use crate::runner::events::NodeEventSender;
use crate::runner::persist::ResponseSender;
use crate::runner::record::ExecutionRecorder;

/// What a finished node tells the runner.
#[derive(Debug, Default)]
pub struct NodeOutcome {
    /// Which outgoing edges to follow next.
    pub next_handles: Vec<Handle>,
    /// Values published under the node's name (already written through the
    /// tracker; repeated here for the execution record).
    pub outputs: Map<String, Value>,
    /// Non-fatal problem recorded on the outcome: the node still counts as
    /// SUCCESS, but an enclosing loop treats the iteration as failed
    /// (assertion failures).
    pub soft_error: Option<NodeError>,
}

impl NodeOutcome {
    pub fn next(handle: Handle) -> Self {
        Self {
            next_handles: vec![handle],
            ..Default::default()
        }
    }
}

/// Aggregated result of one loop-body run.
#[derive(Debug, Default)]
pub struct SubflowOutcome {
    /// Union of the body nodes' output trees, keyed by node name.
    pub outputs: Value,
    /// First failure observed in the body (hard node failure or recorded
    /// assertion failure), if any.
    pub error: Option<NodeError>,
}

/// Executes a loop-body subgraph to completion. Implemented by the flow
/// runner itself; loop nodes only see this trait.
#[async_trait]
pub trait SubflowRunner: Send + Sync {
    async fn run_subflow(
        &self,
        loop_node: Id,
        iteration: &IterationContext,
        cancel: &CancellationToken,
    ) -> Result<SubflowOutcome, NodeError>;
}

/// Per-invocation context handed to a node.
pub struct NodeRequest {
    pub tracker: Arc<NamespaceTracker>,
    pub cancel: CancellationToken,
    pub iteration: IterationContext,
    pub per_node_timeout: Duration,
    pub http: Arc<HttpClientProvider>,
    pub js: Arc<dyn JsEvaluator>,
    pub responses: ResponseSender,
    pub events: NodeEventSender,
    pub recorder: Arc<ExecutionRecorder>,
    pub subflow: Arc<dyn SubflowRunner>,
    pub ids: Arc<dyn IdSource>,
}

impl NodeRequest {
    /// Fail fast when the run is already cancelled.
    pub fn check_cancelled(&self) -> Result<(), NodeError> {
        if self.cancel.is_cancelled() {
            Err(NodeError::Canceled)
        } else {
            Ok(())
        }
    }
}

/// Common contract each node kind implements.
#[async_trait]
pub trait NodeRunner: Send + Sync {
    fn id(&self) -> Id;
    fn name(&self) -> &str;
    fn kind(&self) -> NodeKind;
    async fn run(&self, req: &NodeRequest) -> Result<NodeOutcome, NodeError>;
}

/// Dispatch map from node id to executor.
pub type NodeMap = HashMap<Id, Arc<dyn NodeRunner>>;
