//! Flow runner.
//!
//! A single logical scheduler walks the graph from the start node,
//! dispatching each node, publishing outputs through the tracked
//! namespace, recording executions, and emitting status events. Loop
//! bodies are recursive flow-fragment executions through the same
//! machinery, reached via the [`SubflowRunner`] handle the loop nodes
//! hold.

pub mod events;
pub mod persist;
pub mod record;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::edges::EdgeMap;
use crate::error::{FlowResult, NodeError};
use crate::graph::validate_flow;
use crate::httpclient::HttpClientProvider;
use crate::ident::{Id, IdSource, MonotonicIdSource};
use crate::jsclient::{JsEvaluator, NullJsEvaluator};
use crate::model::{
    Flow, FlowNode, FlowRunSummary, FlowStatus, IterationContext, NodeKind, NodeRunSummary,
    NodeState,
};
use crate::namespace::{Namespace, NamespaceTracker, SharedNamespace};
use crate::nodes::{
    materialize_request, ConditionRunner, ForEachRunner, ForRunner, JsRunner, NodeMap,
    NodeOutcome, NodeRequest, NodeRunner, StartRunner, SubflowOutcome, SubflowRunner,
};
use crate::repo::Repository;
use events::{
    emit_node_event, flow_event_channel, node_event_channel, FlowEventReceiver, FlowStatusEvent,
    NodeEventReceiver, NodeEventSender, NodeStatusEvent,
};
use persist::{response_channel_capacity, spawn_response_persister, ResponseSender};
use record::ExecutionRecorder;

/// Default per-node timeout; a numeric top-level `timeout` variable
/// (seconds) overrides it before any node runs.
pub const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared clients and sources a runner needs besides the repository.
#[derive(Clone)]
pub struct RunnerDeps {
    pub http: Arc<HttpClientProvider>,
    pub js: Arc<dyn JsEvaluator>,
    pub ids: Arc<dyn IdSource>,
    pub per_node_timeout: Duration,
}

impl Default for RunnerDeps {
    fn default() -> Self {
        Self {
            http: Arc::new(HttpClientProvider::default()),
            js: Arc::new(NullJsEvaluator),
            ids: Arc::new(MonotonicIdSource::new()),
            per_node_timeout: DEFAULT_NODE_TIMEOUT,
        }
    }
}

/// A loaded, validated flow ready to run.
pub struct FlowRunner {
    flow: Flow,
    start: Id,
    nodes: NodeMap,
    headers: HashMap<Id, FlowNode>,
    edges: Arc<EdgeMap>,
    namespace: SharedNamespace,
    repo: Arc<dyn Repository>,
    deps: RunnerDeps,
    max_iter_count: usize,
    request_node_count: usize,
}

/// Live run: status channels plus the driver task.
pub struct RunHandle {
    pub flow_id: Id,
    pub node_events: NodeEventReceiver,
    pub flow_events: FlowEventReceiver,
    pub cancel: CancellationToken,
    pub join: JoinHandle<FlowRunSummary>,
}

impl RunHandle {
    /// Drain the terminal status and the summary.
    pub async fn wait(self) -> FlowRunSummary {
        match self.join.await {
            Ok(summary) => summary,
            Err(join_error) => {
                warn!(%join_error, "flow driver task failed");
                FlowRunSummary {
                    flow_id: self.flow_id,
                    flow_name: String::new(),
                    started_at: Utc::now(),
                    duration_ms: 0,
                    status: FlowStatus::Failed,
                    error: Some(join_error.to_string()),
                    nodes: Vec::new(),
                }
            }
        }
    }
}

impl FlowRunner {
    /// Load `(nodes, edges, variables)` from the repository, validate the
    /// graph, materialize request templates, and seed the namespace.
    pub async fn load(
        repo: Arc<dyn Repository>,
        flow_id: Id,
        deps: RunnerDeps,
    ) -> FlowResult<Self> {
        let flow = repo.get_flow(flow_id).await?;
        let headers_vec = repo.list_nodes(flow_id).await?;
        let edges_vec = repo.list_edges(flow_id).await?;

        let mut noops = Vec::new();
        for node in headers_vec.iter().filter(|n| n.kind == NodeKind::NoOp) {
            noops.push(repo.get_noop_config(node.id).await?);
        }
        let start = validate_flow(&headers_vec, &noops, &edges_vec)?;

        let mut nodes: NodeMap = HashMap::new();
        let mut max_iter_count = 0usize;
        let mut request_node_count = 0usize;
        for header in &headers_vec {
            let runner: Arc<dyn NodeRunner> = match header.kind {
                NodeKind::NoOp => Arc::new(StartRunner::new(header.id, header.name.clone())),
                NodeKind::Request => {
                    request_node_count += 1;
                    let cfg = repo.get_request_config(header.id).await?;
                    let spec = materialize_request(repo.as_ref(), &cfg).await?;
                    Arc::new(crate::nodes::RequestRunner::new(
                        header.id,
                        header.name.clone(),
                        spec,
                    ))
                }
                NodeKind::Condition => {
                    let cfg = repo.get_condition_config(header.id).await?;
                    Arc::new(ConditionRunner::new(
                        header.id,
                        header.name.clone(),
                        cfg.condition,
                    ))
                }
                NodeKind::For => {
                    let cfg = repo.get_for_config(header.id).await?;
                    max_iter_count = max_iter_count.max(cfg.iter_count.max(0) as usize);
                    Arc::new(ForRunner::new(
                        header.id,
                        header.name.clone(),
                        cfg.iter_count,
                        cfg.error_handling,
                    ))
                }
                NodeKind::ForEach => {
                    let cfg = repo.get_foreach_config(header.id).await?;
                    Arc::new(ForEachRunner::new(
                        header.id,
                        header.name.clone(),
                        cfg.iter_expression,
                        cfg.break_condition,
                        cfg.error_handling,
                    ))
                }
                NodeKind::Js => {
                    let cfg = repo.get_js_config(header.id).await?;
                    Arc::new(JsRunner::new(header.id, header.name.clone(), cfg.code))
                }
            };
            nodes.insert(header.id, runner);
        }

        // seed the namespace from enabled flow variables
        let mut namespace = Namespace::new();
        for variable in repo.list_flow_variables(flow_id).await? {
            if !variable.enabled {
                continue;
            }
            let value = serde_json::from_str::<Value>(&variable.value)
                .unwrap_or(Value::String(variable.value.clone()));
            namespace.write(variable.name, value);
        }

        // per-run timeout override
        let mut deps = deps;
        if let Ok(value) = namespace.read("timeout") {
            if let Some(secs) = value.as_f64().or_else(|| {
                value.as_str().and_then(|s| s.parse::<f64>().ok())
            }) {
                if secs > 0.0 {
                    deps.per_node_timeout = Duration::from_secs_f64(secs);
                }
            }
        }

        let headers = headers_vec.into_iter().map(|n| (n.id, n)).collect();
        Ok(Self {
            flow,
            start,
            nodes,
            headers,
            edges: Arc::new(EdgeMap::build(&edges_vec)),
            namespace: namespace.into_shared(),
            repo,
            deps,
            max_iter_count,
            request_node_count,
        })
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    /// Spawn the driver and return the live handle.
    pub fn start(self) -> RunHandle {
        let (node_tx, node_rx) = node_event_channel();
        let (flow_tx, flow_rx) = flow_event_channel();
        let cancel = CancellationToken::new();

        let capacity = response_channel_capacity(self.max_iter_count, self.request_node_count);
        let persist_cancel = cancel.child_token();
        let (responses, persister) =
            spawn_response_persister(Arc::clone(&self.repo), capacity, persist_cancel.clone());

        let flow_id = self.flow.id;
        let flow_name = self.flow.name.clone();
        let recorder = Arc::new(ExecutionRecorder::new(
            Arc::clone(&self.repo),
            Arc::clone(&self.deps.ids),
        ));

        let shared = Arc::new(RunnerShared {
            nodes: self.nodes,
            headers: self.headers,
            edges: self.edges,
            namespace: self.namespace,
            recorder,
            http: self.deps.http,
            js: self.deps.js,
            ids: self.deps.ids,
            per_node_timeout: self.deps.per_node_timeout,
            node_tx: node_tx.clone(),
            responses,
            summaries: Mutex::new(Vec::new()),
        });

        let start = self.start;
        let run_cancel = cancel.clone();
        let join = tokio::spawn(async move {
            let started_at = Utc::now();
            let started = Instant::now();
            info!(flow = %flow_name, "flow run started");

            let result = RunnerShared::run_chain(
                &shared,
                vec![start],
                IterationContext::default(),
                run_cancel.clone(),
            )
            .await;

            let (status, error) = match &result {
                Err(NodeError::Canceled) => (FlowStatus::Canceled, None),
                Err(error) => (FlowStatus::Failed, Some(error.to_string())),
                Ok(chain) => match &chain.error {
                    Some(error) => {
                        let label = chain
                            .failed_node
                            .and_then(|id| shared.headers.get(&id))
                            .map(|h| format!("node {}: {error}", h.name))
                            .unwrap_or_else(|| error.to_string());
                        (FlowStatus::Failed, Some(label))
                    }
                    None => (FlowStatus::Success, None),
                },
            };

            // all nodes have returned; stop the persister after it drains
            // what is already queued
            let summaries = shared.summaries.lock().clone();
            drop(shared);
            persist_cancel.cancel();
            let _ = persister.await;
            info!(flow = %flow_name, ?status, "flow run finished");

            let _ = flow_tx.send(FlowStatusEvent {
                flow_id,
                status,
                error: error.clone(),
            });

            FlowRunSummary {
                flow_id,
                flow_name,
                started_at,
                duration_ms: started.elapsed().as_millis() as u64,
                status,
                error,
                nodes: summaries,
            }
        });

        RunHandle {
            flow_id,
            node_events: node_rx,
            flow_events: flow_rx,
            cancel,
            join,
        }
    }
}

/// Result of walking one graph fragment.
struct ChainResult {
    outputs: Map<String, Value>,
    error: Option<NodeError>,
    failed_node: Option<Id>,
    soft_error: Option<NodeError>,
}

/// State shared by the driver, loop bodies, and node requests.
struct RunnerShared {
    nodes: NodeMap,
    headers: HashMap<Id, FlowNode>,
    edges: Arc<EdgeMap>,
    namespace: SharedNamespace,
    recorder: Arc<ExecutionRecorder>,
    http: Arc<HttpClientProvider>,
    js: Arc<dyn JsEvaluator>,
    ids: Arc<dyn IdSource>,
    per_node_timeout: Duration,
    node_tx: NodeEventSender,
    responses: ResponseSender,
    summaries: Mutex<Vec<NodeRunSummary>>,
}

/// Loop-body access to the runner, handed to loop nodes.
struct SubflowHandle {
    shared: Arc<RunnerShared>,
}

#[async_trait]
impl SubflowRunner for SubflowHandle {
    async fn run_subflow(
        &self,
        loop_node: Id,
        iteration: &IterationContext,
        cancel: &CancellationToken,
    ) -> Result<SubflowOutcome, NodeError> {
        let targets = self
            .shared
            .edges
            .successors(loop_node, crate::model::Handle::Loop)
            .to_vec();
        let chain = RunnerShared::run_chain(
            &self.shared,
            targets,
            iteration.clone(),
            cancel.clone(),
        )
        .await?;
        Ok(SubflowOutcome {
            outputs: Value::Object(chain.outputs),
            error: chain.error.or(chain.soft_error),
        })
    }
}

impl RunnerShared {
    /// Walk a fragment starting from `initial`, honouring handles returned
    /// by each node. Cancellation surfaces as `Err(Canceled)`; a node
    /// failure stops the walk and is captured on the result.
    async fn run_chain(
        shared: &Arc<Self>,
        initial: Vec<Id>,
        iteration: IterationContext,
        cancel: CancellationToken,
    ) -> Result<ChainResult, NodeError> {
        let mut queue: VecDeque<Id> = initial.into();
        let mut executed: HashSet<Id> = HashSet::new();
        let mut result = ChainResult {
            outputs: Map::new(),
            error: None,
            failed_node: None,
            soft_error: None,
        };

        while let Some(node_id) = queue.pop_front() {
            if cancel.is_cancelled() {
                return Err(NodeError::Canceled);
            }
            if !executed.insert(node_id) {
                continue;
            }

            match Self::execute_node(shared, node_id, &iteration, &cancel).await {
                Ok(outcome) => {
                    let name = shared
                        .headers
                        .get(&node_id)
                        .map(|h| h.name.clone())
                        .unwrap_or_default();
                    result
                        .outputs
                        .insert(name, Value::Object(outcome.outputs.clone()));
                    if result.soft_error.is_none() {
                        result.soft_error = outcome.soft_error.clone();
                    }
                    for handle in &outcome.next_handles {
                        for &target in shared.edges.successors(node_id, *handle) {
                            queue.push_back(target);
                        }
                    }
                }
                Err(NodeError::Canceled) => return Err(NodeError::Canceled),
                Err(error) => {
                    result.error = Some(error);
                    result.failed_node = Some(node_id);
                    break;
                }
            }
        }

        Ok(result)
    }

    /// Run one node: emit RUNNING, execute under timeout and cancellation,
    /// record the execution row, emit the terminal state.
    async fn execute_node(
        shared: &Arc<Self>,
        node_id: Id,
        iteration: &IterationContext,
        cancel: &CancellationToken,
    ) -> Result<NodeOutcome, NodeError> {
        let runner = shared
            .nodes
            .get(&node_id)
            .ok_or_else(|| NodeError::ConfigError(format!("no executor for node {node_id}")))?
            .clone();
        let header_name = runner.name().to_string();
        let iter_ctx = (!iteration.iteration_path.is_empty()).then(|| iteration.clone());

        emit_node_event(
            &shared.node_tx,
            NodeStatusEvent {
                node_id,
                node_name: header_name.clone(),
                state: NodeState::Running,
                error: None,
                iteration: iter_ctx.clone(),
            },
        );
        debug!(node = %header_name, "node started");

        let tracker = Arc::new(NamespaceTracker::new(Arc::clone(&shared.namespace)));
        let child_cancel = cancel.child_token();
        let req = NodeRequest {
            tracker: Arc::clone(&tracker),
            cancel: child_cancel.clone(),
            iteration: iteration.clone(),
            per_node_timeout: shared.per_node_timeout,
            http: Arc::clone(&shared.http),
            js: Arc::clone(&shared.js),
            responses: shared.responses.clone(),
            events: shared.node_tx.clone(),
            recorder: Arc::clone(&shared.recorder),
            subflow: Arc::new(SubflowHandle {
                shared: Arc::clone(shared),
            }),
            ids: Arc::clone(&shared.ids),
        };

        let started = Instant::now();
        let is_loop = matches!(runner.kind(), NodeKind::For | NodeKind::ForEach);
        // loop containers pace their own iterations; the per-node timeout
        // applies to each body node instead
        let run_result = if is_loop {
            runner.run(&req).await
        } else {
            match tokio::time::timeout(shared.per_node_timeout, runner.run(&req)).await {
                Ok(result) => result,
                Err(_) => {
                    child_cancel.cancel();
                    Err(NodeError::Timeout)
                }
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let (state, error) = match &run_result {
            Ok(_) => (NodeState::Success, None),
            Err(NodeError::Canceled) => (NodeState::Canceled, Some(NodeError::Canceled)),
            Err(NodeError::Timeout) => (NodeState::TimedOut, Some(NodeError::Timeout)),
            Err(error) => (NodeState::Failed, Some(error.clone())),
        };

        let record_result = shared
            .recorder
            .record(
                node_id,
                &header_name,
                state,
                iter_ctx.as_ref(),
                &tracker.input_tree(),
                &tracker.output_tree(),
                error.as_ref(),
            )
            .await;
        let exec_id = match record_result {
            Ok(id) => id,
            Err(repo_error) => {
                // storage problems are fatal for the flow
                return Err(NodeError::from(repo_error));
            }
        };

        shared.summaries.lock().push(NodeRunSummary {
            node_id,
            execution_id: exec_id,
            name: header_name.clone(),
            state,
            duration_ms,
            error: error.as_ref().map(|e| e.to_string()),
            iteration_context: iter_ctx.clone(),
        });

        emit_node_event(
            &shared.node_tx,
            NodeStatusEvent {
                node_id,
                node_name: header_name.clone(),
                state,
                error: error.as_ref().map(|e| e.to_string()),
                iteration: iter_ctx,
            },
        );
        match &run_result {
            Ok(_) => debug!(node = %header_name, ?state, "node finished"),
            Err(e) => warn!(node = %header_name, error = %e, ?state, "node failed"),
        }

        run_result
    }
}
