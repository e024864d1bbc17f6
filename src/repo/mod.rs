//! Repository facade.
//!
//! The core reads and writes through this narrow interface; the backing
//! store is out of scope. The facade promises atomicity on multi-row
//! writes (list reorders, bulk creates), order-preserving iteration via
//! the chain walk for any `prev`/`next` collection, and that an in-process
//! write is visible to subsequent reads.

mod chain;
mod memory;

pub use chain::Linked;
pub use memory::MemoryRepository;

use async_trait::async_trait;

use crate::error::RepoError;
use crate::ident::Id;
use crate::model::{
    ConditionNode, Edge, EnvVariable, Environment, Flow, FlowNode, FlowVariable, ForEachNode,
    ForNode, HttpAssert, HttpBodyRaw, HttpKv, HttpRequestDef, HttpResponseRecord, JsNode,
    KvKind, NodeExecution, NoopNode, RequestNode,
};

/// Anchor for chain reorder operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveAnchor {
    Before(Id),
    After(Id),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Narrow read/write interface over the store, named by entity.
#[async_trait]
pub trait Repository: Send + Sync {
    // -- flows --
    async fn create_flow(&self, flow: Flow) -> RepoResult<()>;
    async fn get_flow(&self, id: Id) -> RepoResult<Flow>;
    async fn find_flow_by_name(&self, workspace_id: Id, name: &str) -> RepoResult<Flow>;
    async fn list_flows(&self, workspace_id: Id) -> RepoResult<Vec<Flow>>;

    // -- nodes --
    async fn create_node(&self, node: FlowNode) -> RepoResult<()>;
    async fn get_node(&self, id: Id) -> RepoResult<FlowNode>;
    async fn list_nodes(&self, flow_id: Id) -> RepoResult<Vec<FlowNode>>;
    async fn create_noop_config(&self, config: NoopNode) -> RepoResult<()>;
    async fn get_noop_config(&self, flow_node_id: Id) -> RepoResult<NoopNode>;
    async fn create_request_config(&self, config: RequestNode) -> RepoResult<()>;
    async fn get_request_config(&self, flow_node_id: Id) -> RepoResult<RequestNode>;
    async fn create_condition_config(&self, config: ConditionNode) -> RepoResult<()>;
    async fn get_condition_config(&self, flow_node_id: Id) -> RepoResult<ConditionNode>;
    async fn create_for_config(&self, config: ForNode) -> RepoResult<()>;
    async fn get_for_config(&self, flow_node_id: Id) -> RepoResult<ForNode>;
    async fn create_foreach_config(&self, config: ForEachNode) -> RepoResult<()>;
    async fn get_foreach_config(&self, flow_node_id: Id) -> RepoResult<ForEachNode>;
    async fn create_js_config(&self, config: JsNode) -> RepoResult<()>;
    async fn get_js_config(&self, flow_node_id: Id) -> RepoResult<JsNode>;

    // -- edges --
    async fn create_edge(&self, edge: Edge) -> RepoResult<()>;
    async fn list_edges(&self, flow_id: Id) -> RepoResult<Vec<Edge>>;

    // -- flow variables (ordered) --
    async fn create_flow_variable(&self, variable: FlowVariable) -> RepoResult<()>;
    async fn list_flow_variables(&self, flow_id: Id) -> RepoResult<Vec<FlowVariable>>;
    async fn move_flow_variable(&self, id: Id, anchor: MoveAnchor) -> RepoResult<()>;
    async fn delete_flow_variable(&self, id: Id) -> RepoResult<()>;

    // -- environments (ordered variables) --
    async fn create_environment(&self, env: Environment) -> RepoResult<()>;
    async fn list_environments(&self, workspace_id: Id) -> RepoResult<Vec<Environment>>;
    async fn create_env_variable(&self, variable: EnvVariable) -> RepoResult<()>;
    async fn list_env_variables(&self, env_id: Id) -> RepoResult<Vec<EnvVariable>>;

    // -- http request templates --
    async fn create_request_def(&self, def: HttpRequestDef) -> RepoResult<()>;
    async fn get_request_def(&self, id: Id) -> RepoResult<HttpRequestDef>;
    async fn list_request_defs(&self, workspace_id: Id) -> RepoResult<Vec<HttpRequestDef>>;
    async fn create_kv(&self, row: HttpKv) -> RepoResult<()>;
    async fn list_kv(&self, http_id: Id, kind: KvKind) -> RepoResult<Vec<HttpKv>>;
    /// Isolated delta-override rows of a delta template, excluded from the
    /// user chain.
    async fn list_delta_kv(&self, http_id: Id, kind: KvKind) -> RepoResult<Vec<HttpKv>>;
    async fn move_kv(&self, id: Id, anchor: MoveAnchor) -> RepoResult<()>;
    async fn delete_kv(&self, id: Id) -> RepoResult<()>;
    async fn set_body_raw(&self, body: HttpBodyRaw) -> RepoResult<()>;
    async fn get_body_raw(&self, http_id: Id) -> RepoResult<Option<HttpBodyRaw>>;
    async fn create_assert(&self, row: HttpAssert) -> RepoResult<()>;
    async fn list_asserts(&self, http_id: Id) -> RepoResult<Vec<HttpAssert>>;
    async fn list_delta_asserts(&self, http_id: Id) -> RepoResult<Vec<HttpAssert>>;

    // -- responses --
    async fn create_response(&self, record: HttpResponseRecord) -> RepoResult<()>;
    async fn get_response(&self, id: Id) -> RepoResult<HttpResponseRecord>;
    async fn list_responses(&self, http_id: Id) -> RepoResult<Vec<HttpResponseRecord>>;

    // -- node executions (append-only) --
    async fn create_execution(&self, execution: NodeExecution) -> RepoResult<()>;
    async fn list_executions(&self, node_id: Id) -> RepoResult<Vec<NodeExecution>>;
    /// Latest execution whose name is not an iteration or error-summary row.
    async fn latest_main_execution(&self, node_id: Id) -> RepoResult<Option<NodeExecution>>;
}
