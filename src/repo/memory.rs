//! In-memory repository.
//!
//! Chain-ordered tables live behind one lock so list reorders and bulk
//! creates are atomic; append-only tables (executions, responses) use
//! sharded maps.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::chain::{append_tail, move_after, move_before, ordered_walk, unlink, Linked};
use super::{MoveAnchor, RepoResult, Repository};
use crate::error::RepoError;
use crate::ident::Id;
use crate::model::{
    ConditionNode, Edge, EnvVariable, Environment, Flow, FlowNode, FlowVariable, ForEachNode,
    ForNode, HttpAssert, HttpBodyRaw, HttpKv, HttpRequestDef, HttpResponseRecord, JsNode,
    KvKind, NodeExecution, NoopNode, RequestNode,
};

impl Linked for FlowVariable {
    fn link_id(&self) -> Id {
        self.id
    }
    fn prev(&self) -> Option<Id> {
        self.prev_id
    }
    fn next(&self) -> Option<Id> {
        self.next_id
    }
    fn set_prev(&mut self, prev: Option<Id>) {
        self.prev_id = prev;
    }
    fn set_next(&mut self, next: Option<Id>) {
        self.next_id = next;
    }
}

impl Linked for EnvVariable {
    fn link_id(&self) -> Id {
        self.id
    }
    fn prev(&self) -> Option<Id> {
        self.prev_id
    }
    fn next(&self) -> Option<Id> {
        self.next_id
    }
    fn set_prev(&mut self, prev: Option<Id>) {
        self.prev_id = prev;
    }
    fn set_next(&mut self, next: Option<Id>) {
        self.next_id = next;
    }
}

impl Linked for HttpKv {
    fn link_id(&self) -> Id {
        self.id
    }
    fn prev(&self) -> Option<Id> {
        self.prev_id
    }
    fn next(&self) -> Option<Id> {
        self.next_id
    }
    fn set_prev(&mut self, prev: Option<Id>) {
        self.prev_id = prev;
    }
    fn set_next(&mut self, next: Option<Id>) {
        self.next_id = next;
    }
    fn is_isolated_row(&self) -> bool {
        self.delta_parent_id.is_some()
    }
}

impl Linked for HttpAssert {
    fn link_id(&self) -> Id {
        self.id
    }
    fn prev(&self) -> Option<Id> {
        self.prev_id
    }
    fn next(&self) -> Option<Id> {
        self.next_id
    }
    fn set_prev(&mut self, prev: Option<Id>) {
        self.prev_id = prev;
    }
    fn set_next(&mut self, next: Option<Id>) {
        self.next_id = next;
    }
    fn is_isolated_row(&self) -> bool {
        self.delta_parent_id.is_some()
    }
}

#[derive(Default)]
struct Tables {
    flows: HashMap<Id, Flow>,
    nodes: HashMap<Id, FlowNode>,
    noops: HashMap<Id, NoopNode>,
    request_cfgs: HashMap<Id, RequestNode>,
    condition_cfgs: HashMap<Id, ConditionNode>,
    for_cfgs: HashMap<Id, ForNode>,
    foreach_cfgs: HashMap<Id, ForEachNode>,
    js_cfgs: HashMap<Id, JsNode>,
    edges: HashMap<Id, Edge>,
    environments: HashMap<Id, Environment>,
    request_defs: HashMap<Id, HttpRequestDef>,
    bodies: HashMap<Id, HttpBodyRaw>,
    // chains, scoped per parent
    flow_vars: HashMap<Id, HashMap<Id, FlowVariable>>,
    flow_var_scope: HashMap<Id, Id>,
    env_vars: HashMap<Id, HashMap<Id, EnvVariable>>,
    kvs: HashMap<(Id, KvKind), HashMap<Id, HttpKv>>,
    kv_scope: HashMap<Id, (Id, KvKind)>,
    asserts: HashMap<Id, HashMap<Id, HttpAssert>>,
}

/// In-memory [`Repository`] implementation.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
    executions: DashMap<Id, Vec<NodeExecution>>,
    responses: DashMap<Id, HttpResponseRecord>,
    responses_by_http: DashMap<Id, Vec<Id>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_flow(&self, flow: Flow) -> RepoResult<()> {
        self.tables.write().flows.insert(flow.id, flow);
        Ok(())
    }

    async fn get_flow(&self, id: Id) -> RepoResult<Flow> {
        self.tables
            .read()
            .flows
            .get(&id)
            .cloned()
            .ok_or_else(|| RepoError::NotFound(format!("flow {id}")))
    }

    async fn find_flow_by_name(&self, workspace_id: Id, name: &str) -> RepoResult<Flow> {
        self.tables
            .read()
            .flows
            .values()
            .find(|f| f.workspace_id == workspace_id && f.name == name)
            .cloned()
            .ok_or_else(|| RepoError::NotFound(format!("flow named {name}")))
    }

    async fn list_flows(&self, workspace_id: Id) -> RepoResult<Vec<Flow>> {
        let mut flows: Vec<Flow> = self
            .tables
            .read()
            .flows
            .values()
            .filter(|f| f.workspace_id == workspace_id)
            .cloned()
            .collect();
        flows.sort_by_key(|f| f.id);
        Ok(flows)
    }

    async fn create_node(&self, node: FlowNode) -> RepoResult<()> {
        self.tables.write().nodes.insert(node.id, node);
        Ok(())
    }

    async fn get_node(&self, id: Id) -> RepoResult<FlowNode> {
        self.tables
            .read()
            .nodes
            .get(&id)
            .cloned()
            .ok_or_else(|| RepoError::NotFound(format!("node {id}")))
    }

    async fn list_nodes(&self, flow_id: Id) -> RepoResult<Vec<FlowNode>> {
        let mut nodes: Vec<FlowNode> = self
            .tables
            .read()
            .nodes
            .values()
            .filter(|n| n.flow_id == flow_id)
            .cloned()
            .collect();
        nodes.sort_by_key(|n| n.id);
        Ok(nodes)
    }

    async fn create_noop_config(&self, config: NoopNode) -> RepoResult<()> {
        self.tables.write().noops.insert(config.flow_node_id, config);
        Ok(())
    }

    async fn get_noop_config(&self, flow_node_id: Id) -> RepoResult<NoopNode> {
        self.tables
            .read()
            .noops
            .get(&flow_node_id)
            .cloned()
            .ok_or_else(|| RepoError::NotFound(format!("noop config for {flow_node_id}")))
    }

    async fn create_request_config(&self, config: RequestNode) -> RepoResult<()> {
        self.tables
            .write()
            .request_cfgs
            .insert(config.flow_node_id, config);
        Ok(())
    }

    async fn get_request_config(&self, flow_node_id: Id) -> RepoResult<RequestNode> {
        self.tables
            .read()
            .request_cfgs
            .get(&flow_node_id)
            .cloned()
            .ok_or_else(|| RepoError::NotFound(format!("request config for {flow_node_id}")))
    }

    async fn create_condition_config(&self, config: ConditionNode) -> RepoResult<()> {
        self.tables
            .write()
            .condition_cfgs
            .insert(config.flow_node_id, config);
        Ok(())
    }

    async fn get_condition_config(&self, flow_node_id: Id) -> RepoResult<ConditionNode> {
        self.tables
            .read()
            .condition_cfgs
            .get(&flow_node_id)
            .cloned()
            .ok_or_else(|| RepoError::NotFound(format!("condition config for {flow_node_id}")))
    }

    async fn create_for_config(&self, config: ForNode) -> RepoResult<()> {
        self.tables
            .write()
            .for_cfgs
            .insert(config.flow_node_id, config);
        Ok(())
    }

    async fn get_for_config(&self, flow_node_id: Id) -> RepoResult<ForNode> {
        self.tables
            .read()
            .for_cfgs
            .get(&flow_node_id)
            .cloned()
            .ok_or_else(|| RepoError::NotFound(format!("for config for {flow_node_id}")))
    }

    async fn create_foreach_config(&self, config: ForEachNode) -> RepoResult<()> {
        self.tables
            .write()
            .foreach_cfgs
            .insert(config.flow_node_id, config);
        Ok(())
    }

    async fn get_foreach_config(&self, flow_node_id: Id) -> RepoResult<ForEachNode> {
        self.tables
            .read()
            .foreach_cfgs
            .get(&flow_node_id)
            .cloned()
            .ok_or_else(|| RepoError::NotFound(format!("foreach config for {flow_node_id}")))
    }

    async fn create_js_config(&self, config: JsNode) -> RepoResult<()> {
        self.tables
            .write()
            .js_cfgs
            .insert(config.flow_node_id, config);
        Ok(())
    }

    async fn get_js_config(&self, flow_node_id: Id) -> RepoResult<JsNode> {
        self.tables
            .read()
            .js_cfgs
            .get(&flow_node_id)
            .cloned()
            .ok_or_else(|| RepoError::NotFound(format!("js config for {flow_node_id}")))
    }

    async fn create_edge(&self, edge: Edge) -> RepoResult<()> {
        self.tables.write().edges.insert(edge.id, edge);
        Ok(())
    }

    async fn list_edges(&self, flow_id: Id) -> RepoResult<Vec<Edge>> {
        let mut edges: Vec<Edge> = self
            .tables
            .read()
            .edges
            .values()
            .filter(|e| e.flow_id == flow_id)
            .cloned()
            .collect();
        edges.sort_by_key(|e| e.id);
        Ok(edges)
    }

    async fn create_flow_variable(&self, variable: FlowVariable) -> RepoResult<()> {
        let mut tables = self.tables.write();
        let flow_id = variable.flow_id;
        let id = variable.id;
        tables.flow_var_scope.insert(id, flow_id);
        let chain = tables.flow_vars.entry(flow_id).or_default();
        chain.insert(id, variable);
        append_tail(chain, id)
    }

    async fn list_flow_variables(&self, flow_id: Id) -> RepoResult<Vec<FlowVariable>> {
        let tables = self.tables.read();
        match tables.flow_vars.get(&flow_id) {
            Some(chain) => ordered_walk(chain),
            None => Ok(Vec::new()),
        }
    }

    async fn move_flow_variable(&self, id: Id, anchor: MoveAnchor) -> RepoResult<()> {
        let mut tables = self.tables.write();
        let flow_id = *tables
            .flow_var_scope
            .get(&id)
            .ok_or_else(|| RepoError::NotFound(format!("flow variable {id}")))?;
        let chain = tables
            .flow_vars
            .get_mut(&flow_id)
            .ok_or_else(|| RepoError::NotFound(format!("flow variable chain {flow_id}")))?;
        match anchor {
            MoveAnchor::Before(anchor) => move_before(chain, id, anchor),
            MoveAnchor::After(anchor) => move_after(chain, id, anchor),
        }
    }

    async fn delete_flow_variable(&self, id: Id) -> RepoResult<()> {
        let mut tables = self.tables.write();
        let flow_id = *tables
            .flow_var_scope
            .get(&id)
            .ok_or_else(|| RepoError::NotFound(format!("flow variable {id}")))?;
        if let Some(chain) = tables.flow_vars.get_mut(&flow_id) {
            unlink(chain, id)?;
            chain.remove(&id);
        }
        tables.flow_var_scope.remove(&id);
        Ok(())
    }

    async fn create_environment(&self, env: Environment) -> RepoResult<()> {
        self.tables.write().environments.insert(env.id, env);
        Ok(())
    }

    async fn list_environments(&self, workspace_id: Id) -> RepoResult<Vec<Environment>> {
        let mut envs: Vec<Environment> = self
            .tables
            .read()
            .environments
            .values()
            .filter(|e| e.workspace_id == workspace_id)
            .cloned()
            .collect();
        envs.sort_by_key(|e| e.id);
        Ok(envs)
    }

    async fn create_env_variable(&self, variable: EnvVariable) -> RepoResult<()> {
        let mut tables = self.tables.write();
        let env_id = variable.env_id;
        let id = variable.id;
        let chain = tables.env_vars.entry(env_id).or_default();
        chain.insert(id, variable);
        append_tail(chain, id)
    }

    async fn list_env_variables(&self, env_id: Id) -> RepoResult<Vec<EnvVariable>> {
        let tables = self.tables.read();
        match tables.env_vars.get(&env_id) {
            Some(chain) => ordered_walk(chain),
            None => Ok(Vec::new()),
        }
    }

    async fn create_request_def(&self, def: HttpRequestDef) -> RepoResult<()> {
        self.tables.write().request_defs.insert(def.id, def);
        Ok(())
    }

    async fn get_request_def(&self, id: Id) -> RepoResult<HttpRequestDef> {
        self.tables
            .read()
            .request_defs
            .get(&id)
            .cloned()
            .ok_or_else(|| RepoError::NotFound(format!("request def {id}")))
    }

    async fn list_request_defs(&self, workspace_id: Id) -> RepoResult<Vec<HttpRequestDef>> {
        let mut defs: Vec<HttpRequestDef> = self
            .tables
            .read()
            .request_defs
            .values()
            .filter(|d| d.workspace_id == workspace_id)
            .cloned()
            .collect();
        defs.sort_by_key(|d| d.id);
        Ok(defs)
    }

    async fn create_kv(&self, row: HttpKv) -> RepoResult<()> {
        let mut tables = self.tables.write();
        let scope = (row.http_id, row.kind);
        let id = row.id;
        let isolated = row.delta_parent_id.is_some();
        tables.kv_scope.insert(id, scope);
        let chain = tables.kvs.entry(scope).or_default();
        chain.insert(id, row);
        if isolated {
            return Ok(());
        }
        append_tail(chain, id)
    }

    async fn list_kv(&self, http_id: Id, kind: KvKind) -> RepoResult<Vec<HttpKv>> {
        let tables = self.tables.read();
        match tables.kvs.get(&(http_id, kind)) {
            Some(chain) => ordered_walk(chain),
            None => Ok(Vec::new()),
        }
    }

    async fn list_delta_kv(&self, http_id: Id, kind: KvKind) -> RepoResult<Vec<HttpKv>> {
        let tables = self.tables.read();
        let mut rows: Vec<HttpKv> = tables
            .kvs
            .get(&(http_id, kind))
            .map(|chain| {
                chain
                    .values()
                    .filter(|row| row.delta_parent_id.is_some())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }

    async fn move_kv(&self, id: Id, anchor: MoveAnchor) -> RepoResult<()> {
        let mut tables = self.tables.write();
        let scope = *tables
            .kv_scope
            .get(&id)
            .ok_or_else(|| RepoError::NotFound(format!("kv row {id}")))?;
        let chain = tables
            .kvs
            .get_mut(&scope)
            .ok_or_else(|| RepoError::NotFound(format!("kv chain for {id}")))?;
        match anchor {
            MoveAnchor::Before(anchor) => move_before(chain, id, anchor),
            MoveAnchor::After(anchor) => move_after(chain, id, anchor),
        }
    }

    async fn delete_kv(&self, id: Id) -> RepoResult<()> {
        let mut tables = self.tables.write();
        let scope = *tables
            .kv_scope
            .get(&id)
            .ok_or_else(|| RepoError::NotFound(format!("kv row {id}")))?;
        if let Some(chain) = tables.kvs.get_mut(&scope) {
            unlink(chain, id)?;
            chain.remove(&id);
        }
        tables.kv_scope.remove(&id);
        Ok(())
    }

    async fn set_body_raw(&self, body: HttpBodyRaw) -> RepoResult<()> {
        self.tables.write().bodies.insert(body.http_id, body);
        Ok(())
    }

    async fn get_body_raw(&self, http_id: Id) -> RepoResult<Option<HttpBodyRaw>> {
        Ok(self.tables.read().bodies.get(&http_id).cloned())
    }

    async fn create_assert(&self, row: HttpAssert) -> RepoResult<()> {
        let mut tables = self.tables.write();
        let http_id = row.http_id;
        let id = row.id;
        let isolated = row.delta_parent_id.is_some();
        let chain = tables.asserts.entry(http_id).or_default();
        chain.insert(id, row);
        if isolated {
            return Ok(());
        }
        append_tail(chain, id)
    }

    async fn list_asserts(&self, http_id: Id) -> RepoResult<Vec<HttpAssert>> {
        let tables = self.tables.read();
        match tables.asserts.get(&http_id) {
            Some(chain) => ordered_walk(chain),
            None => Ok(Vec::new()),
        }
    }

    async fn list_delta_asserts(&self, http_id: Id) -> RepoResult<Vec<HttpAssert>> {
        let tables = self.tables.read();
        let mut rows: Vec<HttpAssert> = tables
            .asserts
            .get(&http_id)
            .map(|chain| {
                chain
                    .values()
                    .filter(|row| row.delta_parent_id.is_some())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }

    async fn create_response(&self, record: HttpResponseRecord) -> RepoResult<()> {
        self.responses_by_http
            .entry(record.http_id)
            .or_default()
            .push(record.id);
        self.responses.insert(record.id, record);
        Ok(())
    }

    async fn get_response(&self, id: Id) -> RepoResult<HttpResponseRecord> {
        self.responses
            .get(&id)
            .map(|r| r.clone())
            .ok_or_else(|| RepoError::NotFound(format!("response {id}")))
    }

    async fn list_responses(&self, http_id: Id) -> RepoResult<Vec<HttpResponseRecord>> {
        let ids = self
            .responses_by_http
            .get(&http_id)
            .map(|v| v.clone())
            .unwrap_or_default();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.responses.get(&id) {
                out.push(record.clone());
            }
        }
        Ok(out)
    }

    async fn create_execution(&self, execution: NodeExecution) -> RepoResult<()> {
        self.executions
            .entry(execution.node_id)
            .or_default()
            .push(execution);
        Ok(())
    }

    async fn list_executions(&self, node_id: Id) -> RepoResult<Vec<NodeExecution>> {
        Ok(self
            .executions
            .get(&node_id)
            .map(|v| v.clone())
            .unwrap_or_default())
    }

    async fn latest_main_execution(&self, node_id: Id) -> RepoResult<Option<NodeExecution>> {
        Ok(self.executions.get(&node_id).and_then(|rows| {
            rows.iter()
                .rev()
                .find(|row| !NodeExecution::is_iteration_row(&row.name))
                .cloned()
        }))
    }
}
