//! User-authored flow files (YAML).
//!
//! A flow file declares flows made of `request` / `if` / `for` / `foreach`
//! / `js` steps. Steps name the siblings they follow with `depends_on`;
//! steps without one chain linearly after the previous step, the first
//! step following the start node. The compiler materializes the file into
//! the data model through the repository.

mod execute;
mod schema;

pub use execute::execute_file;
pub use schema::{
    FlowDef, FlowFile, ForEachStep, ForStep, IfStep, JsStep, RequestStep, RunEntry, Step,
    VariableDef,
};

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{FlowError, FlowResult};
use crate::ident::{Id, IdSource};
use crate::model::{
    ConditionNode, Edge, EdgeKind, ErrorHandling, Flow, FlowNode, FlowVariable, ForEachNode,
    ForNode, Handle, HttpBodyRaw, HttpKv, HttpRequestDef, JsNode, KvKind, NodeKind, NoopKind,
    NoopNode, RequestNode,
};
use crate::repo::Repository;

/// Parse flow file text.
pub fn parse_flow_file(text: &str) -> FlowResult<FlowFile> {
    serde_yaml::from_str(text).map_err(|e| FlowError::FlowFile(e.to_string()))
}

/// One compiled flow plus its run-order dependencies.
#[derive(Debug, Clone)]
pub struct CompiledFlow {
    pub flow: Flow,
    pub depends_on: Vec<String>,
}

/// Materialize every flow of the file into the repository; returns the
/// flows in execution order.
pub async fn compile_flow_file(
    repo: &dyn Repository,
    ids: &dyn IdSource,
    workspace_id: Id,
    file: &FlowFile,
) -> FlowResult<Vec<CompiledFlow>> {
    let mut compiled = Vec::new();
    for def in &file.flows {
        let flow = compile_flow(repo, ids, workspace_id, def).await?;
        compiled.push(flow);
    }

    // `run` selects and orders; absent run section executes file order
    match &file.run {
        None => Ok(compiled
            .into_iter()
            .map(|flow| CompiledFlow {
                flow,
                depends_on: Vec::new(),
            })
            .collect()),
        Some(entries) => {
            let by_name: HashMap<String, Flow> = compiled
                .into_iter()
                .map(|flow| (flow.name.clone(), flow))
                .collect();
            let mut ordered = Vec::new();
            for entry in entries {
                let flow = by_name
                    .get(&entry.flow)
                    .cloned()
                    .ok_or_else(|| {
                        FlowError::FlowFile(format!("run references unknown flow: {}", entry.flow))
                    })?;
                ordered.push(CompiledFlow {
                    flow,
                    depends_on: entry.depends_on.clone(),
                });
            }
            Ok(ordered)
        }
    }
}

async fn compile_flow(
    repo: &dyn Repository,
    ids: &dyn IdSource,
    workspace_id: Id,
    def: &FlowDef,
) -> FlowResult<Flow> {
    let flow = Flow {
        id: ids.next_id(),
        workspace_id,
        name: def.name.clone(),
    };
    repo.create_flow(flow.clone()).await?;

    for variable in &def.variables {
        let value = match &variable.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        repo.create_flow_variable(FlowVariable {
            id: ids.next_id(),
            flow_id: flow.id,
            name: variable.name.clone(),
            value,
            enabled: variable.enabled.unwrap_or(true),
            prev_id: None,
            next_id: None,
        })
        .await?;
    }

    let start_id = ids.next_id();
    repo.create_node(FlowNode {
        id: start_id,
        flow_id: flow.id,
        name: "Start".to_string(),
        kind: NodeKind::NoOp,
        position_x: 0.0,
        position_y: 0.0,
    })
    .await?;
    repo.create_noop_config(NoopNode {
        flow_node_id: start_id,
        noop_kind: NoopKind::Start,
    })
    .await?;

    let mut compiler = StepCompiler {
        repo,
        ids,
        workspace_id,
        flow_id: flow.id,
        names: HashMap::new(),
        counter: 0,
    };
    compiler
        .compile_list(&def.steps, start_id, Handle::Unspecified)
        .await?;

    Ok(flow)
}

struct StepCompiler<'a> {
    repo: &'a dyn Repository,
    ids: &'a dyn IdSource,
    workspace_id: Id,
    flow_id: Id,
    names: HashMap<String, Id>,
    counter: usize,
}

impl StepCompiler<'_> {
    /// Compile a sibling list. `anchor`/`anchor_handle` is where the first
    /// dependency-free step attaches (start node, a condition's THEN/ELSE
    /// port, or a loop's LOOP port). Boxed because nested step lists
    /// recurse through it.
    fn compile_list<'s>(
        &'s mut self,
        steps: &'s [Step],
        anchor: Id,
        anchor_handle: Handle,
    ) -> futures::future::BoxFuture<'s, FlowResult<()>> {
        Box::pin(async move {
            let mut previous: Option<Id> = None;
            for step in steps {
                let node_id = self.compile_step(step).await?;

                if step.depends_on.is_empty() {
                    match previous {
                        Some(prev) => self.connect(prev, node_id, Handle::Unspecified).await?,
                        None => self.connect(anchor, node_id, anchor_handle).await?,
                    }
                } else {
                    for dep in &step.depends_on {
                        let dep_id = *self.names.get(dep).ok_or_else(|| {
                            FlowError::FlowFile(format!(
                                "depends_on references unknown step: {dep}"
                            ))
                        })?;
                        self.connect(dep_id, node_id, Handle::Unspecified).await?;
                    }
                }
                previous = Some(node_id);
            }
            Ok(())
        })
    }

    async fn compile_step(&mut self, step: &Step) -> FlowResult<Id> {
        if let Some(request) = &step.request {
            return self.compile_request(request).await;
        }
        if let Some(cond) = &step.if_step {
            return self.compile_if(cond).await;
        }
        if let Some(for_step) = &step.for_step {
            return self.compile_for(for_step).await;
        }
        if let Some(foreach) = &step.foreach {
            return self.compile_foreach(foreach).await;
        }
        if let Some(js) = &step.js {
            return self.compile_js(js).await;
        }
        Err(FlowError::FlowFile(
            "step must contain one of: request, if, for, foreach, js".to_string(),
        ))
    }

    fn next_name(&mut self, explicit: &Option<String>, prefix: &str) -> String {
        match explicit {
            Some(name) => name.clone(),
            None => {
                self.counter += 1;
                format!("{prefix}_{}", self.counter)
            }
        }
    }

    async fn create_node(&mut self, name: &str, kind: NodeKind) -> FlowResult<Id> {
        let id = self.ids.next_id();
        self.repo
            .create_node(FlowNode {
                id,
                flow_id: self.flow_id,
                name: name.to_string(),
                kind,
                position_x: 0.0,
                position_y: 0.0,
            })
            .await?;
        self.names.insert(name.to_string(), id);
        Ok(id)
    }

    async fn connect(&mut self, from: Id, to: Id, handle: Handle) -> FlowResult<()> {
        self.repo
            .create_edge(Edge {
                id: self.ids.next_id(),
                flow_id: self.flow_id,
                source_id: from,
                target_id: to,
                source_handle: handle,
                kind: if handle == Handle::Loop {
                    EdgeKind::Loop
                } else {
                    EdgeKind::Unspecified
                },
            })
            .await?;
        Ok(())
    }

    async fn compile_request(&mut self, step: &RequestStep) -> FlowResult<Id> {
        let name = self.next_name(&step.name, "request");
        let def_id = self.ids.next_id();
        self.repo
            .create_request_def(HttpRequestDef {
                id: def_id,
                workspace_id: self.workspace_id,
                name: name.clone(),
                method: step.method.clone().unwrap_or_else(|| "GET".to_string()),
                url: step.url.clone(),
            })
            .await?;

        for (key, value) in &step.headers {
            self.repo
                .create_kv(HttpKv {
                    id: self.ids.next_id(),
                    http_id: def_id,
                    kind: KvKind::Header,
                    key: key.clone(),
                    value: value.clone(),
                    enabled: true,
                    delta_parent_id: None,
                    prev_id: None,
                    next_id: None,
                })
                .await?;
        }
        for (key, value) in &step.query_params {
            self.repo
                .create_kv(HttpKv {
                    id: self.ids.next_id(),
                    http_id: def_id,
                    kind: KvKind::Query,
                    key: key.clone(),
                    value: value.clone(),
                    enabled: true,
                    delta_parent_id: None,
                    prev_id: None,
                    next_id: None,
                })
                .await?;
        }
        if let Some(body) = &step.body {
            let bytes = match body {
                Value::String(text) => text.clone().into_bytes(),
                other => serde_json::to_vec(other)
                    .map_err(|e| FlowError::FlowFile(e.to_string()))?,
            };
            self.repo
                .set_body_raw(HttpBodyRaw {
                    id: self.ids.next_id(),
                    http_id: def_id,
                    data: bytes,
                    compress_kind: Default::default(),
                })
                .await?;
        }
        for expression in &step.asserts {
            self.repo
                .create_assert(crate::model::HttpAssert {
                    id: self.ids.next_id(),
                    http_id: def_id,
                    expression: expression.clone(),
                    enabled: true,
                    delta_parent_id: None,
                    prev_id: None,
                    next_id: None,
                })
                .await?;
        }

        let node_id = self.create_node(&name, NodeKind::Request).await?;
        self.repo
            .create_request_config(RequestNode {
                flow_node_id: node_id,
                endpoint_id: None,
                example_id: Some(def_id),
                delta_example_id: None,
            })
            .await?;
        Ok(node_id)
    }

    async fn compile_if(&mut self, step: &IfStep) -> FlowResult<Id> {
        let name = self.next_name(&step.name, "if");
        let node_id = self.create_node(&name, NodeKind::Condition).await?;
        self.repo
            .create_condition_config(ConditionNode {
                flow_node_id: node_id,
                condition: step.condition.clone(),
            })
            .await?;

        self.compile_list(&step.then, node_id, Handle::Then).await?;
        self.compile_list(&step.else_steps, node_id, Handle::Else)
            .await?;
        Ok(node_id)
    }

    async fn compile_for(&mut self, step: &ForStep) -> FlowResult<Id> {
        let name = self.next_name(&step.name, "for");
        let node_id = self.create_node(&name, NodeKind::For).await?;
        self.repo
            .create_for_config(ForNode {
                flow_node_id: node_id,
                iter_count: step.count,
                error_handling: parse_error_handling(step.error_handling.as_deref())?,
            })
            .await?;
        self.compile_list(&step.steps, node_id, Handle::Loop).await?;
        Ok(node_id)
    }

    async fn compile_foreach(&mut self, step: &ForEachStep) -> FlowResult<Id> {
        let name = self.next_name(&step.name, "foreach");
        let node_id = self.create_node(&name, NodeKind::ForEach).await?;
        self.repo
            .create_foreach_config(ForEachNode {
                flow_node_id: node_id,
                iter_expression: step.items.clone(),
                break_condition: step.break_if.clone(),
                error_handling: parse_error_handling(step.error_handling.as_deref())?,
            })
            .await?;
        self.compile_list(&step.steps, node_id, Handle::Loop).await?;
        Ok(node_id)
    }

    async fn compile_js(&mut self, step: &JsStep) -> FlowResult<Id> {
        let name = self.next_name(&step.name, "js");
        let node_id = self.create_node(&name, NodeKind::Js).await?;
        self.repo
            .create_js_config(JsNode {
                flow_node_id: node_id,
                code: step.code.clone().into_bytes(),
            })
            .await?;
        Ok(node_id)
    }
}

fn parse_error_handling(text: Option<&str>) -> FlowResult<ErrorHandling> {
    match text.map(|t| t.to_ascii_lowercase()) {
        None => Ok(ErrorHandling::Fail),
        Some(t) if t == "ignore" => Ok(ErrorHandling::Ignore),
        Some(t) if t == "break" => Ok(ErrorHandling::Break),
        Some(t) if t == "fail" => Ok(ErrorHandling::Fail),
        Some(other) => Err(FlowError::FlowFile(format!(
            "unknown error_handling: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::validate_flow;
    use crate::ident::FakeIdSource;
    use crate::repo::MemoryRepository;

    const SAMPLE: &str = r#"
workspace_name: demo
flows:
  - name: F
    variables:
      - name: base
        value: "http://svc"
      - name: timeout
        value: 30
    steps:
      - request:
          name: R1
          method: GET
          url: "{{ base }}/users"
      - if:
          name: C1
          condition: "R1.response.status == 200"
          then:
            - request:
                name: R2
                url: "{{ base }}/ok"
          else:
            - request:
                name: R3
                url: "{{ base }}/bad"
      - for:
          name: L1
          count: 3
          error_handling: break
          steps:
            - request:
                name: R4
                url: "{{ base }}/ping"
        depends_on: C1
"#;

    #[test]
    fn test_parse_sample() {
        let file = parse_flow_file(SAMPLE).unwrap();
        assert_eq!(file.workspace_name.as_deref(), Some("demo"));
        assert_eq!(file.flows.len(), 1);
        let flow = &file.flows[0];
        assert_eq!(flow.variables.len(), 2);
        assert_eq!(flow.steps.len(), 3);
        assert!(flow.steps[0].request.is_some());
        assert!(flow.steps[1].if_step.is_some());
        assert_eq!(flow.steps[2].depends_on, vec!["C1"]);
    }

    #[test]
    fn test_parse_depends_on_forms() {
        let text = r#"
flows:
  - name: F
    steps:
      - request: {name: A, url: "http://x"}
      - request: {name: B, url: "http://x"}
        depends_on: A
      - request: {name: C, url: "http://x"}
        depends_on: [A, B]
"#;
        let file = parse_flow_file(text).unwrap();
        assert_eq!(file.flows[0].steps[1].depends_on, vec!["A"]);
        assert_eq!(file.flows[0].steps[2].depends_on, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_compile_produces_valid_graph() {
        let repo = MemoryRepository::new();
        let ids = FakeIdSource::new();
        let workspace = crate::ident::IdSource::next_id(&ids);
        let file = parse_flow_file(SAMPLE).unwrap();

        let compiled = compile_flow_file(&repo, &ids, workspace, &file)
            .await
            .unwrap();
        assert_eq!(compiled.len(), 1);
        let flow_id = compiled[0].flow.id;

        let nodes = repo.list_nodes(flow_id).await.unwrap();
        let edges = repo.list_edges(flow_id).await.unwrap();
        let mut noops = Vec::new();
        for node in nodes.iter().filter(|n| n.kind == NodeKind::NoOp) {
            noops.push(repo.get_noop_config(node.id).await.unwrap());
        }
        validate_flow(&nodes, &noops, &edges).unwrap();

        // Start + R1 + C1 + R2 + R3 + L1 + R4
        assert_eq!(nodes.len(), 7);
        let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
        for expected in ["Start", "R1", "C1", "R2", "R3", "L1", "R4"] {
            assert!(names.contains(&expected), "missing node {expected}");
        }

        // condition handles and the loop edge are typed
        let l1 = nodes.iter().find(|n| n.name == "L1").unwrap();
        assert!(edges
            .iter()
            .any(|e| e.source_id == l1.id && e.source_handle == Handle::Loop
                && e.kind == EdgeKind::Loop));
        let c1 = nodes.iter().find(|n| n.name == "C1").unwrap();
        assert!(edges
            .iter()
            .any(|e| e.source_id == c1.id && e.source_handle == Handle::Then));
        assert!(edges
            .iter()
            .any(|e| e.source_id == c1.id && e.source_handle == Handle::Else));
    }

    #[tokio::test]
    async fn test_run_section_orders_and_unknown_flow_fails() {
        let repo = MemoryRepository::new();
        let ids = FakeIdSource::new();
        let workspace = crate::ident::IdSource::next_id(&ids);

        let text = r#"
run:
  - flow: B
  - flow: A
    depends_on: B
flows:
  - name: A
    steps:
      - request: {name: R1, url: "http://x"}
  - name: B
    steps:
      - request: {name: R1, url: "http://x"}
"#;
        let file = parse_flow_file(text).unwrap();
        let compiled = compile_flow_file(&repo, &ids, workspace, &file)
            .await
            .unwrap();
        assert_eq!(compiled[0].flow.name, "B");
        assert_eq!(compiled[1].flow.name, "A");
        assert_eq!(compiled[1].depends_on, vec!["B"]);

        let bad = r#"
run:
  - flow: missing
flows:
  - name: A
    steps:
      - request: {name: R1, url: "http://x"}
"#;
        let file = parse_flow_file(bad).unwrap();
        assert!(compile_flow_file(&repo, &ids, workspace, &file)
            .await
            .is_err());
    }

    #[test]
    fn test_parse_error_handling_values() {
        assert_eq!(parse_error_handling(None).unwrap(), ErrorHandling::Fail);
        assert_eq!(
            parse_error_handling(Some("IGNORE")).unwrap(),
            ErrorHandling::Ignore
        );
        assert_eq!(
            parse_error_handling(Some("break")).unwrap(),
            ErrorHandling::Break
        );
        assert!(parse_error_handling(Some("explode")).is_err());
    }
}
