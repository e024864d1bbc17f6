//! End-to-end flow runs against a local HTTP server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use devtools::flowfile::{compile_flow_file, execute_file, parse_flow_file};
use devtools::ident::{Id, IdSource, MonotonicIdSource};
use devtools::model::{FlowStatus, NodeExecution, NodeState};
use devtools::repo::{MemoryRepository, Repository};
use devtools::runner::record::decode_payload;
use devtools::runner::{FlowRunner, RunnerDeps};

#[derive(Clone)]
struct ServerState {
    flaky_calls: Arc<AtomicUsize>,
}

async fn spawn_server() -> SocketAddr {
    let state = ServerState {
        flaky_calls: Arc::new(AtomicUsize::new(0)),
    };

    let app = Router::new()
        .route("/users", get(|| async { Json(json!({"users": [{"id": 1}]})) }))
        .route("/login", post(|| async { Json(json!({"token": "T"})) }))
        .route(
            "/me",
            get(|headers: HeaderMap| async move {
                if headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    == Some("Bearer T")
                {
                    (StatusCode::OK, Json(json!({"me": "alice"})))
                } else {
                    (StatusCode::UNAUTHORIZED, Json(json!({"error": "denied"})))
                }
            }),
        )
        .route(
            "/flaky",
            get(|State(state): State<ServerState>| async move {
                let call = state.flaky_calls.fetch_add(1, Ordering::SeqCst);
                if call < 2 {
                    (StatusCode::OK, Json(json!({"ok": true})))
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"ok": false})))
                }
            }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"late": true}))
            }),
        )
        .route("/ping", get(|| async { Json(json!({"pong": true})) }))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

struct Harness {
    repo: Arc<MemoryRepository>,
    ids: MonotonicIdSource,
    workspace: Id,
}

impl Harness {
    fn new() -> Self {
        let ids = MonotonicIdSource::new();
        let workspace = ids.next_id();
        Self {
            repo: Arc::new(MemoryRepository::new()),
            ids,
            workspace,
        }
    }

    async fn compile(&self, yaml: &str) -> Vec<devtools::flowfile::CompiledFlow> {
        let file = parse_flow_file(yaml).unwrap();
        compile_flow_file(self.repo.as_ref(), &self.ids, self.workspace, &file)
            .await
            .unwrap()
    }

    async fn node_id(&self, flow: Id, name: &str) -> Id {
        self.repo
            .list_nodes(flow)
            .await
            .unwrap()
            .into_iter()
            .find(|n| n.name == name)
            .unwrap_or_else(|| panic!("node {name} not found"))
            .id
    }

    async fn executions(&self, node: Id) -> Vec<NodeExecution> {
        self.repo.list_executions(node).await.unwrap()
    }

    async fn output_tree(&self, node: Id) -> Value {
        let execution = self
            .repo
            .latest_main_execution(node)
            .await
            .unwrap()
            .expect("execution row");
        decode_payload(&execution.output_data, execution.output_data_compress_kind).unwrap()
    }
}

async fn run_single(harness: &Harness, flow: devtools::model::Flow) -> devtools::FlowRunSummary {
    let runner = FlowRunner::load(
        harness.repo.clone() as Arc<dyn Repository>,
        flow.id,
        RunnerDeps::default(),
    )
    .await
    .unwrap();
    runner.start().wait().await
}

#[tokio::test]
async fn single_get_request_succeeds() {
    let addr = spawn_server().await;
    let harness = Harness::new();
    let yaml = format!(
        r#"
flows:
  - name: F
    steps:
      - request:
          name: R1
          method: GET
          url: "http://{addr}/users"
"#
    );
    let flows = harness.compile(&yaml).await;
    let summary = run_single(&harness, flows[0].flow.clone()).await;

    assert_eq!(summary.status, FlowStatus::Success);
    let node = harness.node_id(flows[0].flow.id, "R1").await;
    let tree = harness.output_tree(node).await;
    let status = tree["R1"]["response"]["status"].as_u64().unwrap();
    assert!(status >= 200);
    assert_eq!(tree["R1"]["response"]["body"]["users"][0]["id"], json!(1));

    // exactly one exchange persisted for the request template
    let defs = harness.repo.list_request_defs(harness.workspace).await.unwrap();
    let def = defs.iter().find(|d| d.name == "R1").unwrap();
    assert_eq!(harness.repo.list_responses(def.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn chained_dependency_passes_token_on_the_wire() {
    let addr = spawn_server().await;
    let harness = Harness::new();
    let yaml = format!(
        r#"
flows:
  - name: F
    steps:
      - request:
          name: R1
          method: POST
          url: "http://{addr}/login"
      - request:
          name: R2
          method: GET
          url: "http://{addr}/me"
          headers:
            Authorization: "Bearer {{{{ R1.response.body.token }}}}"
"#
    );
    let flows = harness.compile(&yaml).await;
    let summary = run_single(&harness, flows[0].flow.clone()).await;

    assert_eq!(summary.status, FlowStatus::Success);
    let r2 = harness.node_id(flows[0].flow.id, "R2").await;
    let tree = harness.output_tree(r2).await;
    // the server only answers 200 when the substituted header arrived intact
    assert_eq!(tree["R2"]["response"]["status"], json!(200));
    assert_eq!(
        tree["R2"]["request"]["headers"]["Authorization"],
        json!("Bearer T")
    );
}

#[tokio::test]
async fn for_loop_breaks_on_failed_iteration() {
    let addr = spawn_server().await;
    let harness = Harness::new();
    let yaml = format!(
        r#"
flows:
  - name: F
    steps:
      - for:
          name: L1
          count: 5
          error_handling: break
          steps:
            - request:
                name: R
                url: "http://{addr}/flaky"
                asserts:
                  - "response.status < 300"
"#
    );
    let flows = harness.compile(&yaml).await;
    let summary = run_single(&harness, flows[0].flow.clone()).await;

    // the loop exits cleanly, so the flow still succeeds
    assert_eq!(summary.status, FlowStatus::Success);

    let loop_node = harness.node_id(flows[0].flow.id, "L1").await;
    let rows = harness.executions(loop_node).await;
    let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Iteration 0", "Iteration 1", "Iteration 2", "Error Summary", "L1"]
    );
    assert_eq!(rows[0].state, NodeState::Success);
    assert_eq!(rows[1].state, NodeState::Success);
    assert_eq!(rows[2].state, NodeState::Failed);
    assert_eq!(rows[2].iteration_context.as_ref().unwrap().iteration_path, vec![2]);
    // 3 iteration rows + error summary + the main row
    assert_eq!(rows.len(), 5);
}

#[tokio::test]
async fn foreach_iterates_object_in_insertion_order() {
    let addr = spawn_server().await;
    let harness = Harness::new();
    let yaml = format!(
        r#"
flows:
  - name: F
    variables:
      - name: users
        value: {{"a": 1, "b": 2}}
    steps:
      - foreach:
          name: E1
          items: "{{{{ users }}}}"
          steps:
            - request:
                name: R
                url: "http://{addr}/ping"
"#
    );
    let flows = harness.compile(&yaml).await;
    let summary = run_single(&harness, flows[0].flow.clone()).await;
    assert_eq!(summary.status, FlowStatus::Success);

    let each = harness.node_id(flows[0].flow.id, "E1").await;
    let rows = harness.executions(each).await;
    let iterations: Vec<&NodeExecution> = rows
        .iter()
        .filter(|r| r.name.starts_with("Iteration "))
        .collect();
    assert_eq!(iterations.len(), 2);

    let first = decode_payload(&iterations[0].input_data, iterations[0].input_data_compress_kind)
        .unwrap();
    assert_eq!(first, json!({"item": 1, "key": "a"}));
    let second = decode_payload(&iterations[1].input_data, iterations[1].input_data_compress_kind)
        .unwrap();
    assert_eq!(second, json!({"item": 2, "key": "b"}));
}

#[tokio::test]
async fn timeout_variable_marks_node_timed_out() {
    let addr = spawn_server().await;
    let harness = Harness::new();
    let yaml = format!(
        r#"
flows:
  - name: F
    variables:
      - name: timeout
        value: 1
    steps:
      - request:
          name: R1
          url: "http://{addr}/slow"
"#
    );
    let flows = harness.compile(&yaml).await;
    let started = std::time::Instant::now();
    let summary = run_single(&harness, flows[0].flow.clone()).await;

    assert_eq!(summary.status, FlowStatus::Failed);
    assert!(started.elapsed() < Duration::from_secs(4), "timeout did not cut the call short");
    let node = summary.nodes.iter().find(|n| n.name == "R1").unwrap();
    assert_eq!(node.state, NodeState::TimedOut);
    assert!(summary.error.as_ref().unwrap().contains("R1"));
}

#[tokio::test]
async fn multi_flow_dependency_skips_after_failure() {
    let harness = Harness::new();
    // connection refused: flow A fails hard without a server
    let yaml = r#"
run:
  - flow: A
  - flow: B
    depends_on: A
flows:
  - name: A
    steps:
      - request:
          name: R1
          url: "http://127.0.0.1:9/unreachable"
  - name: B
    steps:
      - request:
          name: R1
          url: "http://127.0.0.1:9/unreachable"
"#;
    let flows = harness.compile(yaml).await;
    let summaries = execute_file(
        harness.repo.clone() as Arc<dyn Repository>,
        RunnerDeps::default(),
        flows,
    )
    .await
    .unwrap();

    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].flow_name, "A");
    assert_eq!(summaries[0].status, FlowStatus::Failed);
    assert_eq!(summaries[1].flow_name, "B");
    assert_eq!(summaries[1].status, FlowStatus::Skipped);
    // B never ran a node
    assert!(summaries[1].nodes.is_empty());
    assert_eq!(devtools::report::exit_code(&summaries), 1);
}

#[tokio::test]
async fn condition_selects_then_branch_only() {
    let addr = spawn_server().await;
    let harness = Harness::new();
    let yaml = format!(
        r#"
flows:
  - name: F
    steps:
      - request:
          name: R1
          url: "http://{addr}/users"
      - if:
          name: C1
          condition: "R1.response.status == 200"
          then:
            - request:
                name: OnOk
                url: "http://{addr}/ping"
          else:
            - request:
                name: OnBad
                url: "http://{addr}/ping"
"#
    );
    let flows = harness.compile(&yaml).await;
    let summary = run_single(&harness, flows[0].flow.clone()).await;
    assert_eq!(summary.status, FlowStatus::Success);

    let ran: Vec<&str> = summary.nodes.iter().map(|n| n.name.as_str()).collect();
    assert!(ran.contains(&"OnOk"));
    assert!(!ran.contains(&"OnBad"));
}

#[tokio::test]
async fn cancellation_emits_terminal_canceled_status() {
    let addr = spawn_server().await;
    let harness = Harness::new();
    let yaml = format!(
        r#"
flows:
  - name: F
    steps:
      - request:
          name: R1
          url: "http://{addr}/slow"
"#
    );
    let flows = harness.compile(&yaml).await;
    let runner = FlowRunner::load(
        harness.repo.clone() as Arc<dyn Repository>,
        flows[0].flow.id,
        RunnerDeps::default(),
    )
    .await
    .unwrap();

    let mut handle = runner.start();
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.cancel.cancel();

    // terminal status must arrive promptly once in-flight nodes return
    let flow_event = tokio::time::timeout(Duration::from_secs(3), handle.flow_events.recv())
        .await
        .expect("terminal status within bound")
        .expect("flow status event");
    assert_eq!(flow_event.status, FlowStatus::Canceled);

    let summary = handle.join.await.unwrap();
    assert_eq!(summary.status, FlowStatus::Canceled);
    let node = summary.nodes.iter().find(|n| n.name == "R1").unwrap();
    assert_eq!(node.state, NodeState::Canceled);
}

#[tokio::test]
async fn node_status_events_are_ordered_per_node() {
    let addr = spawn_server().await;
    let harness = Harness::new();
    let yaml = format!(
        r#"
flows:
  - name: F
    steps:
      - request:
          name: R1
          url: "http://{addr}/ping"
      - request:
          name: R2
          url: "http://{addr}/ping"
"#
    );
    let flows = harness.compile(&yaml).await;
    let runner = FlowRunner::load(
        harness.repo.clone() as Arc<dyn Repository>,
        flows[0].flow.id,
        RunnerDeps::default(),
    )
    .await
    .unwrap();
    let handle = runner.start();
    let mut node_events = handle.node_events;
    let summary = handle.join.await.unwrap();
    assert_eq!(summary.status, FlowStatus::Success);

    // the runner never closes the channel; drain what was emitted
    let mut per_node: std::collections::HashMap<Id, Vec<NodeState>> =
        std::collections::HashMap::new();
    while let Ok(event) = node_events.try_recv() {
        per_node.entry(event.node_id).or_default().push(event.state);
    }

    assert_eq!(per_node.len(), 3); // Start, R1, R2
    for states in per_node.values() {
        assert_eq!(states.first(), Some(&NodeState::Running));
        assert_eq!(states.last(), Some(&NodeState::Success));
        assert_eq!(states.len(), 2);
    }
}
