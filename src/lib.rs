//! # devtools — API-testing and flow automation engine
//!
//! `devtools` executes directed flows of reusable HTTP requests. Flows can
//! branch on conditions, iterate with counted and collection loops, and
//! run embedded scripts through a remote evaluator. A flow runner walks
//! the node graph, propagates request/response data between steps via a
//! hierarchical variable namespace, records every node invocation (and
//! every loop iteration) as a persisted execution row, and reports
//! per-node status for CI consumption.
//!
//! The crate is organised leaves-first:
//!
//! - [`ident`] — time-ordered 128-bit entity ids.
//! - [`namespace`] — the variable namespace, `{{ }}` substitution, and
//!   read/write tracking.
//! - [`expr`] — the boolean condition mini-language.
//! - [`depfind`] — value→producer indexing for importers.
//! - [`model`] — entities: flows, nodes, edges, variables, request
//!   templates, response records, execution rows.
//! - [`edges`] / [`graph`] — typed adjacency and graph validation.
//! - [`repo`] — the narrow repository facade plus an in-memory store.
//! - [`nodes`] — the six node kinds behind one execution contract.
//! - [`runner`] — the flow runner, status events, execution recorder and
//!   response persister.
//! - [`reference`] — upstream-output completion trees and value lookup.
//! - [`flowfile`] — the YAML flow file and its compiler.
//! - [`import`] / [`export`] — curl, Postman v2 and HAR 1.2 translators.
//! - [`report`] — console, JSON and JUnit reporters.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use devtools::flowfile::{compile_flow_file, execute_file, parse_flow_file};
//! use devtools::ident::{IdSource, MonotonicIdSource};
//! use devtools::repo::MemoryRepository;
//! use devtools::runner::RunnerDeps;
//!
//! #[tokio::main]
//! async fn main() {
//!     let text = std::fs::read_to_string("flows.yaml").unwrap();
//!     let file = parse_flow_file(&text).unwrap();
//!     let repo = Arc::new(MemoryRepository::new());
//!     let ids = MonotonicIdSource::new();
//!     let workspace = ids.next_id();
//!     let flows = compile_flow_file(repo.as_ref(), &ids, workspace, &file)
//!         .await
//!         .unwrap();
//!     let summaries = execute_file(repo, RunnerDeps::default(), flows).await.unwrap();
//!     for summary in summaries {
//!         println!("{}: {:?}", summary.flow_name, summary.status);
//!     }
//! }
//! ```

pub mod config;
pub mod depfind;
pub mod edges;
pub mod error;
pub mod export;
pub mod expr;
pub mod flowfile;
pub mod graph;
pub mod httpclient;
pub mod ident;
pub mod import;
pub mod jsclient;
pub mod model;
pub mod namespace;
pub mod nodes;
pub mod reference;
pub mod repo;
pub mod report;
pub mod runner;

pub use error::{FlowError, FlowResult, NodeError, RepoError};
pub use ident::{FakeIdSource, Id, IdSource, MonotonicIdSource};
pub use model::{FlowRunSummary, FlowStatus, NodeState};
pub use namespace::{Namespace, NamespaceTracker, SharedNamespace};
pub use reference::ReferenceResolver;
pub use repo::{MemoryRepository, Repository};
pub use runner::{FlowRunner, RunHandle, RunnerDeps};
