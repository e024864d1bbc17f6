//! Multi-flow execution of a compiled flow file.
//!
//! Flows run in the declared order; a flow whose dependency did not
//! succeed is reported as skipped, never started.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use super::CompiledFlow;
use crate::error::FlowResult;
use crate::model::{FlowRunSummary, FlowStatus};
use crate::repo::Repository;
use crate::runner::{FlowRunner, RunnerDeps};

/// Execute the compiled flows; returns one summary per flow in run order.
pub async fn execute_file(
    repo: Arc<dyn Repository>,
    deps: RunnerDeps,
    flows: Vec<CompiledFlow>,
) -> FlowResult<Vec<FlowRunSummary>> {
    let mut statuses: HashMap<String, FlowStatus> = HashMap::new();
    let mut summaries = Vec::with_capacity(flows.len());

    for entry in flows {
        let failed_dep = entry
            .depends_on
            .iter()
            .find(|dep| statuses.get(dep.as_str()) != Some(&FlowStatus::Success));

        if let Some(dep) = failed_dep {
            info!(flow = %entry.flow.name, dependency = %dep, "skipping flow, dependency did not succeed");
            statuses.insert(entry.flow.name.clone(), FlowStatus::Skipped);
            summaries.push(FlowRunSummary {
                flow_id: entry.flow.id,
                flow_name: entry.flow.name.clone(),
                started_at: Utc::now(),
                duration_ms: 0,
                status: FlowStatus::Skipped,
                error: Some(format!("dependency {dep} did not succeed")),
                nodes: Vec::new(),
            });
            continue;
        }

        let runner = FlowRunner::load(Arc::clone(&repo), entry.flow.id, deps.clone()).await?;
        let handle = runner.start();
        let summary = handle.wait().await;
        statuses.insert(entry.flow.name.clone(), summary.status);
        summaries.push(summary);
    }

    Ok(summaries)
}
