//! JSON reporter: one array entry per flow.

use serde_json::{json, Value};

use crate::model::FlowRunSummary;

pub fn to_json_report(summaries: &[FlowRunSummary]) -> Value {
    Value::Array(
        summaries
            .iter()
            .map(|summary| {
                json!({
                    "flow_id": summary.flow_id,
                    "flow_name": summary.flow_name,
                    "started_at": summary.started_at.to_rfc3339(),
                    "duration": summary.duration_ms,
                    "status": summary.status,
                    "error": summary.error,
                    "nodes": summary
                        .nodes
                        .iter()
                        .map(|node| {
                            json!({
                                "node_id": node.node_id,
                                "execution_id": node.execution_id,
                                "name": node.name,
                                "state": node.state,
                                "duration": node.duration_ms,
                                "error": node.error,
                                "iteration_context": node.iteration_context,
                            })
                        })
                        .collect::<Vec<_>>(),
                })
            })
            .collect(),
    )
}
