//! JUnit XML reporter. One testsuite per flow, one testcase per node run.

use std::fmt::Write;

use crate::model::{FlowRunSummary, NodeState};

pub fn to_junit_report(summaries: &[FlowRunSummary]) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<testsuites>");
    for summary in summaries {
        let failures = summary
            .nodes
            .iter()
            .filter(|n| {
                matches!(
                    n.state,
                    NodeState::Failed | NodeState::TimedOut | NodeState::Canceled
                )
            })
            .count();
        let _ = write!(
            out,
            "<testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" time=\"{:.3}\">",
            escape(&summary.flow_name),
            summary.nodes.len(),
            failures,
            summary.duration_ms as f64 / 1000.0,
        );
        for node in &summary.nodes {
            let _ = write!(
                out,
                "<testcase name=\"{}\" time=\"{:.3}\">",
                escape(&node.name),
                node.duration_ms as f64 / 1000.0,
            );
            if let Some(error) = &node.error {
                let _ = write!(
                    out,
                    "<failure message=\"{}\" type=\"{:?}\">{}</failure>",
                    escape(error),
                    node.state,
                    escape(error),
                );
            }
            out.push_str("</testcase>");
        }
        out.push_str("</testsuite>");
    }
    out.push_str("</testsuites>");
    out
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
