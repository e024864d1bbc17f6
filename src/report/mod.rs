//! Run reporters: console summary, JSON, JUnit XML.

mod json;
mod junit;

pub use json::to_json_report;
pub use junit::to_junit_report;

use std::io::Write;

use crate::model::{FlowRunSummary, FlowStatus};

/// Where a reporter writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportTarget {
    Console,
    Json(std::path::PathBuf),
    Junit(std::path::PathBuf),
}

impl ReportTarget {
    /// Parse a `--report format[:path]` argument.
    pub fn parse(spec: &str) -> Result<Self, String> {
        let (format, path) = match spec.split_once(':') {
            Some((format, path)) => (format, Some(path)),
            None => (spec, None),
        };
        match (format, path) {
            ("console", _) => Ok(ReportTarget::Console),
            ("json", Some(path)) => Ok(ReportTarget::Json(path.into())),
            ("junit", Some(path)) => Ok(ReportTarget::Junit(path.into())),
            ("json", None) | ("junit", None) => {
                Err(format!("report format {format} requires a path"))
            }
            (other, _) => Err(format!("unknown report format: {other}")),
        }
    }
}

/// Human-readable summary table on the given writer.
pub fn write_console_report<W: Write>(out: &mut W, summaries: &[FlowRunSummary]) -> std::io::Result<()> {
    writeln!(out, "{:<24} {:<10} {:>10}  {}", "FLOW", "STATUS", "TIME", "ERROR")?;
    for summary in summaries {
        writeln!(
            out,
            "{:<24} {:<10} {:>8}ms  {}",
            summary.flow_name,
            status_label(summary.status),
            summary.duration_ms,
            summary.error.as_deref().unwrap_or("-"),
        )?;
        for node in &summary.nodes {
            writeln!(
                out,
                "  {:<22} {:<10} {:>8}ms  {}",
                node.name,
                format!("{:?}", node.state),
                node.duration_ms,
                node.error.as_deref().unwrap_or("-"),
            )?;
        }
    }
    let failed = summaries
        .iter()
        .filter(|s| s.status == FlowStatus::Failed)
        .count();
    writeln!(
        out,
        "{} flows, {} failed",
        summaries.len(),
        failed
    )?;
    Ok(())
}

pub(crate) fn status_label(status: FlowStatus) -> &'static str {
    match status {
        FlowStatus::Success => "Success",
        FlowStatus::Failed => "Failed",
        FlowStatus::Canceled => "Canceled",
        FlowStatus::Skipped => "Skipped",
    }
}

/// Exit code for the CLI: zero only when every flow succeeded.
pub fn exit_code(summaries: &[FlowRunSummary]) -> i32 {
    let all_ok = summaries
        .iter()
        .all(|s| s.status == FlowStatus::Success);
    if all_ok {
        0
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::{FakeIdSource, IdSource};

    pub(crate) fn sample_summaries() -> Vec<FlowRunSummary> {
        let ids = FakeIdSource::new();
        vec![
            FlowRunSummary {
                flow_id: ids.next_id(),
                flow_name: "A".into(),
                started_at: chrono::Utc::now(),
                duration_ms: 120,
                status: FlowStatus::Failed,
                error: Some("node R1: request failed: boom".into()),
                nodes: vec![crate::model::NodeRunSummary {
                    node_id: ids.next_id(),
                    execution_id: ids.next_id(),
                    name: "R1".into(),
                    state: crate::model::NodeState::Failed,
                    duration_ms: 100,
                    error: Some("request failed: boom".into()),
                    iteration_context: None,
                }],
            },
            FlowRunSummary {
                flow_id: ids.next_id(),
                flow_name: "B".into(),
                started_at: chrono::Utc::now(),
                duration_ms: 0,
                status: FlowStatus::Skipped,
                error: Some("dependency A did not succeed".into()),
                nodes: Vec::new(),
            },
        ]
    }

    #[test]
    fn test_parse_report_targets() {
        assert_eq!(ReportTarget::parse("console").unwrap(), ReportTarget::Console);
        assert_eq!(
            ReportTarget::parse("json:out.json").unwrap(),
            ReportTarget::Json("out.json".into())
        );
        assert_eq!(
            ReportTarget::parse("junit:out.xml").unwrap(),
            ReportTarget::Junit("out.xml".into())
        );
        assert!(ReportTarget::parse("json").is_err());
        assert!(ReportTarget::parse("yaml:x").is_err());
    }

    #[test]
    fn test_console_report_renders() {
        let mut buffer = Vec::new();
        write_console_report(&mut buffer, &sample_summaries()).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("A"));
        assert!(text.contains("Failed"));
        assert!(text.contains("Skipped"));
        assert!(text.contains("2 flows, 1 failed"));
    }

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code(&sample_summaries()), 1);
        assert_eq!(exit_code(&[]), 0);
    }
}
