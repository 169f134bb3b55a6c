use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;

use super::entry::{events, status, LogEntry};
use super::files::day_segments;

/// Filter over one day of audit entries. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub session_id: Option<String>,
    pub trace_id: Option<String>,
    pub event_type: Option<String>,
    /// Defaults to today (local time).
    pub date: Option<NaiveDate>,
    pub limit: Option<usize>,
}

impl LogQuery {
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    pub fn trace(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: Some(trace_id.into()),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        fn eq(filter: &Option<String>, value: &str) -> bool {
            filter.as_deref().map(|f| f == value).unwrap_or(true)
        }
        eq(&self.session_id, &entry.session_id)
            && eq(&self.trace_id, &entry.trace_id)
            && eq(&self.event_type, &entry.event_type)
    }
}

/// Reads all segments of `day` in file order and returns the matching entries.
/// Lines that do not parse are skipped.
pub fn read_entries(dir: &Path, day: NaiveDate, query: &LogQuery) -> std::io::Result<Vec<LogEntry>> {
    let limit = query.limit.unwrap_or(usize::MAX);
    let mut out = Vec::new();
    if limit == 0 {
        return Ok(out);
    }

    for path in day_segments(dir, day) {
        let file = std::fs::File::open(&path)?;
        for line in BufReader::new(file).lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Ok(entry) = serde_json::from_str::<LogEntry>(line) else {
                continue;
            };
            if query.matches(&entry) {
                out.push(entry);
                if out.len() >= limit {
                    return Ok(out);
                }
            }
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub total_events: usize,
    pub agent_events: BTreeMap<String, usize>,
    pub total_duration_ms: u64,
    pub error_count: usize,
    pub tool_usage: BTreeMap<String, usize>,
}

pub fn summarize(session_id: &str, entries: &[LogEntry]) -> SessionSummary {
    let mut summary = SessionSummary {
        session_id: session_id.to_string(),
        total_events: entries.len(),
        ..SessionSummary::default()
    };

    for entry in entries {
        *summary
            .agent_events
            .entry(entry.agent_name.clone())
            .or_default() += 1;
        summary.total_duration_ms += entry.duration_ms.unwrap_or(0);
        if entry.status == status::FAILED {
            summary.error_count += 1;
        }
        if entry.event_type == events::TOOL_USAGE {
            let tool = entry
                .metadata
                .as_ref()
                .and_then(|m| m.get("tool_name"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            *summary.tool_usage.entry(tool.to_string()).or_default() += 1;
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::files::segment_path;
    use chrono::Utc;

    fn entry(session: &str, trace: &str, agent: &str, event_type: &str, st: &str) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            trace_id: trace.into(),
            session_id: session.into(),
            agent_name: agent.into(),
            event_type: event_type.into(),
            status: st.into(),
            duration_ms: Some(10),
            input_data: None,
            output_data: None,
            tools_used: None,
            error_info: None,
            metadata: None,
        }
    }

    #[test]
    fn reads_across_segments_and_skips_garbage() {
        let tmp = tempfile::tempdir().unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let line = |e: &LogEntry| serde_json::to_string(e).unwrap() + "\n";

        let first = line(&entry("s1", "t1", "A", "task_execution", "started"))
            + "not json\n\n"
            + &line(&entry("s2", "t2", "B", "task_execution", "started"));
        std::fs::write(segment_path(tmp.path(), day, 0), first).unwrap();
        std::fs::write(
            segment_path(tmp.path(), day, 1),
            line(&entry("s1", "t1", "A", "task_execution", "completed")),
        )
        .unwrap();

        let s1 = read_entries(tmp.path(), day, &LogQuery::session("s1")).unwrap();
        assert_eq!(s1.len(), 2);
        assert_eq!(s1[0].status, "started");
        assert_eq!(s1[1].status, "completed");

        let limited = read_entries(tmp.path(), day, &LogQuery::session("s1").with_limit(1)).unwrap();
        assert_eq!(limited.len(), 1);

        let t2 = read_entries(tmp.path(), day, &LogQuery::trace("t2")).unwrap();
        assert_eq!(t2.len(), 1);
        assert_eq!(t2[0].agent_name, "B");
    }

    #[test]
    fn missing_day_reads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert!(read_entries(tmp.path(), day, &LogQuery::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn summary_counts_agents_errors_and_tools() {
        let mut tool = entry("s", "t", "Worker", events::TOOL_USAGE, status::COMPLETED);
        tool.metadata = Some(serde_json::json!({ "tool_name": "fetch_quotes" }));
        let entries = vec![
            entry("s", "t", "Planner", events::PLAN_CREATION, status::COMPLETED),
            entry("s", "t", "Worker", events::ERROR, status::FAILED),
            tool,
        ];

        let summary = summarize("s", &entries);
        assert_eq!(summary.total_events, 3);
        assert_eq!(summary.agent_events["Worker"], 2);
        assert_eq!(summary.total_duration_ms, 30);
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.tool_usage["fetch_quotes"], 1);
    }
}
