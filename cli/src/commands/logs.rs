use std::io::Write;

use chrono::{Local, NaiveDate};
use orchestra_core::audit::{read_entries, summarize, LogEntry, LogQuery, StructuredLogger};
use orchestra_core::config::OrchestraConfig;

use crate::error::CliError;

use super::cli::{LogsCommand, QueryArgs};

pub fn handle(cmd: LogsCommand, cfg: &OrchestraConfig) -> Result<i32, CliError> {
    let dir = cfg.logging.directory_path();
    match cmd {
        LogsCommand::Query(args) => {
            let day = args.date.unwrap_or_else(today);
            let entries = read_entries(&dir, day, &to_query(&args))?;
            let mut out = std::io::stdout().lock();
            for entry in &entries {
                if args.json {
                    let line = serde_json::to_string(entry).map_err(anyhow::Error::from)?;
                    writeln!(out, "{line}")?;
                } else {
                    writeln!(out, "{}", format_entry(entry))?;
                }
            }
            tracing::debug!(count = entries.len(), day = %day, "log query finished");
            Ok(0)
        }
        LogsCommand::Summary { session, date } => {
            let day = date.unwrap_or_else(today);
            let entries = read_entries(&dir, day, &LogQuery::session(session.clone()))?;
            let summary = summarize(&session, &entries);
            let text = serde_json::to_string_pretty(&summary).map_err(anyhow::Error::from)?;
            println!("{text}");
            Ok(0)
        }
        LogsCommand::Clean { days } => {
            let days = days.unwrap_or(cfg.monitoring.metrics_retention_days.max(0) as u64);
            let logger = StructuredLogger::from_config(&cfg.logging);
            let expired = logger.clear_old_logs(days);
            let pruned = logger.prune_files();
            println!("removed {expired} expired and {pruned} excess log file(s)");
            Ok(0)
        }
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn to_query(args: &QueryArgs) -> LogQuery {
    LogQuery {
        session_id: args.session.clone(),
        trace_id: args.trace.clone(),
        event_type: args.event_type.clone(),
        date: args.date,
        limit: args.limit,
    }
}

fn format_entry(entry: &LogEntry) -> String {
    let mut line = format!(
        "{} [{}] {} - {}",
        entry.timestamp.with_timezone(&Local).format("%H:%M:%S%.3f"),
        entry.agent_name,
        entry.event_type,
        entry.status
    );
    if let Some(ms) = entry.duration_ms {
        line.push_str(&format!(" ({ms}ms)"));
    }
    if let Some(message) = entry
        .error_info
        .as_ref()
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
    {
        line.push_str(&format!(" error={message:?}"));
    }
    line.push_str(&format!(" trace={}", entry.trace_id));
    line
}
