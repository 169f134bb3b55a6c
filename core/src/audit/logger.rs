use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{Local, NaiveDate, Utc};
use uuid::Uuid;

use crate::config::LoggingConfig;

use super::entry::{status, LogEntry, LogEvent};
use super::files::{keep_newest, remove_older_than, segment_path};
use super::query::{read_entries, LogQuery};
use super::trace_id::TraceIdGenerator;

#[derive(Debug, Clone)]
pub struct LoggerOptions {
    pub directory: PathBuf,
    pub enabled: bool,
    /// Echo every entry through `tracing`.
    pub console: bool,
    pub include_stack_trace: bool,
    pub log_tool_calls: bool,
    pub log_performance: bool,
    /// Size at which the current day file rolls over to a new segment.
    pub max_file_bytes: u64,
    pub max_files: usize,
}

impl From<&LoggingConfig> for LoggerOptions {
    fn from(cfg: &LoggingConfig) -> Self {
        Self {
            directory: cfg.directory_path(),
            enabled: cfg.enabled,
            console: cfg.console,
            include_stack_trace: cfg.include_stack_trace,
            log_tool_calls: cfg.log_tool_calls,
            log_performance: cfg.log_performance,
            max_file_bytes: cfg.max_file_bytes(),
            max_files: cfg.max_files.max(1) as usize,
        }
    }
}

impl LoggerOptions {
    pub fn in_dir(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::from(&LoggingConfig::default())
        }
    }
}

struct WriterState {
    day: Option<NaiveDate>,
    segment: u32,
}

/// Append-only, session-correlated JSONL audit log.
///
/// One instance is created per process (or per test) and shared by reference;
/// its `session_id` tags every entry it writes. All appends go through one
/// mutex, so concurrent writers never interleave partial lines.
pub struct StructuredLogger {
    options: LoggerOptions,
    session_id: String,
    trace_ids: TraceIdGenerator,
    writer: Mutex<WriterState>,
}

impl StructuredLogger {
    pub fn new(options: LoggerOptions) -> Self {
        Self::with_session_id(options, Uuid::new_v4().to_string())
    }

    pub fn with_session_id(options: LoggerOptions, session_id: impl Into<String>) -> Self {
        if options.enabled {
            if let Err(err) = std::fs::create_dir_all(&options.directory) {
                tracing::warn!(
                    dir = %options.directory.display(),
                    error = %err,
                    "failed to create audit log directory"
                );
            }
        }
        Self {
            options,
            session_id: session_id.into(),
            trace_ids: TraceIdGenerator::new(),
            writer: Mutex::new(WriterState {
                day: None,
                segment: 0,
            }),
        }
    }

    pub fn from_config(cfg: &LoggingConfig) -> Self {
        Self::new(LoggerOptions::from(cfg))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn options(&self) -> &LoggerOptions {
        &self.options
    }

    pub fn generate_trace_id(&self, prefix: &str) -> String {
        self.trace_ids.generate(prefix)
    }

    /// Segment currently receiving today's entries.
    pub fn current_log_file(&self) -> PathBuf {
        let today = Local::now().date_naive();
        let state = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let segment = if state.day == Some(today) {
            state.segment
        } else {
            0
        };
        segment_path(&self.options.directory, today, segment)
    }

    /// Appends one entry and returns its trace id (generated when absent).
    /// Write failures are reported through `tracing` and never returned.
    pub fn log_event(&self, event: LogEvent) -> String {
        let trace_id = event
            .trace_id
            .clone()
            .unwrap_or_else(|| self.generate_trace_id("agent"));

        if !self.options.enabled {
            return trace_id;
        }

        let LogEvent {
            agent_name,
            event_type,
            status,
            duration_ms,
            input_data,
            output_data,
            tools_used,
            error_info,
            metadata,
            ..
        } = event;

        let mut state = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let entry = LogEntry {
            timestamp: Utc::now(),
            trace_id: trace_id.clone(),
            session_id: self.session_id.clone(),
            agent_name,
            event_type,
            status,
            duration_ms,
            input_data,
            output_data,
            tools_used,
            error_info,
            metadata: Some(metadata.unwrap_or_else(|| serde_json::json!({}))),
        };

        if let Err(err) = self.append(&mut state, &entry) {
            tracing::error!(
                dir = %self.options.directory.display(),
                error = %err,
                "failed to write audit log entry"
            );
        }
        drop(state);

        if self.options.console {
            echo(&entry);
        }
        trace_id
    }

    fn append(&self, state: &mut WriterState, entry: &LogEntry) -> std::io::Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let today = entry.timestamp.with_timezone(&Local).date_naive();
        if state.day != Some(today) {
            state.day = Some(today);
            state.segment = 0;
        }

        loop {
            let path = segment_path(&self.options.directory, today, state.segment);
            let len = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            if len > 0 && len.saturating_add(line.len() as u64) > self.options.max_file_bytes {
                state.segment += 1;
                continue;
            }

            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            // Single write of a whole line on an O_APPEND handle.
            file.write_all(line.as_bytes())?;
            return Ok(());
        }
    }

    /// Entries of the current session in today's files, oldest first.
    pub fn get_session_logs(&self, limit: usize) -> Vec<LogEntry> {
        self.query(&LogQuery::session(self.session_id.clone()).with_limit(limit))
    }

    /// Entries of one trace in today's files, oldest first.
    pub fn get_trace_logs(&self, trace_id: &str) -> Vec<LogEntry> {
        self.query(&LogQuery::trace(trace_id))
    }

    pub fn query(&self, query: &LogQuery) -> Vec<LogEntry> {
        let day = query.date.unwrap_or_else(|| Local::now().date_naive());
        match read_entries(&self.options.directory, day, query) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::error!(error = %err, "failed to read audit log");
                Vec::new()
            }
        }
    }

    /// Deletes log files last modified more than `days` days ago.
    pub fn clear_old_logs(&self, days: u64) -> usize {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        remove_older_than(&self.options.directory, days)
    }

    /// Keeps only the newest `max_files` log files.
    pub fn prune_files(&self) -> usize {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        keep_newest(&self.options.directory, self.options.max_files)
    }
}

fn echo(entry: &LogEntry) {
    let duration = entry
        .duration_ms
        .map(|ms| format!(" ({ms}ms)"))
        .unwrap_or_default();
    match entry.status.as_str() {
        status::FAILED => {
            let message = entry
                .error_info
                .as_ref()
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            tracing::error!(
                target: "orchestra.audit",
                trace_id = %entry.trace_id,
                "[{}] {} - {} - Error: {}",
                entry.agent_name,
                entry.event_type,
                entry.status,
                message
            );
        }
        status::WARNING | status::CANCELLED => tracing::warn!(
            target: "orchestra.audit",
            trace_id = %entry.trace_id,
            "[{}] {} - {}{}",
            entry.agent_name,
            entry.event_type,
            entry.status,
            duration
        ),
        _ => tracing::info!(
            target: "orchestra.audit",
            trace_id = %entry.trace_id,
            "[{}] {} - {}{}",
            entry.agent_name,
            entry.event_type,
            entry.status,
            duration
        ),
    }
}
