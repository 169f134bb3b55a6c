//! Persisted JSONL audit trail: one file per day, correlated by session and
//! trace ids.

mod agent;
mod entry;
mod files;
mod logger;
mod query;
mod trace_id;

pub use agent::{AgentLogger, SessionLog, COORDINATOR_AGENT};
pub use entry::{events, status, LogEntry, LogEvent};
pub use files::{all_log_files, day_segments, day_stamp, segment_path, FILE_EXTENSION, FILE_PREFIX};
pub use logger::{LoggerOptions, StructuredLogger};
pub use query::{read_entries, summarize, LogQuery, SessionSummary};
pub use trace_id::TraceIdGenerator;
