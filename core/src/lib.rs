//! Execution core of a multi-agent task pipeline.
//!
//! A [`coordinator::Coordinator`] asks a planner for an ordered plan, runs
//! every subtask on its named worker through the
//! [`executor::ExecutionEngine`] and hands the recorded results to a
//! reporter. Every step is written to the JSONL audit trail in [`audit`].

pub mod audit;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod recorder;
pub mod util;

pub use audit::{AgentLogger, LogEntry, LogQuery, StructuredLogger};
pub use config::OrchestraConfig;
pub use coordinator::{Coordinator, Planner, Report, Reporter, RunReport};
pub use error::{ErrorCategory, ErrorInfo, ErrorSeverity, OrchestraError, WorkerError};
pub use executor::{ExecutionEngine, RunContext, Worker, WorkerRegistry};
pub use recorder::{Plan, Subtask, TaskRecorder, WorkerResult};
