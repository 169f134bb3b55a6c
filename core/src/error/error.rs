use std::fmt;

use thiserror::Error;

use super::classify::ErrorInfo;
use super::worker::WorkerError;

/// Pipeline stage in which a failure surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Planning,
    Execution,
    Reporting,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Execution => "execution",
            Self::Reporting => "reporting",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Precondition violations of the task recorder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error("a plan has already been set")]
    PlanAlreadySet,

    #[error("no plan has been set")]
    MissingPlan,

    #[error("subtask for agent '{agent_name}' is not part of the plan: {task}")]
    SubtaskNotInPlan { agent_name: String, task: String },

    #[error("final output already set; the recorder is read-only")]
    Finalized,
}

/// A subtask that reached the Failed state.
#[derive(Error, Debug)]
#[error("subtask {position} ({agent_name}) failed after {attempts} attempt(s): {source}")]
pub struct TaskFailure {
    /// 1-based position in the plan.
    pub position: usize,
    pub agent_name: String,
    pub task: String,
    pub trace_id: String,
    pub attempts: u32,
    pub info: ErrorInfo,
    #[source]
    pub source: WorkerError,
}

impl TaskFailure {
    pub fn is_critical(&self) -> bool {
        self.source.is_critical()
    }
}

#[derive(Error, Debug)]
pub enum OrchestraError {
    #[error("plan references unknown workers: {}", .0.join(", "))]
    UnknownWorkers(Vec<String>),

    #[error("recorder error: {0}")]
    Recorder(#[from] RecorderError),

    #[error(transparent)]
    Task(#[from] TaskFailure),

    #[error(
        "checkpoint batch {batch} (tasks {range}) aborted with {} error(s); {completed} task(s) completed before the abort",
        .failures.len()
    )]
    CheckpointAborted {
        batch: usize,
        range: String,
        completed: usize,
        failures: Vec<TaskFailure>,
    },

    #[error("planner failed: {0}")]
    Planner(#[source] anyhow::Error),

    #[error("reporter failed: {0}")]
    Reporter(#[source] anyhow::Error),

    #[error("{stage} stage failed (trace {trace_id}, input {input_preview:?}): {source}")]
    Stage {
        stage: Stage,
        trace_id: String,
        input_preview: String,
        #[source]
        source: Box<OrchestraError>,
    },

    #[error("config error: {0}")]
    Config(String),
}

impl OrchestraError {
    /// Short type name recorded as `error_info.type`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownWorkers(_) => "unknown_workers",
            Self::Recorder(_) => "recorder",
            Self::Task(failure) => failure.source.kind(),
            Self::CheckpointAborted { .. } => "checkpoint_aborted",
            Self::Planner(_) => "planner",
            Self::Reporter(_) => "reporter",
            Self::Stage { source, .. } => source.kind(),
            Self::Config(_) => "config",
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_error_keeps_source_chain() {
        let err = OrchestraError::Stage {
            stage: Stage::Planning,
            trace_id: "orchestra_000001_deadbeef".into(),
            input_preview: "analyse".into(),
            source: Box::new(OrchestraError::UnknownWorkers(vec!["Ghost".into()])),
        };
        assert_eq!(err.stage(), Some(Stage::Planning));
        assert_eq!(err.kind(), "unknown_workers");
        let text = err.to_string();
        assert!(text.starts_with("planning stage failed"));
        assert!(text.contains("Ghost"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn planner_errors_wrap_anyhow() {
        let err = OrchestraError::Planner(anyhow::anyhow!("model refused"));
        assert_eq!(err.to_string(), "planner failed: model refused");
    }
}
