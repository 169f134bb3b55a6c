use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{ErrorInfo, TaskFailure};
use crate::recorder::{Subtask, WorkerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

/// Lifecycle of one subtask within one run.
///
/// Transitions only move forward: Pending -> Running -> one terminal state,
/// or Pending -> Skipped. Retries stay in Running and bump `retry_count`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskExecution {
    /// 1-based position in the plan.
    pub position: usize,
    pub subtask: Subtask,
    pub status: TaskStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub trace_id: Option<String>,
    pub last_error: Option<ErrorInfo>,
}

impl TaskExecution {
    pub fn pending(position: usize, subtask: Subtask) -> Self {
        Self {
            position,
            subtask,
            status: TaskStatus::Pending,
            start_time: None,
            end_time: None,
            retry_count: 0,
            trace_id: None,
            last_error: None,
        }
    }

    pub fn duration_ms(&self) -> Option<u64> {
        let (start, end) = (self.start_time?, self.end_time?);
        Some((end - start).num_milliseconds().max(0) as u64)
    }

    pub(crate) fn start(&mut self, trace_id: &str) {
        if self.status == TaskStatus::Pending {
            self.status = TaskStatus::Running;
            self.start_time = Some(Utc::now());
            self.trace_id = Some(trace_id.to_string());
        }
    }

    pub(crate) fn complete(&mut self) {
        self.finish(TaskStatus::Completed);
    }

    pub(crate) fn fail(&mut self, info: ErrorInfo) {
        self.last_error = Some(info);
        self.finish(TaskStatus::Failed);
    }

    pub(crate) fn skip(&mut self) {
        if !self.status.is_terminal() {
            self.status = TaskStatus::Skipped;
            self.end_time = Some(Utc::now());
        }
    }

    fn finish(&mut self, status: TaskStatus) {
        if self.status.is_terminal() {
            return;
        }
        if self.start_time.is_none() {
            self.start_time = Some(Utc::now());
        }
        self.status = status;
        self.end_time = Some(Utc::now());
    }
}

/// Everything one engine call produced.
#[derive(Debug, Default)]
pub struct ExecutionOutcome {
    /// Successful results, in plan order.
    pub results: Vec<WorkerResult>,
    /// Unrecovered failures, in occurrence order.
    pub errors: Vec<TaskFailure>,
    /// Final state of every subtask of the plan.
    pub executions: Vec<TaskExecution>,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn execution(&self, position: usize) -> Option<&TaskExecution> {
        self.executions.iter().find(|e| e.position == position)
    }

    pub fn summary(&self) -> ExecutionSummary {
        let count = |status| self.executions.iter().filter(|e| e.status == status).count();
        let completed_durations: Vec<u64> = self
            .executions
            .iter()
            .filter(|e| e.status == TaskStatus::Completed)
            .filter_map(TaskExecution::duration_ms)
            .collect();
        let total = self.executions.len();
        let completed = count(TaskStatus::Completed);
        let total_duration_ms: u64 = completed_durations.iter().sum();

        ExecutionSummary {
            total,
            completed,
            failed: count(TaskStatus::Failed),
            skipped: count(TaskStatus::Skipped),
            pending: count(TaskStatus::Pending),
            success_rate: if total == 0 {
                0.0
            } else {
                completed as f64 / total as f64
            },
            total_duration_ms,
            average_duration_ms: if completed_durations.is_empty() {
                0
            } else {
                total_duration_ms / completed_durations.len() as u64
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pending: usize,
    pub success_rate: f64,
    pub total_duration_ms: u64,
    pub average_duration_ms: u64,
}

/// Progress forwarded from a streaming worker.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub position: usize,
    pub agent_name: String,
    pub trace_id: String,
    pub attempt: u32,
    pub payload: serde_json::Value,
}
