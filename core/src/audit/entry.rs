use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event type names written to the audit log.
pub mod events {
    pub const ORCHESTRA_START: &str = "orchestra_start";
    pub const ORCHESTRA_END: &str = "orchestra_end";
    pub const PLANNING_START: &str = "planning_start";
    pub const PLAN_CREATION: &str = "plan_creation";
    pub const TASK_EXECUTION: &str = "task_execution";
    pub const REPORTING_START: &str = "reporting_start";
    pub const REPORT_GENERATION: &str = "report_generation";
    pub const TOOL_USAGE: &str = "tool_usage";
    pub const ERROR: &str = "error";
    pub const CHECKPOINT_START: &str = "checkpoint_start";
    pub const CHECKPOINT_COMPLETE: &str = "checkpoint_complete";
    pub const CHECKPOINT_WARNING: &str = "checkpoint_warning";
    pub const CHECKPOINT_ABORT: &str = "checkpoint_abort";
}

pub mod status {
    pub const STARTED: &str = "started";
    pub const COMPLETED: &str = "completed";
    pub const FAILED: &str = "failed";
    pub const WARNING: &str = "warning";
    pub const CANCELLED: &str = "cancelled";
}

/// One line of the audit log. Readers ignore fields they do not know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub trace_id: String,
    pub session_id: String,
    pub agent_name: String,
    pub event_type: String,
    pub status: String,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub input_data: Option<Value>,
    #[serde(default)]
    pub output_data: Option<Value>,
    #[serde(default)]
    pub tools_used: Option<Vec<String>>,
    #[serde(default)]
    pub error_info: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Builder for `StructuredLogger::log_event`.
#[derive(Debug, Clone, Default)]
pub struct LogEvent {
    pub agent_name: String,
    pub event_type: String,
    pub status: String,
    pub duration_ms: Option<u64>,
    pub input_data: Option<Value>,
    pub output_data: Option<Value>,
    pub tools_used: Option<Vec<String>>,
    pub error_info: Option<Value>,
    pub metadata: Option<Value>,
    pub trace_id: Option<String>,
}

impl LogEvent {
    pub fn new(
        agent_name: impl Into<String>,
        event_type: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            event_type: event_type.into(),
            status: status.into(),
            ..Self::default()
        }
    }

    pub fn duration_ms(mut self, duration_ms: Option<u64>) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn input(mut self, input: Value) -> Self {
        self.input_data = Some(input);
        self
    }

    pub fn output(mut self, output: Value) -> Self {
        self.output_data = Some(output);
        self
    }

    pub fn tools_used(mut self, tools: Vec<String>) -> Self {
        self.tools_used = (!tools.is_empty()).then_some(tools);
        self
    }

    pub fn error_info(mut self, error_info: Value) -> Self {
        self.error_info = Some(error_info);
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        let trace_id = trace_id.into();
        self.trace_id = (!trace_id.is_empty()).then_some(trace_id);
        self
    }
}
