use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RecorderError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subtask {
    pub agent_name: String,
    pub task: String,
}

impl Subtask {
    pub fn new(agent_name: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            task: task.into(),
        }
    }
}

/// Planner output. `todo` order is the execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub analysis: String,
    #[serde(default)]
    pub todo: Vec<Subtask>,
}

impl Plan {
    pub fn new(analysis: impl Into<String>, todo: Vec<Subtask>) -> Self {
        Self {
            analysis: analysis.into(),
            todo,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub subtask: Subtask,
    pub output: String,
    /// Worker-specific record of what happened; opaque to the engine.
    #[serde(default)]
    pub trajectory: Value,
}

impl WorkerResult {
    pub fn new(subtask: Subtask, output: impl Into<String>) -> Self {
        Self {
            subtask,
            output: output.into(),
            trajectory: Value::Null,
        }
    }

    pub fn with_trajectory(mut self, trajectory: Value) -> Self {
        self.trajectory = trajectory;
        self
    }

    /// Tool names found in `trajectory.trajectory[*].tool_calls[*].function`.
    /// Each entry of `tool_calls` may carry the name directly or as
    /// `function.name`.
    pub fn tools_used(&self) -> Vec<String> {
        let Some(steps) = self.trajectory.get("trajectory").and_then(Value::as_array) else {
            return Vec::new();
        };
        let mut tools = Vec::new();
        for call in steps
            .iter()
            .filter_map(|step| step.get("tool_calls").and_then(Value::as_array))
            .flatten()
        {
            let name = match call.get("function") {
                Some(Value::String(name)) => Some(name.as_str()),
                Some(function) => function.get("name").and_then(Value::as_str),
                None => None,
            };
            if let Some(name) = name {
                if !tools.iter().any(|t| t == name) {
                    tools.push(name.to_string());
                }
            }
        }
        tools
    }
}

/// In-memory record of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecorder {
    task: String,
    trace_id: String,
    plan: Option<Plan>,
    task_records: Vec<WorkerResult>,
    final_output: Option<String>,
}

impl TaskRecorder {
    pub fn new(task: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            trace_id: trace_id.into(),
            plan: None,
            task_records: Vec::new(),
            final_output: None,
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    pub fn task_records(&self) -> &[WorkerResult] {
        &self.task_records
    }

    pub fn final_output(&self) -> Option<&str> {
        self.final_output.as_deref()
    }

    pub fn is_finalized(&self) -> bool {
        self.final_output.is_some()
    }

    pub fn set_plan(&mut self, plan: Plan) -> Result<(), RecorderError> {
        if self.is_finalized() {
            return Err(RecorderError::Finalized);
        }
        if self.plan.is_some() {
            return Err(RecorderError::PlanAlreadySet);
        }
        self.plan = Some(plan);
        Ok(())
    }

    pub fn add_worker_result(&mut self, result: WorkerResult) -> Result<(), RecorderError> {
        if self.is_finalized() {
            return Err(RecorderError::Finalized);
        }
        let plan = self.plan.as_ref().ok_or(RecorderError::MissingPlan)?;
        if !plan.todo.contains(&result.subtask) {
            return Err(RecorderError::SubtaskNotInPlan {
                agent_name: result.subtask.agent_name,
                task: result.subtask.task,
            });
        }
        self.task_records.push(result);
        Ok(())
    }

    pub fn set_final_output(&mut self, output: impl Into<String>) -> Result<(), RecorderError> {
        if self.plan.is_none() {
            return Err(RecorderError::MissingPlan);
        }
        if self.is_finalized() {
            return Err(RecorderError::Finalized);
        }
        self.final_output = Some(output.into());
        Ok(())
    }
}
