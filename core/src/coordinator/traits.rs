use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::recorder::{Plan, TaskRecorder};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub output: String,
}

impl Report {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

/// Turns the caller's request into an ordered plan. Called once per run and
/// never retried by the coordinator.
#[async_trait]
pub trait Planner: Send + Sync {
    fn name(&self) -> &str {
        "PlannerAgent"
    }

    async fn create_plan(&self, task: &str) -> anyhow::Result<Plan>;
}

/// Aggregates the recorded worker results into the final output.
#[async_trait]
pub trait Reporter: Send + Sync {
    fn name(&self) -> &str {
        "ReporterAgent"
    }

    async fn report(&self, recorder: &TaskRecorder) -> anyhow::Result<Report>;
}
