use std::collections::HashMap;
use std::sync::Arc;

use crate::error::OrchestraError;
use crate::recorder::Plan;

use super::traits::Worker;

/// Name -> worker lookup used to accept plans and dispatch subtasks.
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `worker` under its own name, returning any worker it replaced.
    pub fn register(&mut self, worker: Arc<dyn Worker>) -> Option<Arc<dyn Worker>> {
        self.workers.insert(worker.name().to_string(), worker)
    }

    pub fn with(mut self, worker: Arc<dyn Worker>) -> Self {
        self.register(worker);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Worker>> {
        self.workers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workers.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Fails with every unknown agent name, in order of first appearance.
    pub fn validate_plan(&self, plan: &Plan) -> Result<(), OrchestraError> {
        let mut unknown: Vec<String> = Vec::new();
        for subtask in &plan.todo {
            if !self.contains(&subtask.agent_name) && !unknown.contains(&subtask.agent_name) {
                unknown.push(subtask.agent_name.clone());
            }
        }
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(OrchestraError::UnknownWorkers(unknown))
        }
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("workers", &self.names())
            .finish()
    }
}
