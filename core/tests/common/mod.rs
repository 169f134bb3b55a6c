#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use orchestra_core::audit::{AgentLogger, LoggerOptions, StructuredLogger};
use orchestra_core::config::ExecutionConfig;
use orchestra_core::coordinator::{Planner, Report, Reporter};
use orchestra_core::error::WorkerError;
use orchestra_core::executor::{ExecutionEngine, RunContext, Worker, WorkerEvent, WorkerRegistry};
use orchestra_core::recorder::{Plan, Subtask, TaskRecorder, WorkerResult};

/// One scripted attempt.
#[derive(Clone)]
pub enum Step {
    Succeed(&'static str),
    Fail(fn() -> WorkerError),
    /// Sleeps, then succeeds with the given output.
    Hang(Duration, &'static str),
    /// Sleeps, then fails.
    HangThenFail(Duration, fn() -> WorkerError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub task: String,
    pub position: usize,
    pub attempt: u32,
    pub prior_results: usize,
}

/// Worker that plays back a fixed list of steps; the last step repeats.
pub struct ScriptedWorker {
    name: String,
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    calls: Mutex<Vec<Call>>,
    journal: Option<Journal>,
    in_flight: Option<Arc<InFlight>>,
}

/// Shared record of dispatch order across workers.
pub type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
pub struct InFlight {
    current: AtomicUsize,
    pub max: AtomicUsize,
}

impl ScriptedWorker {
    pub fn new(name: &str, steps: Vec<Step>) -> Self {
        Self {
            name: name.to_string(),
            steps: Mutex::new(steps.into()),
            last: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            journal: None,
            in_flight: None,
        }
    }

    pub fn ok(name: &str) -> Self {
        Self::new(name, vec![Step::Succeed("done")])
    }

    pub fn with_journal(mut self, journal: &Journal) -> Self {
        self.journal = Some(journal.clone());
        self
    }

    pub fn with_in_flight(mut self, in_flight: &Arc<InFlight>) -> Self {
        self.in_flight = Some(in_flight.clone());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn next_step(&self) -> Step {
        let mut steps = self.steps.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        if let Some(step) = steps.pop_front() {
            *last = Some(step.clone());
            step
        } else {
            last.clone().unwrap_or(Step::Succeed("done"))
        }
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, subtask: &Subtask, ctx: RunContext) -> Result<WorkerResult, WorkerError> {
        self.calls.lock().unwrap().push(Call {
            task: subtask.task.clone(),
            position: ctx.position,
            attempt: ctx.attempt,
            prior_results: ctx.prior_results.len(),
        });
        if let Some(journal) = &self.journal {
            journal.lock().unwrap().push(subtask.task.clone());
        }
        if let Some(in_flight) = &self.in_flight {
            let now = in_flight.current.fetch_add(1, Ordering::SeqCst) + 1;
            in_flight.max.fetch_max(now, Ordering::SeqCst);
        }

        let outcome = match self.next_step() {
            Step::Succeed(output) => Ok(output),
            Step::Fail(make) => Err(make()),
            Step::Hang(delay, output) => {
                tokio::time::sleep(delay).await;
                Ok(output)
            }
            Step::HangThenFail(delay, make) => {
                tokio::time::sleep(delay).await;
                Err(make())
            }
        };

        if let Some(in_flight) = &self.in_flight {
            in_flight.current.fetch_sub(1, Ordering::SeqCst);
        }
        outcome.map(|output| {
            WorkerResult::new(subtask.clone(), output).with_trajectory(serde_json::json!({
                "trajectory": [
                    { "tool_calls": [ { "function": { "name": format!("{}_tool", self.name) } } ] }
                ]
            }))
        })
    }
}

/// Reports each progress step before finishing.
pub struct StreamingWorker {
    pub name: String,
    pub steps: usize,
}

#[async_trait]
impl Worker for StreamingWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, subtask: &Subtask, _ctx: RunContext) -> Result<WorkerResult, WorkerError> {
        Ok(WorkerResult::new(subtask.clone(), "streamed"))
    }

    fn execute_streamed<'a>(
        &'a self,
        subtask: &'a Subtask,
        _ctx: RunContext,
    ) -> BoxStream<'a, Result<WorkerEvent, WorkerError>> {
        let progress = (1..=self.steps)
            .map(|step| Ok(WorkerEvent::Progress(serde_json::json!({ "step": step }))));
        let finished = std::iter::once(Ok(WorkerEvent::Finished(WorkerResult::new(
            subtask.clone(),
            "streamed",
        ))));
        stream::iter(progress.chain(finished)).boxed()
    }
}

pub struct StaticPlanner(pub Plan);

#[async_trait]
impl Planner for StaticPlanner {
    async fn create_plan(&self, _task: &str) -> anyhow::Result<Plan> {
        Ok(self.0.clone())
    }
}

pub struct FailingPlanner;

#[async_trait]
impl Planner for FailingPlanner {
    async fn create_plan(&self, _task: &str) -> anyhow::Result<Plan> {
        anyhow::bail!("model returned malformed plan")
    }
}

/// Joins worker outputs with `|`.
pub struct JoinReporter;

#[async_trait]
impl Reporter for JoinReporter {
    async fn report(&self, recorder: &TaskRecorder) -> anyhow::Result<Report> {
        let outputs: Vec<&str> = recorder
            .task_records()
            .iter()
            .map(|r| r.output.as_str())
            .collect();
        Ok(Report::new(outputs.join("|")))
    }
}

pub struct FailingReporter;

#[async_trait]
impl Reporter for FailingReporter {
    async fn report(&self, _recorder: &TaskRecorder) -> anyhow::Result<Report> {
        anyhow::bail!("report template missing")
    }
}

pub fn logger(dir: &Path) -> Arc<StructuredLogger> {
    let mut options = LoggerOptions::in_dir(dir);
    options.console = false;
    Arc::new(StructuredLogger::new(options))
}

/// No delays, one-second attempts.
pub fn fast_config(max_retries: i64) -> ExecutionConfig {
    ExecutionConfig {
        max_retries,
        retry_delay: 0.0,
        timeout_per_task: 1.0,
        ..ExecutionConfig::default()
    }
}

pub fn plan(subtasks: &[(&str, &str)]) -> Plan {
    Plan::new(
        "test plan",
        subtasks
            .iter()
            .map(|(agent, task)| Subtask::new(*agent, *task))
            .collect(),
    )
}

pub fn recorder_with(plan: Plan) -> TaskRecorder {
    let mut recorder = TaskRecorder::new("analyse the quarter", "session_000001_0badcafe");
    recorder.set_plan(plan).unwrap();
    recorder
}

pub fn registry(workers: &[Arc<ScriptedWorker>]) -> Arc<WorkerRegistry> {
    let mut registry = WorkerRegistry::new();
    for worker in workers {
        registry.register(worker.clone());
    }
    Arc::new(registry)
}

pub fn engine(
    workers: &[Arc<ScriptedWorker>],
    config: ExecutionConfig,
    logger: &Arc<StructuredLogger>,
) -> ExecutionEngine {
    ExecutionEngine::builder(registry(workers), AgentLogger::new(logger.clone()))
        .config(config)
        .build()
}

pub fn connection_reset() -> WorkerError {
    WorkerError::Connection("connection reset by peer".into())
}

pub fn invalid_input() -> WorkerError {
    WorkerError::Validation("ticker symbol missing".into())
}

pub fn chart_crash() -> WorkerError {
    WorkerError::ToolExecution("chart renderer crashed".into())
}

pub fn bad_json() -> WorkerError {
    WorkerError::DataFormat("unexpected token in json".into())
}
