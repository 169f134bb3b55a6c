use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::{mpsc, Semaphore};

use crate::audit::{events, status, AgentLogger};
use crate::config::ExecutionConfig;
use crate::error::{ErrorHandler, ErrorInfo, OrchestraError, TaskFailure, WorkerError};
use crate::recorder::{Plan, Subtask, TaskRecorder, WorkerResult};
use crate::util::preview;

use super::checkpoint::{checkpoint_batches, AbortPolicy};
use super::registry::WorkerRegistry;
use super::retry::FixedDelay;
use super::traits::{RetryStrategy, RunContext, Worker, WorkerEvent};
use super::types::{ExecutionOutcome, ProgressEvent, TaskExecution};

const TASK_PREVIEW_CHARS: usize = 200;

/// Runs a recorder's plan against registered workers with per-attempt
/// timeout, retry and optional checkpointing.
pub struct ExecutionEngine {
    registry: Arc<WorkerRegistry>,
    config: ExecutionConfig,
    audit: AgentLogger,
    errors: Arc<ErrorHandler>,
    retry_strategy: Arc<dyn RetryStrategy>,
    abort_policy: AbortPolicy,
    progress: Option<mpsc::Sender<ProgressEvent>>,
}

pub struct ExecutionEngineBuilder {
    registry: Arc<WorkerRegistry>,
    audit: AgentLogger,
    config: ExecutionConfig,
    errors: Option<Arc<ErrorHandler>>,
    retry_strategy: Option<Arc<dyn RetryStrategy>>,
    abort_policy: AbortPolicy,
    progress: Option<mpsc::Sender<ProgressEvent>>,
}

/// Outcome of one subtask after all of its attempts.
struct SubtaskRun {
    execution: TaskExecution,
    result: Result<WorkerResult, TaskFailure>,
}

struct BatchOutcome {
    results: Vec<WorkerResult>,
    errors: Vec<TaskFailure>,
}

impl ExecutionEngine {
    pub fn builder(registry: Arc<WorkerRegistry>, audit: AgentLogger) -> ExecutionEngineBuilder {
        ExecutionEngineBuilder::new(registry, audit)
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn error_handler(&self) -> &Arc<ErrorHandler> {
        &self.errors
    }

    fn parallelism(&self) -> usize {
        if self.config.parallel_execution {
            self.config.max_concurrent_tasks()
        } else {
            1
        }
    }

    /// Runs every subtask of the recorder's plan and appends successful
    /// results to the recorder.
    ///
    /// With `fail_fast` the run stops at the first unrecovered failure and
    /// later subtasks never start. Without it failures are collected and the
    /// remaining subtasks still run.
    pub async fn execute_tasks(
        &self,
        recorder: &mut TaskRecorder,
        fail_fast: bool,
    ) -> Result<ExecutionOutcome, OrchestraError> {
        let plan = plan_of(recorder)?;
        let mut executions = pending_executions(&plan);

        let batch = self
            .run_range(recorder, &plan, 0..plan.todo.len(), fail_fast, &mut executions)
            .await?;

        Ok(ExecutionOutcome {
            results: batch.results,
            errors: batch.errors,
            executions,
        })
    }

    /// Runs the plan in consecutive batches of `interval` subtasks and checks
    /// the abort policy after each batch.
    ///
    /// Batches always run without fail-fast. A batch whose failures trip the
    /// abort policy ends the run with `CheckpointAborted`; results of the
    /// batches before it (and the successes inside it) stay in the recorder.
    pub async fn execute_with_checkpoints(
        &self,
        recorder: &mut TaskRecorder,
        interval: usize,
    ) -> Result<ExecutionOutcome, OrchestraError> {
        let plan = plan_of(recorder)?;
        let mut executions = pending_executions(&plan);
        let batches = checkpoint_batches(plan.todo.len(), interval);
        let total_batches = batches.len();

        let mut results = Vec::new();
        let mut errors = Vec::new();

        for (index, range) in batches.into_iter().enumerate() {
            let batch_no = index + 1;
            let trace_id = format!("{}_batch_{}", recorder.trace_id(), batch_no);
            let meta = json!({
                "batch": batch_no,
                "total_batches": total_batches,
                "start": range.start + 1,
                "end": range.end,
            });

            tracing::info!(
                batch = batch_no,
                total = total_batches,
                "checkpoint batch {}-{} started",
                range.start + 1,
                range.end
            );
            self.audit
                .checkpoint(events::CHECKPOINT_START, status::STARTED, &trace_id, meta.clone());

            let batch = self
                .run_range(recorder, &plan, range.clone(), false, &mut executions)
                .await?;
            let batch_completed = batch.results.len();
            results.extend(batch.results);

            if batch.errors.is_empty() {
                self.audit.checkpoint(
                    events::CHECKPOINT_COMPLETE,
                    status::COMPLETED,
                    &trace_id,
                    merge(&meta, json!({ "completed": batch_completed })),
                );
                continue;
            }

            let failed: Vec<String> = batch
                .errors
                .iter()
                .map(|f| format!("{}: {}", f.position, f.source.kind()))
                .collect();

            if self.abort_policy.should_abort(&batch.errors) {
                tracing::error!(
                    batch = batch_no,
                    errors = batch.errors.len(),
                    "checkpoint abort: critical failure or too many errors"
                );
                self.audit.checkpoint(
                    events::CHECKPOINT_ABORT,
                    status::FAILED,
                    &trace_id,
                    merge(
                        &meta,
                        json!({ "completed": batch_completed, "errors": batch.errors.len(), "failed": failed }),
                    ),
                );
                return Err(OrchestraError::CheckpointAborted {
                    batch: batch_no,
                    range: format!("{}-{}", range.start + 1, range.end),
                    completed: results.len(),
                    failures: batch.errors,
                });
            }

            tracing::warn!(
                batch = batch_no,
                errors = batch.errors.len(),
                "checkpoint batch finished with tolerated errors"
            );
            self.audit.checkpoint(
                events::CHECKPOINT_WARNING,
                status::WARNING,
                &trace_id,
                merge(
                    &meta,
                    json!({ "completed": batch_completed, "errors": batch.errors.len(), "failed": failed }),
                ),
            );
            errors.extend(batch.errors);
        }

        Ok(ExecutionOutcome {
            results,
            errors,
            executions,
        })
    }

    async fn run_range(
        &self,
        recorder: &mut TaskRecorder,
        plan: &Plan,
        range: Range<usize>,
        fail_fast: bool,
        executions: &mut [TaskExecution],
    ) -> Result<BatchOutcome, OrchestraError> {
        let parallelism = self.parallelism();
        if parallelism > 1 && range.len() > 1 {
            self.run_parallel(recorder, plan, range, fail_fast, executions, parallelism)
                .await
        } else {
            self.run_sequential(recorder, plan, range, fail_fast, executions)
                .await
        }
    }

    async fn run_sequential(
        &self,
        recorder: &mut TaskRecorder,
        plan: &Plan,
        range: Range<usize>,
        fail_fast: bool,
        executions: &mut [TaskExecution],
    ) -> Result<BatchOutcome, OrchestraError> {
        let mut out = BatchOutcome {
            results: Vec::new(),
            errors: Vec::new(),
        };

        for index in range {
            let prior: Arc<[WorkerResult]> = recorder.task_records().into();
            let run = self
                .run_subtask(
                    recorder.task(),
                    recorder.trace_id(),
                    &plan.todo[index],
                    executions[index].clone(),
                    prior,
                )
                .await;
            executions[index] = run.execution;

            match run.result {
                Ok(result) => {
                    recorder.add_worker_result(result.clone())?;
                    out.results.push(result);
                }
                Err(failure) => {
                    out.errors.push(failure);
                    if fail_fast {
                        tracing::warn!(position = index + 1, "fail-fast: stopping after failed subtask");
                        break;
                    }
                }
            }
        }
        Ok(out)
    }

    /// At most `parallelism` subtasks in flight. Runs finish in any order and
    /// wait in `finished` until every earlier position has been recorded, so
    /// this loop records in plan order. On a fail-fast stop, runs that already
    /// finished are still recorded and only unfinished ones are skipped.
    async fn run_parallel(
        &self,
        recorder: &mut TaskRecorder,
        plan: &Plan,
        range: Range<usize>,
        fail_fast: bool,
        executions: &mut [TaskExecution],
        parallelism: usize,
    ) -> Result<BatchOutcome, OrchestraError> {
        let sem = Arc::new(Semaphore::new(parallelism));
        let prior: Arc<[WorkerResult]> = recorder.task_records().into();
        let task = recorder.task().to_string();
        let run_trace_id = recorder.trace_id().to_string();

        let mut out = BatchOutcome {
            results: Vec::new(),
            errors: Vec::new(),
        };
        let mut finished: BTreeMap<usize, SubtaskRun> = BTreeMap::new();
        let mut cursor = range.start;
        let mut stopped = false;

        {
            let mut futs = FuturesUnordered::new();
            for index in range.clone() {
                let sem = sem.clone();
                let prior = prior.clone();
                let execution = executions[index].clone();
                let subtask = &plan.todo[index];
                let task = task.as_str();
                let run_trace_id = run_trace_id.as_str();
                futs.push(async move {
                    // The semaphore is never closed.
                    let _permit = sem.acquire_owned().await.ok();
                    (
                        index,
                        self.run_subtask(task, run_trace_id, subtask, execution, prior)
                            .await,
                    )
                });
            }

            'consume: while let Some((index, run)) = futs.next().await {
                finished.insert(index, run);
                while let Some(run) = finished.remove(&cursor) {
                    let failed = run.result.is_err();
                    self.record_run(recorder, &mut out, executions, cursor, run)?;
                    if failed && fail_fast {
                        tracing::warn!(
                            position = cursor + 1,
                            "fail-fast: cancelling remaining subtasks"
                        );
                        stopped = true;
                        break 'consume;
                    }
                    cursor += 1;
                }
            }
        }

        if stopped {
            // Later positions that ran to completion before the stop.
            for (index, run) in std::mem::take(&mut finished) {
                self.record_run(recorder, &mut out, executions, index, run)?;
            }
            for execution in &mut executions[range] {
                execution.skip();
            }
        }
        Ok(out)
    }

    fn record_run(
        &self,
        recorder: &mut TaskRecorder,
        out: &mut BatchOutcome,
        executions: &mut [TaskExecution],
        index: usize,
        run: SubtaskRun,
    ) -> Result<(), OrchestraError> {
        executions[index] = run.execution;
        match run.result {
            Ok(result) => {
                recorder.add_worker_result(result.clone())?;
                out.results.push(result);
            }
            Err(failure) => out.errors.push(failure),
        }
        Ok(())
    }

    /// Drives one subtask through all of its attempts.
    async fn run_subtask(
        &self,
        task: &str,
        run_trace_id: &str,
        subtask: &Subtask,
        mut execution: TaskExecution,
        prior: Arc<[WorkerResult]>,
    ) -> SubtaskRun {
        let position = execution.position;
        let agent_name = subtask.agent_name.as_str();
        let trace_id = self.audit.trace_id("task");
        let max_retries = self.retry_strategy.max_retries();
        let context = |retry_count: u32| {
            json!({
                "agent_name": agent_name,
                "task": preview(&subtask.task, TASK_PREVIEW_CHARS),
                "position": position,
                "trace_id": trace_id,
                "retry_count": retry_count,
            })
        };

        let Some(worker) = self.registry.get(agent_name) else {
            let err = WorkerError::Configuration(format!("no worker registered as '{agent_name}'"));
            let info = ErrorInfo::from_worker_error(&err, 0, max_retries, context(0));
            self.errors.record(info.clone());
            self.audit
                .task_failed(agent_name, &subtask.task, &trace_id, &info, Duration::ZERO);
            execution.trace_id = Some(trace_id.clone());
            execution.fail(info.clone());
            return SubtaskRun {
                execution,
                result: Err(TaskFailure {
                    position,
                    agent_name: agent_name.to_string(),
                    task: subtask.task.clone(),
                    trace_id,
                    attempts: 0,
                    info,
                    source: err,
                }),
            };
        };

        execution.start(&trace_id);
        let timeout = self.config.timeout_per_task();

        loop {
            let attempt = execution.retry_count + 1;
            self.audit.task_started(
                agent_name,
                &subtask.task,
                &trace_id,
                attempt,
                json!({ "position": position, "run_trace_id": run_trace_id }),
            );

            let ctx = RunContext {
                task: task.to_string(),
                session_id: self.audit.session_id().to_string(),
                run_trace_id: run_trace_id.to_string(),
                trace_id: trace_id.clone(),
                position,
                attempt,
                prior_results: prior.clone(),
            };

            let started = Instant::now();
            let outcome = match tokio::time::timeout(
                timeout,
                self.attempt(worker.as_ref(), subtask, ctx),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(WorkerError::Timeout(timeout)),
            };
            let elapsed = started.elapsed();

            match outcome {
                Ok(result) => {
                    execution.complete();
                    self.audit.task_completed(
                        agent_name,
                        &subtask.task,
                        &trace_id,
                        &result.output,
                        result.tools_used(),
                        elapsed,
                        execution.retry_count,
                    );
                    tracing::debug!(
                        position,
                        agent = agent_name,
                        retries = execution.retry_count,
                        "subtask completed"
                    );
                    return SubtaskRun {
                        execution,
                        result: Ok(result),
                    };
                }
                Err(err) => {
                    let info = ErrorInfo::from_worker_error(
                        &err,
                        execution.retry_count,
                        max_retries,
                        context(execution.retry_count),
                    );
                    self.errors.record(info.clone());
                    self.audit
                        .task_failed(agent_name, &subtask.task, &trace_id, &info, elapsed);

                    if self.retry_strategy.should_retry(&info) {
                        let delay = self.retry_strategy.next_delay(execution.retry_count);
                        tracing::warn!(
                            position,
                            agent = agent_name,
                            attempt,
                            max_retries,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "attempt failed, retrying: {err}"
                        );
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        execution.retry_count += 1;
                        continue;
                    }

                    tracing::error!(
                        position,
                        agent = agent_name,
                        attempts = attempt,
                        "subtask failed: {err}"
                    );
                    execution.fail(info.clone());
                    return SubtaskRun {
                        execution,
                        result: Err(TaskFailure {
                            position,
                            agent_name: agent_name.to_string(),
                            task: subtask.task.clone(),
                            trace_id,
                            attempts: attempt,
                            info,
                            source: err,
                        }),
                    };
                }
            }
        }
    }

    /// One attempt. Streams when a progress channel is attached.
    async fn attempt(
        &self,
        worker: &dyn Worker,
        subtask: &Subtask,
        ctx: RunContext,
    ) -> Result<WorkerResult, WorkerError> {
        let Some(progress) = &self.progress else {
            return worker.execute(subtask, ctx).await;
        };

        let position = ctx.position;
        let attempt = ctx.attempt;
        let trace_id = ctx.trace_id.clone();
        let mut events = worker.execute_streamed(subtask, ctx);
        while let Some(event) = events.next().await {
            match event? {
                WorkerEvent::Progress(payload) => {
                    // A dropped receiver only stops progress reporting.
                    let _ = progress
                        .send(ProgressEvent {
                            position,
                            agent_name: subtask.agent_name.clone(),
                            trace_id: trace_id.clone(),
                            attempt,
                            payload,
                        })
                        .await;
                }
                WorkerEvent::Finished(result) => return Ok(result),
            }
        }
        Err(WorkerError::other(format!(
            "worker '{}' ended its stream without a result",
            subtask.agent_name
        )))
    }
}

impl ExecutionEngineBuilder {
    pub fn new(registry: Arc<WorkerRegistry>, audit: AgentLogger) -> Self {
        Self {
            registry,
            audit,
            config: ExecutionConfig::default(),
            errors: None,
            retry_strategy: None,
            abort_policy: AbortPolicy::default(),
            progress: None,
        }
    }

    pub fn config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn error_handler(mut self, errors: Arc<ErrorHandler>) -> Self {
        self.errors = Some(errors);
        self
    }

    /// Replaces the fixed-delay policy derived from the config.
    pub fn retry_strategy(mut self, strategy: Arc<dyn RetryStrategy>) -> Self {
        self.retry_strategy = Some(strategy);
        self
    }

    pub fn abort_policy(mut self, policy: AbortPolicy) -> Self {
        self.abort_policy = policy;
        self
    }

    pub fn progress(mut self, sender: mpsc::Sender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn build(self) -> ExecutionEngine {
        let retry_strategy = self
            .retry_strategy
            .unwrap_or_else(|| Arc::new(FixedDelay::from_config(&self.config)));
        ExecutionEngine {
            registry: self.registry,
            config: self.config,
            audit: self.audit,
            errors: self.errors.unwrap_or_default(),
            retry_strategy,
            abort_policy: self.abort_policy,
            progress: self.progress,
        }
    }
}

fn plan_of(recorder: &TaskRecorder) -> Result<Plan, OrchestraError> {
    recorder
        .plan()
        .cloned()
        .ok_or_else(|| crate::error::RecorderError::MissingPlan.into())
}

fn pending_executions(plan: &Plan) -> Vec<TaskExecution> {
    plan.todo
        .iter()
        .enumerate()
        .map(|(i, subtask)| TaskExecution::pending(i + 1, subtask.clone()))
        .collect()
}

fn merge(base: &serde_json::Value, extra: serde_json::Value) -> serde_json::Value {
    let mut merged = base.clone();
    if let (Some(target), serde_json::Value::Object(extra)) = (merged.as_object_mut(), extra) {
        target.extend(extra);
    }
    merged
}
