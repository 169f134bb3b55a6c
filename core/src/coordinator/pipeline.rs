use std::sync::Arc;
use std::time::Instant;

use serde_json::json;

use crate::audit::{status, AgentLogger, StructuredLogger, COORDINATOR_AGENT};
use crate::config::OrchestraConfig;
use crate::error::{ErrorInfo, OrchestraError, Stage, TaskFailure};
use crate::executor::{ExecutionEngine, ExecutionSummary, WorkerRegistry};
use crate::recorder::TaskRecorder;
use crate::util::preview;

use super::traits::{Planner, Reporter};

const INPUT_PREVIEW_CHARS: usize = 200;

/// Result of a run that produced a final output.
#[derive(Debug)]
pub struct RunReport {
    pub recorder: TaskRecorder,
    /// Failures the run tolerated (no fail-fast, or below the abort policy).
    pub failures: Vec<TaskFailure>,
    pub summary: ExecutionSummary,
}

impl RunReport {
    pub fn output(&self) -> &str {
        self.recorder.final_output().unwrap_or_default()
    }
}

/// Planner -> execution engine -> reporter, inside one logged session.
pub struct Coordinator {
    planner: Arc<dyn Planner>,
    reporter: Arc<dyn Reporter>,
    engine: ExecutionEngine,
    audit: AgentLogger,
}

impl Coordinator {
    pub fn new(
        planner: Arc<dyn Planner>,
        reporter: Arc<dyn Reporter>,
        engine: ExecutionEngine,
        audit: AgentLogger,
    ) -> Self {
        Self {
            planner,
            reporter,
            engine,
            audit,
        }
    }

    /// Wires an engine from `cfg` around the given logger.
    pub fn from_config(
        cfg: &OrchestraConfig,
        registry: WorkerRegistry,
        planner: Arc<dyn Planner>,
        reporter: Arc<dyn Reporter>,
        logger: Arc<StructuredLogger>,
    ) -> Self {
        let audit = AgentLogger::new(logger)
            .with_tool_tracking(cfg.monitoring.track_tool_usage)
            .with_performance_monitoring(cfg.monitoring.enable_performance_monitoring);
        let engine = ExecutionEngine::builder(Arc::new(registry), audit.clone())
            .config(cfg.execution.clone())
            .build();
        Self::new(planner, reporter, engine, audit)
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    pub fn audit(&self) -> &AgentLogger {
        &self.audit
    }

    /// Runs the whole pipeline for `input`.
    ///
    /// The session is closed exactly once: `completed` with an output
    /// preview, or `failed` after the error has been logged with its stage.
    pub async fn run(&self, input: &str) -> Result<RunReport, OrchestraError> {
        let session = self.audit.start_session(input);
        tracing::info!(trace_id = %session.trace_id(), "orchestra run started");

        match self.run_stages(input, session.trace_id()).await {
            Ok(report) => {
                tracing::info!(
                    trace_id = %session.trace_id(),
                    results = report.recorder.task_records().len(),
                    tolerated_failures = report.failures.len(),
                    "orchestra run completed"
                );
                session.end(
                    status::COMPLETED,
                    json!({
                        "result": preview(report.output(), INPUT_PREVIEW_CHARS),
                        "worker_results": report.recorder.task_records().len(),
                        "failures": report.failures.len(),
                    }),
                );
                Ok(report)
            }
            Err(err) => {
                self.log_failure(&err, input);
                session.end(
                    status::FAILED,
                    json!({ "error": err.to_string(), "stage": err.stage().map(Stage::as_str) }),
                );
                Err(err)
            }
        }
    }

    async fn run_stages(&self, input: &str, run_trace_id: &str) -> Result<RunReport, OrchestraError> {
        let mut recorder = TaskRecorder::new(input, run_trace_id);

        // Planning
        let plan_trace = self.audit.planning_started(self.planner.name(), input);
        let started = Instant::now();
        let in_stage = |stage: Stage, trace_id: &str| {
            let trace_id = trace_id.to_string();
            move |err: OrchestraError| OrchestraError::Stage {
                stage,
                trace_id,
                input_preview: preview(input, INPUT_PREVIEW_CHARS),
                source: Box::new(err),
            }
        };

        let plan = self
            .planner
            .create_plan(input)
            .await
            .map_err(OrchestraError::Planner)
            .map_err(in_stage(Stage::Planning, &plan_trace))?;
        self.engine
            .registry()
            .validate_plan(&plan)
            .map_err(in_stage(Stage::Planning, &plan_trace))?;
        self.audit.plan_created(
            self.planner.name(),
            &plan_trace,
            plan.todo.len(),
            &plan.analysis,
            started.elapsed(),
        );
        recorder
            .set_plan(plan)
            .map_err(OrchestraError::from)
            .map_err(in_stage(Stage::Planning, &plan_trace))?;

        // Execution
        let config = self.engine.config();
        let executed = if config.enable_checkpoints {
            self.engine
                .execute_with_checkpoints(&mut recorder, config.checkpoint_interval())
                .await
        } else {
            self.engine.execute_tasks(&mut recorder, config.fail_fast).await
        };
        let outcome = executed.map_err(in_stage(Stage::Execution, run_trace_id))?;

        let summary = outcome.summary();
        let mut failures = outcome.errors;
        if config.fail_fast && !config.enable_checkpoints && !failures.is_empty() {
            let first = failures.remove(0);
            return Err(in_stage(Stage::Execution, run_trace_id)(first.into()));
        }

        // Reporting
        let report_trace =
            self.audit
                .reporting_started(self.reporter.name(), input, recorder.task_records().len());
        let started = Instant::now();
        let report = self
            .reporter
            .report(&recorder)
            .await
            .map_err(OrchestraError::Reporter)
            .map_err(in_stage(Stage::Reporting, &report_trace))?;
        self.audit.report_generated(
            self.reporter.name(),
            &report_trace,
            &report.output,
            started.elapsed(),
        );
        recorder
            .set_final_output(report.output)
            .map_err(OrchestraError::from)
            .map_err(in_stage(Stage::Reporting, &report_trace))?;

        Ok(RunReport {
            recorder,
            failures,
            summary,
        })
    }

    fn log_failure(&self, err: &OrchestraError, input: &str) {
        let trace_id = match err {
            OrchestraError::Stage { trace_id, .. } => Some(trace_id.as_str()),
            _ => None,
        };
        let context = json!({
            "stage": err.stage().map(Stage::as_str),
            "input": preview(input, INPUT_PREVIEW_CHARS),
            "trace_id": trace_id,
        });
        let info = ErrorInfo::from_message(err.kind(), err.to_string(), context.clone());

        // Worker failures are already in the history from the engine.
        if !matches!(err.stage(), Some(Stage::Execution)) {
            self.engine.error_handler().record(info.clone());
        }
        tracing::error!(stage = ?err.stage(), "orchestra run failed: {err}");
        self.audit
            .log_error(COORDINATOR_AGENT, &info, Some(err), context, trace_id);
    }
}
