mod common;

use std::sync::Arc;

use common::*;
use orchestra_core::audit::{events, status, AgentLogger, LogEntry, LogQuery, StructuredLogger};
use orchestra_core::config::{ExecutionConfig, OrchestraConfig};
use orchestra_core::coordinator::{Coordinator, Planner, Reporter};
use orchestra_core::error::{OrchestraError, Stage};
use orchestra_core::executor::ExecutionEngine;
use orchestra_core::recorder::Plan;
use pretty_assertions::assert_eq;

fn coordinator(
    plan_source: Arc<dyn Planner>,
    reporter: Arc<dyn Reporter>,
    workers: &[Arc<ScriptedWorker>],
    config: ExecutionConfig,
    logger: &Arc<StructuredLogger>,
) -> Coordinator {
    let audit = AgentLogger::new(logger.clone());
    let engine = ExecutionEngine::builder(registry(workers), audit.clone())
        .config(config)
        .build();
    Coordinator::new(plan_source, reporter, engine, audit)
}

fn session_events(logger: &StructuredLogger) -> Vec<LogEntry> {
    logger.get_session_logs(10_000)
}

fn count(entries: &[LogEntry], event_type: &str) -> usize {
    entries.iter().filter(|e| e.event_type == event_type).count()
}

fn three_step_plan() -> Plan {
    plan(&[
        ("DataAgent", "fetch statements"),
        ("ChartAgent", "draw growth chart"),
        ("DataAgent", "fetch ratios"),
    ])
}

#[tokio::test]
async fn full_run_produces_report_and_closes_session() {
    let tmp = tempfile::tempdir().unwrap();
    let logger = logger(tmp.path());
    let data = Arc::new(ScriptedWorker::new(
        "DataAgent",
        vec![Step::Succeed("statements"), Step::Succeed("ratios")],
    ));
    let chart = Arc::new(ScriptedWorker::new("ChartAgent", vec![Step::Succeed("chart")]));
    let coordinator = coordinator(
        Arc::new(StaticPlanner(three_step_plan())),
        Arc::new(JoinReporter),
        &[data, chart],
        fast_config(1),
        &logger,
    );

    let report = coordinator.run("How did revenue grow?").await.unwrap();
    assert_eq!(report.output(), "statements|chart|ratios");
    assert!(report.failures.is_empty());
    assert_eq!(report.summary.completed, 3);
    assert!(report.recorder.is_finalized());

    let entries = session_events(&logger);
    assert_eq!(entries.first().unwrap().event_type, events::ORCHESTRA_START);
    let last = entries.last().unwrap();
    assert_eq!(last.event_type, events::ORCHESTRA_END);
    assert_eq!(last.status, status::COMPLETED);
    assert_eq!(count(&entries, events::ORCHESTRA_END), 1);
    assert_eq!(count(&entries, events::PLAN_CREATION), 1);
    assert_eq!(count(&entries, events::REPORT_GENERATION), 1);
    assert!(entries
        .iter()
        .all(|e| !e.trace_id.is_empty() && e.session_id == logger.session_id()));
}

#[tokio::test]
async fn unknown_worker_rejects_plan_before_execution() {
    let tmp = tempfile::tempdir().unwrap();
    let logger = logger(tmp.path());
    let data = Arc::new(ScriptedWorker::ok("DataAgent"));
    let coordinator = coordinator(
        Arc::new(StaticPlanner(plan(&[
            ("DataAgent", "fetch"),
            ("PdfAgent", "render"),
        ]))),
        Arc::new(JoinReporter),
        &[data.clone()],
        fast_config(1),
        &logger,
    );

    let err = coordinator.run("q").await.unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Planning));
    match &err {
        OrchestraError::Stage { source, .. } => match source.as_ref() {
            OrchestraError::UnknownWorkers(names) => assert_eq!(names, &vec!["PdfAgent".to_string()]),
            other => panic!("unexpected source: {other:?}"),
        },
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(data.calls().is_empty());

    let entries = session_events(&logger);
    assert_eq!(count(&entries, events::TASK_EXECUTION), 0);
    assert_eq!(count(&entries, events::ERROR), 1);
    let end: Vec<_> = entries
        .iter()
        .filter(|e| e.event_type == events::ORCHESTRA_END)
        .collect();
    assert_eq!(end.len(), 1);
    assert_eq!(end[0].status, status::FAILED);
}

#[tokio::test]
async fn planner_failure_is_reported_with_stage_context() {
    let tmp = tempfile::tempdir().unwrap();
    let logger = logger(tmp.path());
    let coordinator = coordinator(
        Arc::new(FailingPlanner),
        Arc::new(JoinReporter),
        &[],
        fast_config(1),
        &logger,
    );

    let err = coordinator.run("summarise Q3 filings").await.unwrap_err();
    let OrchestraError::Stage {
        stage,
        input_preview,
        trace_id,
        source,
    } = &err
    else {
        panic!("unexpected error: {err:?}");
    };
    assert_eq!(*stage, Stage::Planning);
    assert_eq!(input_preview, "summarise Q3 filings");
    assert!(trace_id.starts_with("plan_"));
    assert!(matches!(source.as_ref(), OrchestraError::Planner(_)));
    assert!(err.to_string().contains("malformed plan"));

    let errors = logger.query(&LogQuery {
        event_type: Some(events::ERROR.into()),
        ..LogQuery::default()
    });
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].trace_id, *trace_id);
    assert_eq!(coordinator.engine().error_handler().summary().total_errors, 1);
}

#[tokio::test]
async fn reporter_failure_closes_session_as_failed() {
    let tmp = tempfile::tempdir().unwrap();
    let logger = logger(tmp.path());
    let coordinator = coordinator(
        Arc::new(StaticPlanner(plan(&[("DataAgent", "fetch")]))),
        Arc::new(FailingReporter),
        &[Arc::new(ScriptedWorker::ok("DataAgent"))],
        fast_config(0),
        &logger,
    );

    let err = coordinator.run("q").await.unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Reporting));

    let entries = session_events(&logger);
    assert_eq!(count(&entries, events::TASK_EXECUTION), 2);
    assert_eq!(count(&entries, events::ORCHESTRA_END), 1);
    assert_eq!(entries.last().unwrap().status, status::FAILED);
}

#[tokio::test]
async fn fail_fast_surfaces_first_task_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let logger = logger(tmp.path());
    let broken = Arc::new(ScriptedWorker::new("DataAgent", vec![Step::Fail(invalid_input)]));
    let chart = Arc::new(ScriptedWorker::ok("ChartAgent"));
    let config = ExecutionConfig {
        fail_fast: true,
        enable_checkpoints: false,
        ..fast_config(2)
    };
    let coordinator = coordinator(
        Arc::new(StaticPlanner(three_step_plan())),
        Arc::new(JoinReporter),
        &[broken, chart.clone()],
        config,
        &logger,
    );

    let err = coordinator.run("q").await.unwrap_err();
    let OrchestraError::Stage { stage, source, .. } = &err else {
        panic!("unexpected error: {err:?}");
    };
    assert_eq!(*stage, Stage::Execution);
    match source.as_ref() {
        OrchestraError::Task(failure) => {
            assert_eq!(failure.position, 1);
            assert_eq!(failure.attempts, 1);
        }
        other => panic!("unexpected source: {other:?}"),
    }
    assert!(chart.calls().is_empty());
    assert_eq!(count(&session_events(&logger), events::REPORTING_START), 0);
}

#[tokio::test]
async fn tolerated_failures_are_listed_in_report() {
    let tmp = tempfile::tempdir().unwrap();
    let logger = logger(tmp.path());
    let data = Arc::new(ScriptedWorker::ok("DataAgent"));
    let chart = Arc::new(ScriptedWorker::new("ChartAgent", vec![Step::Fail(chart_crash)]));
    let config = ExecutionConfig {
        enable_checkpoints: false,
        ..fast_config(0)
    };
    let coordinator = coordinator(
        Arc::new(StaticPlanner(three_step_plan())),
        Arc::new(JoinReporter),
        &[data, chart],
        config,
        &logger,
    );

    let report = coordinator.run("q").await.unwrap();
    assert_eq!(report.output(), "done|done");
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].agent_name, "ChartAgent");
    assert_eq!(report.summary.failed, 1);
}

#[tokio::test]
async fn checkpoint_abort_fails_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let logger = logger(tmp.path());
    let data = Arc::new(ScriptedWorker::new("DataAgent", vec![Step::Fail(connection_reset)]));
    let chart = Arc::new(ScriptedWorker::ok("ChartAgent"));
    let config = ExecutionConfig {
        enable_checkpoints: true,
        checkpoint_interval: 1,
        ..fast_config(0)
    };
    let coordinator = coordinator(
        Arc::new(StaticPlanner(three_step_plan())),
        Arc::new(JoinReporter),
        &[data, chart.clone()],
        config,
        &logger,
    );

    let err = coordinator.run("q").await.unwrap_err();
    let OrchestraError::Stage { source, .. } = &err else {
        panic!("unexpected error: {err:?}");
    };
    assert!(matches!(
        source.as_ref(),
        OrchestraError::CheckpointAborted { batch: 1, .. }
    ));
    assert!(chart.calls().is_empty());

    let entries = session_events(&logger);
    assert_eq!(count(&entries, events::CHECKPOINT_ABORT), 1);
    assert_eq!(count(&entries, events::ORCHESTRA_END), 1);
}

#[tokio::test]
async fn from_config_wires_execution_settings() {
    let tmp = tempfile::tempdir().unwrap();
    let logger = logger(tmp.path());
    let mut cfg = OrchestraConfig::default();
    cfg.execution = fast_config(0);
    cfg.execution.max_retries = 5;

    let mut registry = orchestra_core::executor::WorkerRegistry::new();
    registry.register(Arc::new(ScriptedWorker::ok("DataAgent")));
    let coordinator = Coordinator::from_config(
        &cfg,
        registry,
        Arc::new(StaticPlanner(plan(&[("DataAgent", "fetch")]))),
        Arc::new(JoinReporter),
        logger.clone(),
    );

    assert_eq!(coordinator.engine().config().max_retries(), 5);
    let report = coordinator.run("q").await.unwrap();
    assert_eq!(report.output(), "done");
}

#[tokio::test]
async fn from_config_without_performance_monitoring_drops_durations() {
    let tmp = tempfile::tempdir().unwrap();
    let logger = logger(tmp.path());
    let mut cfg = OrchestraConfig::default();
    cfg.execution = fast_config(0);
    cfg.monitoring.enable_performance_monitoring = false;

    let mut registry = orchestra_core::executor::WorkerRegistry::new();
    registry.register(Arc::new(ScriptedWorker::ok("DataAgent")));
    let coordinator = Coordinator::from_config(
        &cfg,
        registry,
        Arc::new(StaticPlanner(plan(&[("DataAgent", "fetch")]))),
        Arc::new(JoinReporter),
        logger.clone(),
    );
    coordinator.run("q").await.unwrap();

    let entries = session_events(&logger);
    assert_eq!(count(&entries, events::TASK_EXECUTION), 2);
    assert!(entries.iter().all(|e| e.duration_ms.is_none()));
}

#[tokio::test]
async fn concurrent_runs_share_one_log_without_interleaving() {
    let tmp = tempfile::tempdir().unwrap();
    let logger = logger(tmp.path());
    let coordinator = Arc::new(coordinator(
        Arc::new(StaticPlanner(plan(&[("DataAgent", "fetch"), ("DataAgent", "again")]))),
        Arc::new(JoinReporter),
        &[Arc::new(ScriptedWorker::ok("DataAgent"))],
        fast_config(0),
        &logger,
    ));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.run(&format!("question {i}")).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let entries = session_events(&logger);
    assert_eq!(count(&entries, events::ORCHESTRA_START), 8);
    assert_eq!(count(&entries, events::ORCHESTRA_END), 8);

    let raw = std::fs::read_to_string(logger.current_log_file()).unwrap();
    for line in raw.lines() {
        serde_json::from_str::<LogEntry>(line).unwrap();
    }
}
