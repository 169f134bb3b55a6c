use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use crate::error::ErrorInfo;
use crate::util::preview;

use super::entry::{events, status, LogEvent};
use super::logger::StructuredLogger;
use super::query::{summarize, SessionSummary};

const INPUT_PREVIEW_CHARS: usize = 200;
const OUTPUT_PREVIEW_CHARS: usize = 500;

pub const COORDINATOR_AGENT: &str = "OrchestraAgent";

/// Pipeline-level helpers over a shared [`StructuredLogger`].
///
/// Every helper returns the trace id it logged under so callers can
/// correlate later events with the same operation.
#[derive(Clone)]
pub struct AgentLogger {
    logger: Arc<StructuredLogger>,
    track_tool_usage: bool,
    monitor_performance: bool,
}

impl AgentLogger {
    pub fn new(logger: Arc<StructuredLogger>) -> Self {
        Self {
            logger,
            track_tool_usage: true,
            monitor_performance: true,
        }
    }

    pub fn with_tool_tracking(mut self, enabled: bool) -> Self {
        self.track_tool_usage = enabled;
        self
    }

    /// Durations are recorded only while both this and the logger's
    /// `log_performance` option are on.
    pub fn with_performance_monitoring(mut self, enabled: bool) -> Self {
        self.monitor_performance = enabled;
        self
    }

    pub fn structured(&self) -> &Arc<StructuredLogger> {
        &self.logger
    }

    pub fn session_id(&self) -> &str {
        self.logger.session_id()
    }

    pub fn trace_id(&self, prefix: &str) -> String {
        self.logger.generate_trace_id(prefix)
    }

    fn duration(&self, elapsed: Duration) -> Option<u64> {
        (self.monitor_performance && self.logger.options().log_performance)
            .then(|| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
    }

    /// Logs `orchestra_start` and returns the handle that closes the session.
    pub fn start_session(&self, input: &str) -> SessionLog {
        let trace_id = self.logger.log_event(
            LogEvent::new(COORDINATOR_AGENT, events::ORCHESTRA_START, status::STARTED)
                .input(json!({ "task": input }))
                .trace_id(self.trace_id("session")),
        );
        SessionLog {
            agent: self.clone(),
            trace_id,
            started: Instant::now(),
            closed: false,
        }
    }

    pub fn planning_started(&self, agent_name: &str, input: &str) -> String {
        self.logger.log_event(
            LogEvent::new(agent_name, events::PLANNING_START, status::STARTED)
                .input(json!({ "question": preview(input, INPUT_PREVIEW_CHARS) }))
                .trace_id(self.trace_id("plan")),
        )
    }

    pub fn plan_created(
        &self,
        agent_name: &str,
        trace_id: &str,
        plan_items: usize,
        analysis: &str,
        elapsed: Duration,
    ) -> String {
        self.logger.log_event(
            LogEvent::new(agent_name, events::PLAN_CREATION, status::COMPLETED)
                .duration_ms(self.duration(elapsed))
                .output(json!({
                    "plan_items": plan_items,
                    "analysis_length": analysis.chars().count(),
                }))
                .trace_id(trace_id),
        )
    }

    pub fn task_started(
        &self,
        agent_name: &str,
        task: &str,
        trace_id: &str,
        attempt: u32,
        metadata: Value,
    ) -> String {
        let mut metadata = metadata;
        if let Value::Object(map) = &mut metadata {
            map.insert("attempt".into(), json!(attempt));
        }
        self.logger.log_event(
            LogEvent::new(agent_name, events::TASK_EXECUTION, status::STARTED)
                .input(json!({ "task": task }))
                .metadata(metadata)
                .trace_id(trace_id),
        )
    }

    pub fn task_completed(
        &self,
        agent_name: &str,
        task: &str,
        trace_id: &str,
        output: &str,
        tools_used: Vec<String>,
        elapsed: Duration,
        retry_count: u32,
    ) -> String {
        self.logger.log_event(
            LogEvent::new(agent_name, events::TASK_EXECUTION, status::COMPLETED)
                .duration_ms(self.duration(elapsed))
                .input(json!({ "task": task }))
                .output(json!({ "result": preview(output, OUTPUT_PREVIEW_CHARS) }))
                .tools_used(tools_used)
                .metadata(json!({ "retry_count": retry_count }))
                .trace_id(trace_id),
        )
    }

    pub fn task_failed(
        &self,
        agent_name: &str,
        task: &str,
        trace_id: &str,
        info: &ErrorInfo,
        elapsed: Duration,
    ) -> String {
        self.logger.log_event(
            LogEvent::new(agent_name, events::TASK_EXECUTION, status::FAILED)
                .duration_ms(self.duration(elapsed))
                .input(json!({ "task": task }))
                .error_info(error_value(info))
                .metadata(json!({
                    "retry_count": info.retry_count,
                    "max_retries": info.max_retries,
                }))
                .trace_id(trace_id),
        )
    }

    pub fn reporting_started(&self, agent_name: &str, input: &str, results: usize) -> String {
        self.logger.log_event(
            LogEvent::new(agent_name, events::REPORTING_START, status::STARTED)
                .input(json!({
                    "question": preview(input, INPUT_PREVIEW_CHARS),
                    "worker_results": results,
                }))
                .trace_id(self.trace_id("report")),
        )
    }

    pub fn report_generated(
        &self,
        agent_name: &str,
        trace_id: &str,
        report: &str,
        elapsed: Duration,
    ) -> String {
        self.logger.log_event(
            LogEvent::new(agent_name, events::REPORT_GENERATION, status::COMPLETED)
                .duration_ms(self.duration(elapsed))
                .output(json!({
                    "report_length": report.chars().count(),
                    "report_preview": preview(report, INPUT_PREVIEW_CHARS),
                }))
                .trace_id(trace_id),
        )
    }

    /// Returns `None` when tool calls are not being logged.
    pub fn log_tool_usage(
        &self,
        agent_name: &str,
        tool_name: &str,
        input: Value,
        output: Option<Value>,
        elapsed: Duration,
        error: Option<&ErrorInfo>,
        trace_id: Option<&str>,
    ) -> Option<String> {
        if !self.logger.options().log_tool_calls || !self.track_tool_usage {
            return None;
        }
        let trace_id = trace_id
            .map(str::to_string)
            .unwrap_or_else(|| self.trace_id("tool"));
        let st = if error.is_some() {
            status::FAILED
        } else {
            status::COMPLETED
        };
        let mut event = LogEvent::new(agent_name, events::TOOL_USAGE, st)
            .duration_ms(self.duration(elapsed))
            .input(json!({ "tool_name": tool_name, "input": input }))
            .output(json!({ "output": output }))
            .metadata(json!({ "tool_name": tool_name }))
            .trace_id(trace_id);
        if let Some(info) = error {
            event = event.error_info(error_value(info));
        }
        Some(self.logger.log_event(event))
    }

    /// Logs an `error` event. With stack traces enabled the source chain of
    /// `err` is attached as `error_info.chain`.
    pub fn log_error(
        &self,
        agent_name: &str,
        info: &ErrorInfo,
        err: Option<&(dyn std::error::Error + 'static)>,
        context: Value,
        trace_id: Option<&str>,
    ) -> String {
        let mut error_info = error_value(info);
        if self.logger.options().include_stack_trace {
            if let (Some(err), Value::Object(map)) = (err, &mut error_info) {
                map.insert("chain".into(), json!(source_chain(err)));
            }
        }
        let trace_id = trace_id
            .map(str::to_string)
            .unwrap_or_else(|| self.trace_id("error"));
        self.logger.log_event(
            LogEvent::new(agent_name, events::ERROR, status::FAILED)
                .input(context)
                .error_info(error_info)
                .trace_id(trace_id),
        )
    }

    pub fn checkpoint(&self, event_type: &str, st: &str, trace_id: &str, metadata: Value) -> String {
        self.logger.log_event(
            LogEvent::new(COORDINATOR_AGENT, event_type, st)
                .metadata(metadata)
                .trace_id(trace_id),
        )
    }

    /// Aggregates today's entries of the current session.
    pub fn session_summary(&self) -> SessionSummary {
        let entries = self.logger.get_session_logs(usize::MAX);
        summarize(self.logger.session_id(), &entries)
    }
}

fn error_value(info: &ErrorInfo) -> Value {
    serde_json::to_value(info).unwrap_or_else(|_| json!({ "message": info.message }))
}

fn source_chain(err: &(dyn std::error::Error + 'static)) -> Vec<String> {
    let mut chain = vec![err.to_string()];
    let mut current = err.source();
    while let Some(source) = current {
        chain.push(source.to_string());
        current = source.source();
    }
    chain
}

/// Open pipeline session. Closing consumes the handle, so a session can be
/// ended once; a handle dropped without `end` is logged as cancelled.
pub struct SessionLog {
    agent: AgentLogger,
    trace_id: String,
    started: Instant,
    closed: bool,
}

impl SessionLog {
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn end(mut self, st: &str, output: Value) -> String {
        self.close(st, Some(output))
    }

    fn close(&mut self, st: &str, output: Option<Value>) -> String {
        self.closed = true;
        let mut event = LogEvent::new(COORDINATOR_AGENT, events::ORCHESTRA_END, st)
            .duration_ms(self.agent.duration(self.started.elapsed()))
            .metadata(json!({ "session_type": "orchestra_run" }))
            .trace_id(self.trace_id.clone());
        if let Some(output) = output {
            event = event.output(output);
        }
        self.agent.logger.log_event(event)
    }
}

impl Drop for SessionLog {
    fn drop(&mut self) {
        if !self.closed {
            self.close(status::CANCELLED, None);
        }
    }
}
