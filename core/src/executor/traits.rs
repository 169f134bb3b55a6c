use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;

use crate::error::{ErrorHandler, ErrorInfo, WorkerError};
use crate::recorder::{Subtask, WorkerResult};

/// What a worker sees about the run it is part of.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// The caller's original request.
    pub task: String,
    pub session_id: String,
    /// Trace id of the whole pipeline run.
    pub run_trace_id: String,
    /// Trace id of this subtask; shared by all of its attempts.
    pub trace_id: String,
    /// 1-based position in the plan.
    pub position: usize,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Results recorded before this subtask was dispatched.
    pub prior_results: Arc<[WorkerResult]>,
}

#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Progress(Value),
    Finished(WorkerResult),
}

#[async_trait]
pub trait Worker: Send + Sync {
    /// Registry key; plans address workers by this name.
    fn name(&self) -> &str;

    async fn execute(&self, subtask: &Subtask, ctx: RunContext) -> Result<WorkerResult, WorkerError>;

    /// Streams progress before the final result. The stream must end with
    /// `Finished` or an error.
    fn execute_streamed<'a>(
        &'a self,
        subtask: &'a Subtask,
        ctx: RunContext,
    ) -> BoxStream<'a, Result<WorkerEvent, WorkerError>> {
        stream::once(async move { self.execute(subtask, ctx).await.map(WorkerEvent::Finished) })
            .boxed()
    }
}

/// Decides whether and when a failed attempt is retried.
pub trait RetryStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn max_retries(&self) -> u32;

    /// Delay before the retry that follows `retry_count` earlier retries.
    fn next_delay(&self, retry_count: u32) -> Duration;

    fn should_retry(&self, info: &ErrorInfo) -> bool {
        ErrorHandler::can_retry(info)
    }
}
