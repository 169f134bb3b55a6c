//! Subtask execution: worker registry, retry policy, per-attempt timeout and
//! checkpointed batches.
//!
//! ```text
//! TaskRecorder (plan.todo)
//!   ↓
//! ExecutionEngine::execute_tasks()            one pass, optional fail-fast
//! ExecutionEngine::execute_with_checkpoints() batches + AbortPolicy
//!   ↓
//! run_subtask(): Pending → Running ─(retry)→ Completed | Failed
//!   ↓
//! ExecutionOutcome { results, errors, executions }
//! ```

mod checkpoint;
mod engine;
mod registry;
mod retry;
pub mod traits;
pub mod types;

pub use checkpoint::{checkpoint_batches, AbortPolicy};
pub use engine::{ExecutionEngine, ExecutionEngineBuilder};
pub use registry::WorkerRegistry;
pub use retry::{ExponentialBackoff, FixedDelay};
pub use traits::{RetryStrategy, RunContext, Worker, WorkerEvent};
pub use types::{ExecutionOutcome, ExecutionSummary, ProgressEvent, TaskExecution, TaskStatus};
