use std::ops::Range;

use crate::error::TaskFailure;

/// Splits `0..total` into consecutive ranges of `interval` items; the last
/// range may be shorter.
pub fn checkpoint_batches(total: usize, interval: usize) -> Vec<Range<usize>> {
    let interval = interval.max(1);
    (0..total)
        .step_by(interval)
        .map(|start| start..(start + interval).min(total))
        .collect()
}

/// Decides whether a checkpointed run stops after a batch with failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortPolicy {
    /// Abort when a batch produced more than this many failures.
    pub max_errors_per_batch: usize,
    /// Abort on any timeout, connection, authentication or permission failure.
    pub abort_on_critical: bool,
}

impl Default for AbortPolicy {
    fn default() -> Self {
        Self {
            max_errors_per_batch: 3,
            abort_on_critical: true,
        }
    }
}

impl AbortPolicy {
    pub fn should_abort(&self, failures: &[TaskFailure]) -> bool {
        failures.len() > self.max_errors_per_batch
            || (self.abort_on_critical && failures.iter().any(TaskFailure::is_critical))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorInfo, WorkerError};
    use std::time::Duration;

    fn failure(err: WorkerError) -> TaskFailure {
        TaskFailure {
            position: 1,
            agent_name: "A".into(),
            task: "t".into(),
            trace_id: "task_000001_00000000".into(),
            attempts: 1,
            info: ErrorInfo::from_worker_error(&err, 0, 0, serde_json::Value::Null),
            source: err,
        }
    }

    #[test]
    fn batches_cover_all_tasks_in_order() {
        assert_eq!(checkpoint_batches(5, 3), vec![0..3, 3..5]);
        assert_eq!(checkpoint_batches(6, 3), vec![0..3, 3..6]);
        assert_eq!(checkpoint_batches(2, 5), vec![0..2]);
        assert_eq!(checkpoint_batches(0, 3), Vec::<Range<usize>>::new());
        assert_eq!(checkpoint_batches(3, 0), vec![0..1, 1..2, 2..3]);
        for (n, k) in [(1, 1), (7, 2), (10, 4), (9, 3)] {
            assert_eq!(checkpoint_batches(n, k).len(), n.div_ceil(k));
        }
    }

    #[test]
    fn critical_failure_aborts() {
        let policy = AbortPolicy::default();
        assert!(policy.should_abort(&[failure(WorkerError::Timeout(Duration::from_secs(1)))]));
        assert!(policy.should_abort(&[failure(WorkerError::Authentication("expired".into()))]));
        assert!(!policy.should_abort(&[failure(WorkerError::ToolExecution("chart".into()))]));
    }

    #[test]
    fn more_than_three_failures_abort() {
        let policy = AbortPolicy::default();
        let three: Vec<_> = (0..3)
            .map(|_| failure(WorkerError::DataFormat("bad".into())))
            .collect();
        assert!(!policy.should_abort(&three));
        let four: Vec<_> = (0..4)
            .map(|_| failure(WorkerError::DataFormat("bad".into())))
            .collect();
        assert!(policy.should_abort(&four));
    }
}
