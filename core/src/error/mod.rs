mod classify;
#[allow(clippy::module_inception)]
mod error;
mod worker;

pub use classify::{
    classify_message, ErrorCallback, ErrorCategory, ErrorHandler, ErrorInfo, ErrorSeverity,
    ErrorSummary,
};
pub use error::{OrchestraError, RecorderError, Stage, TaskFailure};
pub use worker::WorkerError;
