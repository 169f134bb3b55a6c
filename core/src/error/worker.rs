use std::time::Duration;

use thiserror::Error;

use super::classify::{classify_message, ErrorCategory, ErrorSeverity};

/// Failure raised by a worker (or by the engine on its behalf) for one attempt.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("task execution timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("data format error: {0}")]
    DataFormat(String),

    #[error("tool execution failed: {0}")]
    ToolExecution(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid user input: {0}")]
    UserInput(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fatal {category} error: {message}")]
    Fatal {
        category: ErrorCategory,
        message: String,
    },

    #[error("{0}")]
    Other(String),
}

impl WorkerError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    pub fn fatal(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self::Fatal {
            category,
            message: message.into(),
        }
    }

    /// Stable short name used as `error_info.type` in the audit log.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Connection(_) => "connection",
            Self::Authentication(_) => "authentication",
            Self::PermissionDenied(_) => "permission_denied",
            Self::DataFormat(_) => "data_format",
            Self::ToolExecution(_) => "tool_execution",
            Self::Validation(_) => "validation",
            Self::Configuration(_) => "configuration",
            Self::UserInput(_) => "user_input",
            Self::Io(_) => "io",
            Self::Fatal { .. } => "fatal",
            Self::Other(_) => "other",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Timeout(_) | Self::Connection(_) => ErrorCategory::Network,
            Self::Authentication(_) | Self::PermissionDenied(_) | Self::Io(_) => {
                ErrorCategory::System
            }
            Self::Configuration(_) => ErrorCategory::System,
            Self::DataFormat(_) => ErrorCategory::DataFormat,
            Self::ToolExecution(_) => ErrorCategory::ToolExecution,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::UserInput(_) => ErrorCategory::UserInput,
            Self::Fatal { category, .. } => *category,
            Self::Other(message) => classify_message(message),
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Fatal { .. } | Self::Configuration(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::for_category(self.category()),
        }
    }

    /// Validation, configuration, credential and explicit fatal failures are
    /// never retried, whatever budget is left.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Validation(_)
                | Self::Configuration(_)
                | Self::Authentication(_)
                | Self::PermissionDenied(_)
                | Self::Fatal { .. }
        )
    }

    /// Failures that abort a checkpointed run as soon as a batch reports one.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::Connection(_)
                | Self::Authentication(_)
                | Self::PermissionDenied(_)
        )
    }
}
