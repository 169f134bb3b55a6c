use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::worker::WorkerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    DataFormat,
    ToolExecution,
    Network,
    Validation,
    System,
    UserInput,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DataFormat => "data_format",
            Self::ToolExecution => "tool_execution",
            Self::Network => "network",
            Self::Validation => "validation",
            Self::System => "system",
            Self::UserInput => "user_input",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    pub fn for_category(category: ErrorCategory) -> Self {
        match category {
            ErrorCategory::System | ErrorCategory::DataFormat => Self::High,
            ErrorCategory::ToolExecution | ErrorCategory::Validation | ErrorCategory::Network => {
                Self::Medium
            }
            ErrorCategory::UserInput | ErrorCategory::Unknown => Self::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Keyword classifier for free-form error messages.
pub fn classify_message(message: &str) -> ErrorCategory {
    const RULES: &[(ErrorCategory, &[&str])] = &[
        (ErrorCategory::DataFormat, &["dataframe", "json", "format", "parse"]),
        (ErrorCategory::ToolExecution, &["tool", "function", "call"]),
        (ErrorCategory::Network, &["network", "connection", "timeout", "timed out"]),
        (ErrorCategory::Validation, &["validation", "invalid", "missing"]),
        (ErrorCategory::System, &["permission", "no such file", "not found", "i/o"]),
        (ErrorCategory::UserInput, &["name", "variable", "defined"]),
    ];

    let lower = message.to_lowercase();
    RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(ErrorCategory::Unknown)
}

fn suggested_actions(category: ErrorCategory, message: &str) -> Vec<String> {
    let mut actions: Vec<&str> = match category {
        ErrorCategory::DataFormat => vec![
            "check that the data matches the expected format",
            "verify that JSON payloads are well formed",
            "confirm that all required fields are present",
        ],
        ErrorCategory::ToolExecution => vec![
            "check the tool arguments",
            "verify the input data types",
            "confirm the tool is available",
        ],
        ErrorCategory::Validation => vec![
            "check the validity of the input data",
            "verify value ranges and constraints",
            "confirm the data is complete",
        ],
        ErrorCategory::UserInput => vec![
            "check variable names",
            "make sure variables are defined before use",
            "verify the scope of the referenced names",
        ],
        ErrorCategory::Network => vec![
            "check connectivity to the upstream service",
            "consider raising the per-task timeout",
        ],
        ErrorCategory::System => vec![
            "check file paths and permissions",
            "verify credentials and access rights",
        ],
        ErrorCategory::Unknown => Vec::new(),
    };

    let lower = message.to_lowercase();
    if lower.contains("dataframe") {
        actions.push("check the DataFrame constructor arguments");
    } else if lower.contains("not defined") {
        actions.push("define the variable before using it");
    } else if lower.contains("json") {
        actions.push("check the JSON string syntax");
    } else if lower.contains("index") {
        actions.push("check how the data index is set");
    }

    actions.into_iter().map(str::to_string).collect()
}

/// Snapshot of one observed failure. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub error_id: String,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub can_retry: bool,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub context: serde_json::Value,
}

impl ErrorInfo {
    pub fn from_worker_error(
        err: &WorkerError,
        retry_count: u32,
        max_retries: u32,
        context: serde_json::Value,
    ) -> Self {
        let message = err.to_string();
        let category = err.category();
        Self {
            error_id: short_error_id(),
            category,
            severity: err.severity(),
            error_type: err.kind().to_string(),
            suggested_actions: suggested_actions(category, &message),
            message,
            timestamp: Utc::now(),
            retry_count,
            max_retries,
            can_retry: err.is_retryable(),
            context,
        }
    }

    /// Describes a failure that did not come from a worker (planner, reporter,
    /// recorder). Such failures are never retried by this crate.
    pub fn from_message(
        error_type: impl Into<String>,
        message: impl Into<String>,
        context: serde_json::Value,
    ) -> Self {
        let message = message.into();
        let category = classify_message(&message);
        Self {
            error_id: short_error_id(),
            category,
            severity: ErrorSeverity::for_category(category),
            error_type: error_type.into(),
            suggested_actions: suggested_actions(category, &message),
            message,
            timestamp: Utc::now(),
            retry_count: 0,
            max_retries: 0,
            can_retry: false,
            context,
        }
    }

    /// One-line `[category/severity] message` form used in diagnostics.
    pub fn headline(&self) -> String {
        format!(
            "[{}/{}] {}",
            self.category.as_str().to_uppercase(),
            self.severity.as_str(),
            self.message
        )
    }
}

fn short_error_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    uuid[..8].to_string()
}

pub type ErrorCallback = Arc<dyn Fn(&ErrorInfo) + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorSummary {
    pub total_errors: usize,
    pub by_category: BTreeMap<ErrorCategory, usize>,
    pub by_severity: BTreeMap<ErrorSeverity, usize>,
    pub latest_errors: Vec<ErrorInfo>,
}

/// Classifies failures, keeps their history for the process lifetime and
/// notifies per-category callbacks.
#[derive(Default)]
pub struct ErrorHandler {
    history: Mutex<Vec<ErrorInfo>>,
    callbacks: Mutex<HashMap<ErrorCategory, Vec<ErrorCallback>>>,
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_callback(&self, category: ErrorCategory, callback: ErrorCallback) {
        let mut callbacks = self.callbacks.lock().unwrap_or_else(|e| e.into_inner());
        callbacks.entry(category).or_default().push(callback);
    }

    pub fn handle(
        &self,
        err: &WorkerError,
        retry_count: u32,
        max_retries: u32,
        context: serde_json::Value,
    ) -> ErrorInfo {
        let info = ErrorInfo::from_worker_error(err, retry_count, max_retries, context);
        self.record(info.clone());
        info
    }

    pub fn record(&self, info: ErrorInfo) {
        match info.severity {
            ErrorSeverity::Critical | ErrorSeverity::High => {
                tracing::error!(error_id = %info.error_id, "{}", info.headline())
            }
            ErrorSeverity::Medium => {
                tracing::warn!(error_id = %info.error_id, "{}", info.headline())
            }
            ErrorSeverity::Low => {
                tracing::info!(error_id = %info.error_id, "{}", info.headline())
            }
        }

        let callbacks = {
            let callbacks = self.callbacks.lock().unwrap_or_else(|e| e.into_inner());
            callbacks.get(&info.category).cloned().unwrap_or_default()
        };
        for callback in callbacks {
            callback(&info);
        }

        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(info);
    }

    pub fn can_retry(info: &ErrorInfo) -> bool {
        info.can_retry
            && info.retry_count < info.max_retries
            && info.severity != ErrorSeverity::Critical
    }

    pub fn history(&self) -> Vec<ErrorInfo> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn summary(&self) -> ErrorSummary {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let mut summary = ErrorSummary {
            total_errors: history.len(),
            ..ErrorSummary::default()
        };
        for info in history.iter() {
            *summary.by_category.entry(info.category).or_default() += 1;
            *summary.by_severity.entry(info.severity).or_default() += 1;
        }
        let skip = history.len().saturating_sub(5);
        summary.latest_errors = history.iter().skip(skip).cloned().collect();
        summary
    }
}
