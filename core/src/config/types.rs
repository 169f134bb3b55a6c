use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Log levels accepted by `LoggingConfig::level`.
pub const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "warning", "error"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestraConfig {
    #[serde(default = "default_workspace_root")]
    pub workspace_root: String,

    #[serde(default = "default_temp_dir")]
    pub temp_dir: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Problems found while reading the environment (unparseable values).
    /// They are surfaced by `validate()` rather than failing the load.
    #[serde(skip)]
    pub load_issues: Vec<String>,
}

fn default_workspace_root() -> String {
    "./workspace".to_string()
}

fn default_temp_dir() -> String {
    "./temp".to_string()
}

impl Default for OrchestraConfig {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            temp_dir: default_temp_dir(),
            logging: LoggingConfig::default(),
            execution: ExecutionConfig::default(),
            monitoring: MonitoringConfig::default(),
            load_issues: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// EnvFilter-style level: "debug", "info", "warning", ...
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Directory holding the daily `orchestra_YYYYMMDD.jsonl` files.
    #[serde(default = "default_logging_directory")]
    pub directory: String,

    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: i64,

    #[serde(default = "default_max_files")]
    pub max_files: i64,

    /// If true, audit entries are echoed through `tracing`.
    #[serde(default = "default_true")]
    pub console: bool,

    #[serde(default = "default_true")]
    pub include_stack_trace: bool,

    #[serde(default = "default_true")]
    pub log_tool_calls: bool,

    #[serde(default = "default_true")]
    pub log_performance: bool,
}

fn default_true() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

fn default_logging_directory() -> String {
    "./logs".to_string()
}

fn default_max_file_size_mb() -> i64 {
    100
}

fn default_max_files() -> i64 {
    7
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_logging_level(),
            directory: default_logging_directory(),
            max_file_size_mb: default_max_file_size_mb(),
            max_files: default_max_files(),
            console: true,
            include_stack_trace: true,
            log_tool_calls: true,
            log_performance: true,
        }
    }
}

impl LoggingConfig {
    pub fn directory_path(&self) -> PathBuf {
        PathBuf::from(&self.directory)
    }

    pub fn max_file_bytes(&self) -> u64 {
        (self.max_file_size_mb.max(1) as u64).saturating_mul(1024 * 1024)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: i64,

    /// Seconds between attempts of the same subtask.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,

    /// Seconds allowed for a single attempt.
    #[serde(default = "default_timeout_per_task")]
    pub timeout_per_task: f64,

    #[serde(default)]
    pub fail_fast: bool,

    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: i64,

    #[serde(default = "default_true")]
    pub enable_checkpoints: bool,

    #[serde(default)]
    pub parallel_execution: bool,

    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: i64,
}

fn default_max_retries() -> i64 {
    3
}

fn default_retry_delay() -> f64 {
    1.0
}

fn default_timeout_per_task() -> f64 {
    300.0
}

fn default_checkpoint_interval() -> i64 {
    3
}

fn default_max_concurrent_tasks() -> i64 {
    3
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            timeout_per_task: default_timeout_per_task(),
            fail_fast: false,
            checkpoint_interval: default_checkpoint_interval(),
            enable_checkpoints: true,
            parallel_execution: false,
            max_concurrent_tasks: default_max_concurrent_tasks(),
        }
    }
}

impl ExecutionConfig {
    // Accessors clamp into the valid range; `validate()` reports the raw values.

    pub fn max_retries(&self) -> u32 {
        self.max_retries.clamp(0, u32::MAX as i64) as u32
    }

    pub fn retry_delay(&self) -> Duration {
        secs_to_duration(self.retry_delay)
    }

    pub fn timeout_per_task(&self) -> Duration {
        let timeout = secs_to_duration(self.timeout_per_task);
        if timeout.is_zero() {
            Duration::from_secs_f64(default_timeout_per_task())
        } else {
            timeout
        }
    }

    pub fn checkpoint_interval(&self) -> usize {
        self.checkpoint_interval.max(1) as usize
    }

    pub fn max_concurrent_tasks(&self) -> usize {
        self.max_concurrent_tasks.max(1) as usize
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitoringConfig {
    #[serde(default = "default_true")]
    pub enable_performance_monitoring: bool,

    #[serde(default = "default_true")]
    pub track_tool_usage: bool,

    #[serde(default = "default_metrics_retention_days")]
    pub metrics_retention_days: i64,
}

fn default_metrics_retention_days() -> i64 {
    30
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_performance_monitoring: true,
            track_tool_usage: true,
            metrics_retention_days: default_metrics_retention_days(),
        }
    }
}

impl OrchestraConfig {
    /// Returns every constraint violation; an empty list means the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = self.load_issues.clone();

        let logging = &self.logging;
        if logging.max_file_size_mb <= 0 {
            errors.push(format!(
                "logging.max_file_size_mb must be greater than 0 (got {})",
                logging.max_file_size_mb
            ));
        }
        if logging.max_files <= 0 {
            errors.push(format!(
                "logging.max_files must be greater than 0 (got {})",
                logging.max_files
            ));
        }
        if !VALID_LOG_LEVELS.contains(&logging.level.trim().to_ascii_lowercase().as_str()) {
            errors.push(format!("logging.level is not a valid level: {}", logging.level));
        }
        if logging.directory.trim().is_empty() {
            errors.push("logging.directory must not be empty".to_string());
        }

        let execution = &self.execution;
        if execution.max_retries < 0 {
            errors.push(format!(
                "execution.max_retries must not be negative (got {})",
                execution.max_retries
            ));
        }
        if execution.retry_delay.is_nan() || execution.retry_delay < 0.0 {
            errors.push(format!(
                "execution.retry_delay must not be negative (got {})",
                execution.retry_delay
            ));
        }
        if execution.timeout_per_task.is_nan() || execution.timeout_per_task <= 0.0 {
            errors.push(format!(
                "execution.timeout_per_task must be greater than 0 (got {})",
                execution.timeout_per_task
            ));
        }
        if execution.checkpoint_interval <= 0 {
            errors.push(format!(
                "execution.checkpoint_interval must be greater than 0 (got {})",
                execution.checkpoint_interval
            ));
        }
        if execution.max_concurrent_tasks <= 0 {
            errors.push(format!(
                "execution.max_concurrent_tasks must be greater than 0 (got {})",
                execution.max_concurrent_tasks
            ));
        }

        if self.monitoring.metrics_retention_days <= 0 {
            errors.push(format!(
                "monitoring.metrics_retention_days must be greater than 0 (got {})",
                self.monitoring.metrics_retention_days
            ));
        }

        if self.workspace_root.trim().is_empty() {
            errors.push("workspace_root must not be empty".to_string());
        }
        if self.temp_dir.trim().is_empty() {
            errors.push("temp_dir must not be empty".to_string());
        }

        errors
    }

    /// Creates workspace, temp and log directories. Safe to call repeatedly.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in [&self.workspace_root, &self.temp_dir, &self.logging.directory] {
            let dir = dir.trim();
            if dir.is_empty() {
                continue;
            }
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
