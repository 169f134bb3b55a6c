use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use serde_json::Value;

use super::types::OrchestraConfig;

pub const ENV_PREFIX: &str = "ORCHESTRA_";

/// Defaults overlaid with `ORCHESTRA_*` environment variables.
pub fn load_from_env() -> OrchestraConfig {
    let mut cfg = OrchestraConfig::default();
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    cfg
}

/// Defaults → environment → explicit dict. Keys present in `value` win.
pub fn load_from_value(value: Value) -> anyhow::Result<OrchestraConfig> {
    merge_over(load_from_env(), value)
}

/// Defaults → environment → file. TOML unless the extension is `.json`.
pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<OrchestraConfig> {
    let value = read_config_value(path.as_ref())?;
    merge_over(load_from_env(), value)
}

/// Loads from `path` when given, otherwise `./orchestra.toml` if present,
/// otherwise environment and defaults only.
pub fn load(path: Option<&Path>) -> anyhow::Result<OrchestraConfig> {
    if let Some(path) = path {
        return load_from_file(path);
    }

    let local_config = Path::new("orchestra.toml");
    if local_config.exists() {
        load_from_file(local_config)
    } else {
        Ok(load_from_env())
    }
}

pub fn save_to_file(cfg: &OrchestraConfig, path: impl AsRef<Path>) -> anyhow::Result<()> {
    let path = path.as_ref();
    let body = if is_json(path) {
        serde_json::to_string_pretty(cfg)?
    } else {
        toml::to_string_pretty(cfg)?
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, body).with_context(|| format!("write config {}", path.display()))?;
    Ok(())
}

fn read_config_value(path: &Path) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    if is_json(path) {
        serde_json::from_str(&raw).with_context(|| format!("parse json config {}", path.display()))
    } else {
        let table: toml::Value =
            toml::from_str(&raw).with_context(|| format!("parse toml config {}", path.display()))?;
        Ok(serde_json::to_value(table)?)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

fn merge_over(base: OrchestraConfig, overlay: Value) -> anyhow::Result<OrchestraConfig> {
    let load_issues = base.load_issues.clone();
    let mut merged = serde_json::to_value(&base)?;
    merge_json(&mut merged, overlay);
    let mut cfg: OrchestraConfig =
        serde_json::from_value(merged).context("config has a field of the wrong type")?;
    cfg.load_issues = load_issues;
    Ok(cfg)
}

fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Applies `ORCHESTRA_*` overrides read through `lookup`. Values that do not
/// parse keep the current setting and are recorded in `load_issues`.
pub fn apply_env_overrides<F>(cfg: &mut OrchestraConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let mut env = EnvReader {
        lookup,
        issues: Vec::new(),
    };

    let logging = &mut cfg.logging;
    env.bool("LOGGING_ENABLED", &mut logging.enabled);
    env.string("LOG_LEVEL", &mut logging.level);
    env.string("LOG_DIR", &mut logging.directory);
    env.parse("LOG_MAX_FILE_SIZE_MB", &mut logging.max_file_size_mb);
    env.parse("LOG_MAX_FILES", &mut logging.max_files);
    env.bool("LOG_CONSOLE", &mut logging.console);
    env.bool("LOG_STACK_TRACE", &mut logging.include_stack_trace);
    env.bool("LOG_TOOL_CALLS", &mut logging.log_tool_calls);
    env.bool("LOG_PERFORMANCE", &mut logging.log_performance);

    let execution = &mut cfg.execution;
    env.parse("MAX_RETRIES", &mut execution.max_retries);
    env.seconds("RETRY_DELAY", &mut execution.retry_delay);
    env.seconds("TASK_TIMEOUT", &mut execution.timeout_per_task);
    env.bool("FAIL_FAST", &mut execution.fail_fast);
    env.parse("CHECKPOINT_INTERVAL", &mut execution.checkpoint_interval);
    env.bool("ENABLE_CHECKPOINTS", &mut execution.enable_checkpoints);
    env.bool("PARALLEL_EXECUTION", &mut execution.parallel_execution);
    env.parse("MAX_CONCURRENT_TASKS", &mut execution.max_concurrent_tasks);

    let monitoring = &mut cfg.monitoring;
    env.bool("ENABLE_MONITORING", &mut monitoring.enable_performance_monitoring);
    env.bool("TRACK_TOOLS", &mut monitoring.track_tool_usage);
    env.parse("METRICS_RETENTION_DAYS", &mut monitoring.metrics_retention_days);

    env.string("WORKSPACE_ROOT", &mut cfg.workspace_root);
    env.string("TEMP_DIR", &mut cfg.temp_dir);

    cfg.load_issues.extend(env.issues);
}

struct EnvReader<F> {
    lookup: F,
    issues: Vec<String>,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<(String, String)> {
        let key = format!("{ENV_PREFIX}{name}");
        let value = (self.lookup)(&key)?;
        let value = value.trim().to_string();
        if value.is_empty() {
            return None;
        }
        Some((key, value))
    }

    fn string(&mut self, name: &str, slot: &mut String) {
        if let Some((_, value)) = self.get(name) {
            *slot = value;
        }
    }

    fn bool(&mut self, name: &str, slot: &mut bool) {
        let Some((key, value)) = self.get(name) else {
            return;
        };
        match value.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => *slot = true,
            "false" | "0" | "no" | "off" => *slot = false,
            _ => self
                .issues
                .push(format!("{key}: expected a boolean, got {value:?}")),
        }
    }

    fn parse<T: FromStr>(&mut self, name: &str, slot: &mut T) {
        let Some((key, value)) = self.get(name) else {
            return;
        };
        match value.parse::<T>() {
            Ok(parsed) => *slot = parsed,
            Err(_) => self
                .issues
                .push(format!("{key}: expected a number, got {value:?}")),
        }
    }

    /// NaN and infinities cannot survive the JSON layering, so they are
    /// refused here like any other unparseable value.
    fn seconds(&mut self, name: &str, slot: &mut f64) {
        let Some((key, value)) = self.get(name) else {
            return;
        };
        match value.parse::<f64>() {
            Ok(parsed) if parsed.is_finite() => *slot = parsed,
            _ => self
                .issues
                .push(format!("{key}: expected a finite number of seconds, got {value:?}")),
        }
    }
}
