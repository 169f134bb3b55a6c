mod load;
mod types;

pub use load::{
    apply_env_overrides, load, load_from_env, load_from_file, load_from_value, save_to_file,
    ENV_PREFIX,
};
pub use types::{
    ExecutionConfig, LoggingConfig, MonitoringConfig, OrchestraConfig, VALID_LOG_LEVELS,
};
