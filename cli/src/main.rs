use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;

use commands::cli;
use error::CliError;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

fn main() {
    let exit = match real_main() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let cfg = orchestra_core::config::load(args.config.as_deref())
        .map_err(|e| CliError::Config(format!("{e:#}")))?;
    init_tracing(&cfg.logging).map_err(CliError::Command)?;

    for issue in cfg.validate() {
        tracing::warn!("config: {issue}");
    }

    match args.command {
        cli::Commands::Config(cmd) => commands::config::handle(cmd, &cfg),
        cli::Commands::Logs(cmd) => commands::logs::handle(cmd, &cfg),
    }
}

fn exit_code_for_error(e: &CliError) -> i32 {
    // 0: success
    // 1: invalid configuration (config validate)
    // 11: config load error
    // 20: io / command error
    // 50: internal
    match e {
        CliError::Config(_) => 11,
        CliError::Io(_) => 20,
        CliError::Command(_) => 20,
        CliError::Anyhow(_) => 50,
    }
}

/// Diagnostics for the binary itself. Audit entries are echoed here too
/// (target `orchestra.audit`) when console output is on.
fn init_tracing(logging: &orchestra_core::config::LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(normalize_level(&logging.level)).map_err(|e| e.to_string())?,
    };

    let dir = logging.directory_path();
    std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
    let appender = tracing_appender::rolling::daily(dir, "orchestra-cli.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}

fn normalize_level(level: &str) -> String {
    match level.trim().to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_maps_to_tracing_warn() {
        assert_eq!(normalize_level("WARNING"), "warn");
        assert_eq!(normalize_level(" Debug "), "debug");
    }

    #[test]
    fn config_errors_use_their_own_exit_code() {
        assert_eq!(exit_code_for_error(&CliError::Config("bad".into())), 11);
        assert_eq!(exit_code_for_error(&CliError::Command("x".into())), 20);
    }
}
