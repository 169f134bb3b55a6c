use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "orchestra", version, about = "Inspect orchestra configuration and audit logs")]
pub struct Args {
    /// Configuration file (TOML, or JSON by extension). Defaults to ./orchestra.toml when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show, validate or initialise the effective configuration.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Query and maintain the audit log directory.
    #[command(subcommand)]
    Logs(LogsCommand),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    Show {
        #[arg(long, value_enum, default_value_t = ConfigFormat::Toml)]
        format: ConfigFormat,
    },
    /// Exit with status 1 when any setting is out of range.
    Validate,
    /// Create the workspace, temp and log directories.
    Init,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum LogsCommand {
    Query(QueryArgs),
    /// Per-agent event counts, durations and errors of one session.
    Summary {
        #[arg(long)]
        session: String,

        #[arg(long, value_parser = parse_day)]
        date: Option<NaiveDate>,
    },
    /// Delete old log files, then keep at most `max_files`.
    Clean {
        /// Retention in days; defaults to monitoring.metrics_retention_days.
        #[arg(long)]
        days: Option<u64>,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct QueryArgs {
    #[arg(long)]
    pub session: Option<String>,

    #[arg(long)]
    pub trace: Option<String>,

    #[arg(long = "event")]
    pub event_type: Option<String>,

    /// Day to read, as YYYYMMDD (local). Defaults to today.
    #[arg(long, value_parser = parse_day)]
    pub date: Option<NaiveDate>,

    #[arg(long)]
    pub limit: Option<usize>,

    /// Print raw JSON lines instead of the one-line text form.
    #[arg(long)]
    pub json: bool,
}

pub fn parse_day(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d"))
        .map_err(|e| format!("expected YYYYMMDD: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_day_accepts_both_forms() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(parse_day("20261019"), Ok(day));
        assert_eq!(parse_day("2026-10-19"), Ok(day));
        assert!(parse_day("19/10/2026").is_err());
    }

    #[test]
    fn args_parse_query_filters() {
        let args = Args::try_parse_from([
            "orchestra", "logs", "query", "--session", "s1", "--event", "error", "--limit", "5",
            "--date", "20261019",
        ])
        .unwrap();
        let Commands::Logs(LogsCommand::Query(query)) = args.command else {
            panic!("expected logs query");
        };
        assert_eq!(query.session.as_deref(), Some("s1"));
        assert_eq!(query.event_type.as_deref(), Some("error"));
        assert_eq!(query.limit, Some(5));
        assert!(!query.json);
    }
}
