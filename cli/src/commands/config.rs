use orchestra_core::config::OrchestraConfig;

use crate::error::CliError;

use super::cli::{ConfigCommand, ConfigFormat};

pub fn handle(cmd: ConfigCommand, cfg: &OrchestraConfig) -> Result<i32, CliError> {
    match cmd {
        ConfigCommand::Show { format } => {
            println!("{}", render(cfg, format)?);
            Ok(0)
        }
        ConfigCommand::Validate => {
            let issues = cfg.validate();
            if issues.is_empty() {
                println!("configuration is valid");
                return Ok(0);
            }
            for issue in &issues {
                println!("- {issue}");
            }
            Ok(1)
        }
        ConfigCommand::Init => {
            cfg.ensure_directories()?;
            println!("workspace: {}", cfg.workspace_root);
            println!("temp:      {}", cfg.temp_dir);
            println!("logs:      {}", cfg.logging.directory);
            Ok(0)
        }
    }
}

fn render(cfg: &OrchestraConfig, format: ConfigFormat) -> Result<String, CliError> {
    match format {
        ConfigFormat::Toml => {
            toml::to_string_pretty(cfg).map_err(|e| CliError::Config(e.to_string()))
        }
        ConfigFormat::Json => {
            serde_json::to_string_pretty(cfg).map_err(|e| CliError::Config(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_toml_loads_back() {
        let cfg = OrchestraConfig::default();
        let text = render(&cfg, ConfigFormat::Toml).unwrap();
        let parsed: OrchestraConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.execution, cfg.execution);
        assert_eq!(parsed.logging, cfg.logging);
    }
}
