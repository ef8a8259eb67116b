//! Config command - view the webnodes configuration

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;
use webnodes_core::config::Config;

use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Validate the configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, format: OutputFormat, config_path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(format, config_path),
            ConfigCommand::Path => execute_path(format, config_path),
            ConfigCommand::Validate => execute_validate(format, config_path),
        }
    }
}

fn execute_show(format: OutputFormat, config_path: &Path) -> Result<()> {
    let formatter = get_formatter(matches!(format, OutputFormat::Json));
    let config = Config::load_or_default(config_path);

    info!(config_path = %config_path.display(), "Showing configuration");

    if matches!(format, OutputFormat::Json) {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        formatter.success(&format!("Configuration ({})", config_path.display()));
        if !config_path.exists() {
            formatter.warn("File not found, showing defaults");
        }
        formatter.info("");

        let yaml =
            serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
    }

    Ok(())
}

fn execute_path(format: OutputFormat, config_path: &Path) -> Result<()> {
    if matches!(format, OutputFormat::Json) {
        let formatter = get_formatter(true);
        formatter.print_json(&serde_json::json!({
            "config_path": config_path.display().to_string(),
            "exists": config_path.exists(),
        }));
    } else {
        println!("{}", config_path.display());
    }
    Ok(())
}

fn execute_validate(format: OutputFormat, config_path: &Path) -> Result<()> {
    let formatter = get_formatter(matches!(format, OutputFormat::Json));
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    let errors = config.validate();

    if matches!(format, OutputFormat::Json) {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "errors": messages,
        }));
    } else if errors.is_empty() {
        formatter.success(&format!("{} is valid", config_path.display()));
    } else {
        for error in &errors {
            formatter.error(&error.to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("Configuration has {} error(s)", errors.len())
    }
}
