//! Config check command handler.

use std::path::Path;

use anyhow::{Context, Result};

use inboxpilot::config::validate::{validate_config, validate_raw, Diagnostic, DiagnosticLevel};
use inboxpilot::config::Config;

use super::ConfigAction;

fn count(diagnostics: &[Diagnostic], level: DiagnosticLevel) -> usize {
    diagnostics.iter().filter(|d| d.level == level).count()
}

/// Validate configuration file.
pub(crate) async fn cmd_config(action: ConfigAction, path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Check => {
            let config_path = path.map(Path::to_path_buf).unwrap_or_else(Config::path);
            println!("Config file: {}", config_path.display());

            let mut diagnostics = Vec::new();
            if config_path.exists() {
                let content =
                    std::fs::read_to_string(&config_path).context("Failed to read config file")?;
                let raw: serde_json::Value = match serde_json::from_str(&content) {
                    Ok(v) => v,
                    Err(e) => {
                        println!("[ERROR] Invalid JSON: {}", e);
                        return Ok(());
                    }
                };
                diagnostics.extend(validate_raw(&raw));
            } else {
                println!("[OK] No config file found (using defaults)");
            }

            match Config::load_from_path(&config_path) {
                Ok(config) => diagnostics.extend(validate_config(&config)),
                Err(e) => println!("[ERROR] {}", e),
            }

            for diag in &diagnostics {
                println!("{}", diag);
            }

            let errors = count(&diagnostics, DiagnosticLevel::Error);
            let warnings = count(&diagnostics, DiagnosticLevel::Warn);
            if errors == 0 && warnings == 0 {
                println!("\nConfiguration looks good!");
            } else {
                println!("\nFound {} error(s), {} warning(s)", errors, warnings);
            }
        }
    }
    Ok(())
}
