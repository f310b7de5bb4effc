//! Subcommands of the `mediparse` binary.

pub mod config;
pub mod edit;
pub mod evaluate;
pub mod migrate;
pub mod rules;
pub mod validate;

use std::fs;
use std::path::{Path, PathBuf};

use console::style;

use mediparse_core::models::config::ConsoleConfig;
use mediparse_core::rules::validation::{Severity, ValidationIssue};
use mediparse_core::{ExtractionRuleDocument, migrate_value};

/// `<config dir>/mediparse/config.json`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mediparse")
        .join("config.json")
}

/// Config from `--config`, else the default file if present, else defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<ConsoleConfig> {
    if let Some(path) = config_path {
        return Ok(ConsoleConfig::from_file(Path::new(path))?);
    }
    let path = default_config_path();
    if path.exists() {
        Ok(ConsoleConfig::from_file(&path)?)
    } else {
        Ok(ConsoleConfig::default())
    }
}

/// Read a stored rule document (legacy or current) and migrate it.
pub fn read_document(path: &Path) -> anyhow::Result<ExtractionRuleDocument> {
    if !path.exists() {
        anyhow::bail!("Rules file not found: {}", path.display());
    }
    let content = fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&content)?;
    Ok(migrate_value(Some(value))?)
}

/// Write a document as pretty JSON to `output`, or stdout.
pub fn write_document(doc: &ExtractionRuleDocument, output: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(doc)?;
    match output {
        Some(path) => {
            fs::write(path, json)?;
            eprintln!("{} Rules written to {}", style("✓").green(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Print validation issues to stderr.
pub fn print_issues(issues: &[ValidationIssue]) {
    for issue in issues {
        let marker = match issue.severity {
            Severity::Error => style("✗").red(),
            Severity::Warning => style("!").yellow(),
        };
        eprintln!("  {} {}: {}", marker, issue.location, issue.message);
    }
}
