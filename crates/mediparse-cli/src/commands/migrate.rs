//! Migrate command - upgrade a stored document to the table type structure.

use std::path::PathBuf;

use clap::Args;
use console::style;

use mediparse_core::StoredDocument;

use super::write_document;

/// Arguments for the migrate command.
#[derive(Args)]
pub struct MigrateArgs {
    /// Stored rule document (JSON)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

pub async fn run(args: MigrateArgs) -> anyhow::Result<()> {
    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let content = std::fs::read_to_string(&args.input)?;
    let stored: StoredDocument = serde_json::from_str(&content)?;

    if matches!(stored, StoredDocument::Legacy(_)) {
        eprintln!(
            "{} Legacy document, wrapping into a single table type.",
            style("ℹ").blue()
        );
    }

    write_document(&stored.migrate(), args.output.as_deref())
}
