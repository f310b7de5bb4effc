//! Validate command - check rule documents before saving.

use std::path::PathBuf;

use clap::Args;
use console::style;
use glob::glob;
use tracing::debug;

use mediparse_core::rules::validation::has_errors;
use mediparse_core::validate_document;

use super::{print_issues, read_document};

/// Arguments for the validate command.
#[derive(Args)]
pub struct ValidateArgs {
    /// Rule document or glob pattern (e.g. "rules/*.json")
    #[arg(required = true)]
    input: String,

    /// Treat warnings as errors
    #[arg(long)]
    strict: bool,
}

pub async fn run(args: ValidateArgs) -> anyhow::Result<()> {
    let files: Vec<PathBuf> = glob(&args.input)?.filter_map(|r| r.ok()).collect();

    if files.is_empty() {
        anyhow::bail!("No files match: {}", args.input);
    }

    let mut failed = 0;
    for path in &files {
        debug!("Validating {}", path.display());
        let doc = match read_document(path) {
            Ok(doc) => doc,
            Err(e) => {
                eprintln!("{} {}: {}", style("✗").red(), path.display(), e);
                failed += 1;
                continue;
            }
        };

        let issues = validate_document(&doc);
        let rejected = has_errors(&issues) || (args.strict && !issues.is_empty());

        if issues.is_empty() {
            println!("{} {}", style("✓").green(), path.display());
        } else {
            let marker = if rejected { style("✗").red() } else { style("!").yellow() };
            println!("{} {} ({} issues)", marker, path.display(), issues.len());
            print_issues(&issues);
        }
        if rejected {
            failed += 1;
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} documents failed validation", failed, files.len());
    }
    Ok(())
}
