//! Edit command - apply editor operations to a local rule document.

use std::fs;
use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::debug;

use mediparse_core::RuleSession;
use mediparse_core::rules::editor::EditOperation;

use super::{load_config, read_document, write_document};

/// Arguments for the edit command.
#[derive(Args)]
pub struct EditArgs {
    /// Rule document (legacy documents are migrated first)
    #[arg(required = true)]
    input: PathBuf,

    /// JSON file with an array of operations
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Single operation as JSON, e.g. '{"op": "addColumn", "typeIndex": 0}'
    #[arg(long = "op")]
    ops: Vec<String>,

    /// Output file (default: stdout)
    #[arg(short, long, conflicts_with = "in_place")]
    output: Option<PathBuf>,

    /// Overwrite the input file
    #[arg(long)]
    in_place: bool,

    /// Fail when an operation is rejected instead of skipping it
    #[arg(long)]
    strict: bool,
}

pub async fn run(args: EditArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let doc = read_document(&args.input)?;

    let mut ops: Vec<EditOperation> = match &args.script {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => Vec::new(),
    };
    for op in &args.ops {
        ops.push(serde_json::from_str(op)?);
    }
    if ops.is_empty() {
        anyhow::bail!("No operations given. Use --script or --op.");
    }

    let mut session = RuleSession::from_document("local", doc).with_editor_config(config.editor);
    let total = ops.len();
    let mut rejected = 0;

    for (i, op) in ops.into_iter().enumerate() {
        debug!(step = i + 1, ?op, "applying operation");
        if let Err(reason) = session.apply(op) {
            if args.strict {
                anyhow::bail!("Operation {} rejected: {}", i + 1, reason);
            }
            eprintln!("{} Operation {} skipped: {}", style("!").yellow(), i + 1, reason);
            rejected += 1;
        }
    }

    eprintln!(
        "{} Applied {} of {} operations",
        style("ℹ").blue(),
        total - rejected,
        total
    );

    let output = if args.in_place {
        Some(args.input.clone())
    } else {
        args.output
    };
    write_document(session.document(), output.as_deref())
}
