//! Rules command - talk to the backend.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use mediparse_core::models::config::{ConsoleConfig, EditorConfig};
use mediparse_core::rules::editor::EditOperation;
use mediparse_core::rules::validation::has_errors;
use mediparse_core::{HttpRulesBackend, RuleSession, RulesBackend, validate_document};

use super::{load_config, print_issues, read_document, write_document};

/// Arguments for the rules command.
#[derive(Args)]
pub struct RulesArgs {
    /// Backend base URL (overrides config)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Bearer token (overrides config)
    #[arg(long, env = "MEDIPARSE_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: RulesCommand,
}

#[derive(Subcommand)]
enum RulesCommand {
    /// Open the rules of a contract file as the console would
    Fetch {
        /// Contract file id
        id: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the stored document without migration or detection
        #[arg(long)]
        raw: bool,
    },

    /// Save a rule document for a contract file
    Save {
        /// Contract file id
        id: String,

        /// Rule document (legacy documents are migrated first)
        input: PathBuf,

        /// Save even if validation reports errors
        #[arg(long)]
        force: bool,
    },

    /// Ask the backend to detect table types
    Detect {
        /// Contract file id
        id: String,
    },

    /// Open, apply an edit script and save
    Apply {
        /// Contract file id
        id: String,

        /// JSON array of editor operations
        script: PathBuf,
    },
}

pub async fn run(args: RulesArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let backend = backend(&config, args.base_url, args.token);

    match args.command {
        RulesCommand::Fetch { id, output, raw } => {
            fetch(&backend, &id, config.editor, output, raw).await
        }
        RulesCommand::Save { id, input, force } => save(&backend, &id, input, force).await,
        RulesCommand::Detect { id } => detect(&backend, &id).await,
        RulesCommand::Apply { id, script } => apply(&backend, &id, config.editor, script).await,
    }
}

fn backend(
    config: &ConsoleConfig,
    base_url: Option<String>,
    token: Option<String>,
) -> HttpRulesBackend {
    let mut api = config.api.clone();
    if let Some(url) = base_url {
        api.base_url = url;
    }
    if token.is_some() {
        api.token = token;
    }
    HttpRulesBackend::from_config(&api)
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

async fn fetch(
    backend: &HttpRulesBackend,
    id: &str,
    editor: EditorConfig,
    output: Option<PathBuf>,
    raw: bool,
) -> anyhow::Result<()> {
    let pb = spinner("Loading rules...");

    if raw {
        let stored = backend.fetch_rules(id).await;
        pb.finish_and_clear();
        let json = match stored? {
            Some(value) => serde_json::to_string_pretty(&value)?,
            None => "null".to_string(),
        };
        match output {
            Some(path) => fs::write(path, json)?,
            None => println!("{}", json),
        }
        return Ok(());
    }

    let session = RuleSession::open_with_config(backend, id, editor).await;
    pb.finish_and_clear();
    let session = session?;

    info!(table_types = session.document().table_types.len(), "rules loaded");
    write_document(session.document(), output.as_deref())
}

async fn save(
    backend: &HttpRulesBackend,
    id: &str,
    input: PathBuf,
    force: bool,
) -> anyhow::Result<()> {
    let doc = read_document(&input)?;

    let issues = validate_document(&doc);
    if !issues.is_empty() {
        eprintln!("{}", style("Validation issues:").yellow());
        print_issues(&issues);
    }
    if has_errors(&issues) && !force {
        anyhow::bail!("Rule document has errors. Fix them or use --force to save anyway.");
    }

    let mut session = RuleSession::from_document(id, doc);
    let pb = spinner("Saving rules...");
    let result = session.save(backend).await;
    pb.finish_and_clear();

    let summary = result?;
    println!(
        "{} Saved rules for contract file {} ({})",
        style("✓").green(),
        summary.id,
        summary.file_name
    );
    Ok(())
}

async fn detect(backend: &HttpRulesBackend, id: &str) -> anyhow::Result<()> {
    let pb = spinner("Detecting table types...");
    let detected = backend.detect_table_types(id).await;
    pb.finish_and_clear();
    let detected = detected?;

    if detected.is_empty() {
        eprintln!("{} No table types detected.", style("ℹ").blue());
    }
    println!("{}", serde_json::to_string_pretty(&detected)?);
    Ok(())
}

async fn apply(
    backend: &HttpRulesBackend,
    id: &str,
    editor: EditorConfig,
    script: PathBuf,
) -> anyhow::Result<()> {
    let ops: Vec<EditOperation> = serde_json::from_str(&fs::read_to_string(&script)?)?;

    let mut session = RuleSession::open_with_config(backend, id, editor).await?;
    for op in ops {
        if let Err(rejected) = session.apply(op) {
            eprintln!("{} Skipped: {}", style("!").yellow(), rejected);
        }
    }

    if !session.is_dirty() {
        println!("{} No changes to save.", style("ℹ").blue());
        return Ok(());
    }

    let summary = session.save(backend).await?;
    println!(
        "{} Saved rules for contract file {}",
        style("✓").green(),
        summary.id
    );
    Ok(())
}
