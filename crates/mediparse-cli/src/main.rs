//! CLI for contract extraction rules.

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{config, edit, evaluate, migrate, rules, validate};

/// mediparse - edit, validate and preview price table extraction rules
#[derive(Parser)]
#[command(name = "mediparse")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, save and detect rules on the backend
    Rules(rules::RulesArgs),

    /// Upgrade a stored rule document to the table type structure
    Migrate(migrate::MigrateArgs),

    /// Check rule documents for problems
    Validate(validate::ValidateArgs),

    /// Apply editor operations to a rule document
    Edit(edit::EditArgs),

    /// Preview extraction of a CSV table with a rule document
    Evaluate(evaluate::EvaluateArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Rules(args) => rules::run(args, cli.config.as_deref()).await,
        Commands::Migrate(args) => migrate::run(args).await,
        Commands::Validate(args) => validate::run(args).await,
        Commands::Edit(args) => edit::run(args, cli.config.as_deref()).await,
        Commands::Evaluate(args) => evaluate::run(args, cli.config.as_deref()).await,
        Commands::Config(args) => config::run(args, cli.config.as_deref()).await,
    }
}
