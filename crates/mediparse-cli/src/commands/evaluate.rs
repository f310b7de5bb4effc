//! Evaluate command - preview extraction of a CSV table.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use tracing::{info, warn};

use mediparse_core::models::records::{SkipReason, TableExtraction, fields};
use mediparse_core::rules::amounts::format_german_amount;
use mediparse_core::{ExtractionRuleDocument, RuleEvaluator, TableEvaluator, detect_table_type};

use super::{load_config, read_document};

/// Arguments for the evaluate command.
#[derive(Args)]
pub struct EvaluateArgs {
    /// Rule document
    #[arg(required = true)]
    rules: PathBuf,

    /// Table as CSV, one physical row per line
    #[arg(required = true)]
    table: PathBuf,

    /// Table type id (default: detect from the header row)
    #[arg(short, long)]
    table_type: Option<String>,

    /// CSV field delimiter
    #[arg(short, long, default_value = ";")]
    delimiter: char,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Validate produced records
    #[arg(long)]
    validate: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output, one line per price
    Csv,
    /// Plain text summary
    Text,
}

pub async fn run(args: EvaluateArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let doc = read_document(&args.rules)?;
    let rows = read_rows(&args.table, args.delimiter)?;

    let evaluator = match &args.table_type {
        Some(id) => RuleEvaluator::by_id(&doc, id)?,
        None => {
            let index = detect_index(&doc, &rows, config.evaluation.default_header_row_index);
            RuleEvaluator::new(&doc, index)?
        }
    }
    .with_config(config.evaluation);

    let (extraction, issues) = if args.validate {
        evaluator.evaluate_checked(&rows)
    } else {
        (evaluator.evaluate(&rows), Vec::new())
    };

    for warning in &extraction.warnings {
        eprintln!("{} {}", style("!").yellow(), warning);
    }
    if !issues.is_empty() {
        eprintln!("{}", style("Validation issues:").yellow());
        for issue in &issues {
            eprintln!("  - {}", issue);
        }
    }

    let output = match args.format {
        OutputFormat::Json => serde_json::to_string_pretty(&extraction)?,
        OutputFormat::Csv => format_csv(&extraction)?,
        OutputFormat::Text => format_text(&extraction),
    };

    if let Some(path) = &args.output {
        fs::write(path, &output)?;
        eprintln!("{} Output written to {}", style("✓").green(), path.display());
    } else {
        println!("{}", output);
    }

    Ok(())
}

fn read_rows(path: &Path, delimiter: char) -> anyhow::Result<Vec<Vec<String>>> {
    if !path.exists() {
        anyhow::bail!("Table file not found: {}", path.display());
    }
    if !delimiter.is_ascii() {
        anyhow::bail!("Delimiter must be a single ASCII character");
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter as u8)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    info!(rows = rows.len(), "read table");
    Ok(rows)
}

fn detect_index(doc: &ExtractionRuleDocument, rows: &[Vec<String>], header_row: usize) -> usize {
    let Some(header) = rows.get(header_row) else {
        warn!("table has no header row, using the first table type");
        return 0;
    };
    match detect_table_type(doc, header) {
        Some((index, table)) => {
            info!(table = %table.table_name, "detected table type");
            index
        }
        None => {
            warn!("no table type matches the header row, using the first table type");
            0
        }
    }
}

fn format_csv(extraction: &TableExtraction) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "row",
        fields::POSITION_NUMBER,
        fields::DESCRIPTION,
        fields::UNIT,
        fields::TAX,
        fields::COST_ESTIMATE_REQUIRED,
        fields::SUPPLY_TYPE,
        fields::PRICE_TYPE,
        fields::PRICE,
        fields::VALID_AT,
        fields::VALID_UNTIL,
        fields::COPAYMENT_ADULT,
        fields::COPAYMENT_CHILD,
        fields::COPAYMENT_UNIVERSAL,
        "appliedRules",
    ])?;

    for position in &extraction.positions {
        let field = |name: &str| position.get(name).unwrap_or_default().to_string();
        let head = [
            position.row_index.to_string(),
            field(fields::POSITION_NUMBER),
            field(fields::DESCRIPTION),
            field(fields::UNIT),
            field(fields::TAX),
            field(fields::COST_ESTIMATE_REQUIRED),
            field(fields::SUPPLY_TYPE),
        ];
        let applied = position.applied_rules.join("|");

        if position.prices.is_empty() {
            let mut record: Vec<String> = head.to_vec();
            record.extend(std::iter::repeat_n(String::new(), 7));
            record.push(applied);
            wtr.write_record(&record)?;
            continue;
        }

        for price in &position.prices {
            let price_field = |name: &str| price.get(name).unwrap_or_default().to_string();
            let amount = price
                .amount()
                .map(format_german_amount)
                .unwrap_or_else(|| price_field(fields::PRICE));
            let valid_at = price
                .valid_at()
                .map(|d| d.to_string())
                .unwrap_or_else(|| price_field(fields::VALID_AT));
            let valid_until = price
                .valid_until()
                .map(|d| d.to_string())
                .unwrap_or_else(|| price_field(fields::VALID_UNTIL));

            let mut record: Vec<String> = head.to_vec();
            record.push(price_field(fields::PRICE_TYPE));
            record.push(amount);
            record.push(valid_at);
            record.push(valid_until);
            record.push(price_field(fields::COPAYMENT_ADULT));
            record.push(price_field(fields::COPAYMENT_CHILD));
            record.push(price_field(fields::COPAYMENT_UNIVERSAL));
            record.push(applied.clone());
            wtr.write_record(&record)?;
        }
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(extraction: &TableExtraction) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "Table type: {} ({})\n",
        extraction.table_name, extraction.table_type_id
    ));
    output.push_str(&format!("Positions: {}\n", extraction.positions.len()));

    let blank = extraction
        .skipped_rows
        .iter()
        .filter(|s| s.reason == SkipReason::Blank)
        .count();
    output.push_str(&format!(
        "Skipped rows: {} ({} blank, {} without position number)\n",
        extraction.skipped_rows.len(),
        blank,
        extraction.skipped_rows.len() - blank
    ));
    output.push('\n');

    for position in &extraction.positions {
        output.push_str(&format!(
            "{:>4}  {}  {}\n",
            position.row_index,
            position.position_number().unwrap_or("-"),
            position.get(fields::DESCRIPTION).unwrap_or("")
        ));
        for price in &position.prices {
            let amount = price
                .amount()
                .map(format_german_amount)
                .unwrap_or_else(|| "-".to_string());
            output.push_str(&format!(
                "        {} EUR {}\n",
                amount,
                price.get(fields::PRICE_TYPE).unwrap_or("")
            ));
        }
        if !position.applied_rules.is_empty() {
            output.push_str(&format!("        rules: {}\n", position.applied_rules.join(", ")));
        }
    }

    output
}
