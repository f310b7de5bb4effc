//! Offline evaluation of rule documents against table grids.

mod condition;
mod engine;
pub mod header;

pub use condition::{CompiledCondition, compile_condition_regex, compile_position_pattern};
pub use engine::{ContractDefaults, RuleEvaluator};
pub use header::{HeaderMatch, detect_table_type};

use crate::models::records::TableExtraction;

/// Trait for table evaluators.
pub trait TableEvaluator {
    /// Turn the rows of one physical table into position records.
    fn evaluate(&self, rows: &[Vec<String>]) -> TableExtraction;

    /// Evaluate a grid and collect the issues of each produced position.
    fn evaluate_checked(&self, rows: &[Vec<String>]) -> (TableExtraction, Vec<String>) {
        let extraction = self.evaluate(rows);
        let issues = extraction
            .positions
            .iter()
            .flat_map(|p| p.validate())
            .collect();
        (extraction, issues)
    }
}
