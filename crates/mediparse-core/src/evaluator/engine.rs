//! Row evaluation for one table type.

use regex::Regex;
use tracing::{debug, info};

use crate::error::RuleError;
use crate::models::config::EvaluationConfig;
use crate::models::records::{
    PositionRecord, PriceRecord, RecordScope, SkipReason, SkippedRow, TableExtraction, fields,
};
use crate::models::rules::{ExtractionRuleDocument, TableType, metadata_keys};
use crate::rules::dates::normalize_date;

use super::TableEvaluator;
use super::condition::{CompiledCondition, compile_position_pattern};

/// Contract-level defaults applied before the conditional rules run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractDefaults {
    pub tax: Option<String>,
    pub cost_estimate: Option<String>,
    pub valid_from: Option<String>,
    pub valid_until: Option<String>,
}

impl ContractDefaults {
    /// Read defaults from `contractMetadata`.
    pub fn from_document(doc: &ExtractionRuleDocument) -> Self {
        let get = |key: &str| doc.metadata_str(key).map(str::to_string);
        Self {
            tax: get(metadata_keys::DEFAULT_TAX),
            cost_estimate: get(metadata_keys::DEFAULT_COST_ESTIMATE),
            valid_from: get(metadata_keys::VALID_FROM).map(|d| date_value(fields::VALID_AT, d)),
            valid_until: get(metadata_keys::VALID_UNTIL)
                .map(|d| date_value(fields::VALID_UNTIL, d)),
        }
    }
}

/// Dates in ISO form when they parse, other values unchanged.
fn date_value(field: &str, value: String) -> String {
    if fields::DATE_FIELDS.contains(&field) {
        normalize_date(&value).unwrap_or(value)
    } else {
        value
    }
}

struct CompiledRule {
    name: String,
    condition: CompiledCondition,
    rule_index: usize,
}

/// Evaluates rows of a physical table against one table type.
///
/// Rules run in list order; a later rule overwrites fields set by an
/// earlier one.
pub struct RuleEvaluator<'a> {
    table: &'a TableType,
    defaults: ContractDefaults,
    config: EvaluationConfig,
    position_pattern: Option<Regex>,
    rules: Vec<CompiledRule>,
    warnings: Vec<String>,
}

impl<'a> RuleEvaluator<'a> {
    /// Prepare the table type at `type_index`, compiling its patterns.
    pub fn new(doc: &'a ExtractionRuleDocument, type_index: usize) -> Result<Self, RuleError> {
        let table = doc
            .table_type(type_index)
            .ok_or(RuleError::TableTypeIndex(type_index))?;
        Self::for_table(doc, table)
    }

    /// Prepare the table type with identifier `id`.
    pub fn by_id(doc: &'a ExtractionRuleDocument, id: &str) -> Result<Self, RuleError> {
        let table = doc
            .table_type_by_id(id)
            .ok_or_else(|| RuleError::UnknownTableType(id.to_string()))?;
        Self::for_table(doc, table)
    }

    fn for_table(doc: &ExtractionRuleDocument, table: &'a TableType) -> Result<Self, RuleError> {
        let position_pattern = table
            .validation_rules
            .position_number_pattern
            .as_deref()
            .map(|p| {
                compile_position_pattern(p).map_err(|e| RuleError::InvalidPattern {
                    location: format!("{}: positionNumberPattern", table.table_name),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let mut rules = Vec::new();
        let mut warnings = Vec::new();
        for (rule_index, rule) in table.conditional_rules.iter().enumerate() {
            if !rule.enabled {
                debug!(rule = %rule.name, "skipping disabled rule");
                continue;
            }
            let location = format!("{}: rule {} '{}'", table.table_name, rule_index + 1, rule.name);
            let condition = CompiledCondition::compile(&rule.condition, table, &location)?;
            if !condition.is_addressable() {
                warnings.push(format!(
                    "{}: condition column not found, rule never applies",
                    location
                ));
            }
            rules.push(CompiledRule {
                name: rule.name.clone(),
                condition,
                rule_index,
            });
        }

        Ok(Self {
            table,
            defaults: ContractDefaults::from_document(doc),
            config: EvaluationConfig::default(),
            position_pattern,
            rules,
            warnings,
        })
    }

    /// Use the given evaluation settings.
    pub fn with_config(mut self, config: EvaluationConfig) -> Self {
        self.config = config;
        self
    }

    /// The table type being evaluated.
    pub fn table_type(&self) -> &TableType {
        self.table
    }

    fn header_row_index(&self) -> usize {
        self.table
            .validation_rules
            .header_row_index
            .unwrap_or(self.config.default_header_row_index)
    }

    fn first_data_row_index(&self) -> usize {
        self.table
            .validation_rules
            .first_data_row_index
            .unwrap_or(self.header_row_index() + 1)
    }

    /// Build position and price records from a row, before rules apply.
    fn map_row(&self, row_index: usize, cells: &[String]) -> PositionRecord {
        let cell = |index: usize| cells.get(index).cloned().unwrap_or_default();
        let mut position = PositionRecord::new(row_index);
        let mut price_fields = Vec::new();

        for column in &self.table.columns {
            let Some(mapped) = column.mapped_to else {
                continue;
            };
            let value = cell(column.index);
            match mapped.target() {
                (RecordScope::Position, field) => {
                    if !value.is_empty() {
                        position.set(field, value);
                    }
                }
                // prices are read per price column below
                (RecordScope::Price, fields::PRICE) => {}
                (RecordScope::Price, field) => {
                    if !value.is_empty() {
                        price_fields.push((field, date_value(field, value)));
                    }
                }
            }
        }

        let multi = &self.table.multi_price_config;
        position.prices = if multi.has_multiple_prices {
            multi
                .price_columns
                .iter()
                .filter_map(|p| p.column_index.map(|index| (index, p.price_type.as_str())))
                .map(|(index, price_type)| {
                    let mut price = PriceRecord::new(Some(index));
                    price.set(fields::PRICE, cell(index));
                    if !price_type.is_empty() {
                        price.set(fields::PRICE_TYPE, price_type);
                    }
                    price
                })
                .collect()
        } else {
            self.table
                .price_column_indices()
                .into_iter()
                .map(|index| {
                    let mut price = PriceRecord::new(Some(index));
                    price.set(fields::PRICE, cell(index));
                    price
                })
                .collect()
        };

        for price in &mut position.prices {
            for (field, value) in &price_fields {
                price.set(*field, value.clone());
            }
        }

        if self.config.apply_contract_defaults {
            self.apply_defaults(&mut position);
        }

        position
    }

    fn apply_defaults(&self, position: &mut PositionRecord) {
        let defaults = &self.defaults;
        if let Some(tax) = &defaults.tax {
            if position.get(fields::TAX).is_none() {
                position.set(fields::TAX, tax.clone());
            }
        }
        if let Some(cost_estimate) = &defaults.cost_estimate {
            if position.get(fields::COST_ESTIMATE_REQUIRED).is_none() {
                position.set(fields::COST_ESTIMATE_REQUIRED, cost_estimate.clone());
            }
        }
        for price in &mut position.prices {
            if let Some(from) = &defaults.valid_from {
                if price.get(fields::VALID_AT).is_none() {
                    price.set(fields::VALID_AT, from.clone());
                }
            }
            if let Some(until) = &defaults.valid_until {
                if price.get(fields::VALID_UNTIL).is_none() {
                    price.set(fields::VALID_UNTIL, until.clone());
                }
            }
        }
    }

    fn apply_rules(&self, cells: &[String], position: &mut PositionRecord) {
        let has_multiple_prices = self.table.multi_price_config.has_multiple_prices;

        for compiled in &self.rules {
            if !compiled.condition.matches(cells) {
                continue;
            }
            let rule = &self.table.conditional_rules[compiled.rule_index];

            for action in &rule.actions {
                if action.field_name.is_empty() {
                    continue;
                }
                match action.scope {
                    RecordScope::Position => {
                        position.set(action.field_name.clone(), action.value.clone());
                    }
                    RecordScope::Price => {
                        let target = if has_multiple_prices {
                            action.target_price_column
                        } else {
                            None
                        };
                        let value = date_value(&action.field_name, action.value.clone());
                        for price in &mut position.prices {
                            if target.is_none() || price.source_column == target {
                                price.set(action.field_name.clone(), value.clone());
                            }
                        }
                    }
                }
            }
            position.applied_rules.push(compiled.name.clone());
        }
    }
}

impl TableEvaluator for RuleEvaluator<'_> {
    fn evaluate(&self, rows: &[Vec<String>]) -> TableExtraction {
        let header_row = self.header_row_index();
        let first_data_row = self.first_data_row_index();
        let mut positions = Vec::new();
        let mut skipped_rows = Vec::new();

        for (row_index, raw) in rows.iter().enumerate() {
            if row_index < first_data_row || row_index == header_row {
                continue;
            }

            let cells: Vec<String> = if self.config.trim_cells {
                raw.iter().map(|c| c.trim().to_string()).collect()
            } else {
                raw.clone()
            };

            if self.config.skip_blank_rows && cells.iter().all(|c| c.trim().is_empty()) {
                skipped_rows.push(SkippedRow {
                    row_index,
                    reason: SkipReason::Blank,
                });
                continue;
            }

            let mut position = self.map_row(row_index, &cells);

            if let Some(pattern) = &self.position_pattern {
                let accepted = position
                    .position_number()
                    .is_some_and(|n| pattern.is_match(n.trim()));
                if !accepted {
                    debug!(row_index, "row does not match position number pattern");
                    skipped_rows.push(SkippedRow {
                        row_index,
                        reason: SkipReason::PositionNumberMismatch,
                    });
                    continue;
                }
            }

            self.apply_rules(&cells, &mut position);
            positions.push(position);
        }

        info!(
            table = %self.table.table_name,
            positions = positions.len(),
            skipped = skipped_rows.len(),
            "evaluated table"
        );

        TableExtraction {
            table_type_id: self.table.id().to_string(),
            table_name: self.table.table_name.clone(),
            positions,
            skipped_rows,
            warnings: self.warnings.clone(),
        }
    }
}
