//! Pre-save checks of a rule document.
//!
//! Issues are reported, never enforced: the console shows them next to the
//! save button and the user decides.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::evaluator::{compile_condition_regex, compile_position_pattern};
use crate::models::records::{RecordScope, is_valid_field_value};
use crate::models::rules::{
    ColumnRef, ConditionType, ExtractionRuleDocument, MatchingStrategy, TableType,
};

/// How serious an issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// One finding of [`validate_document`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub severity: Severity,
    /// Human-readable path, e.g. `Preistabelle > Regel 2 > Aktion 1`.
    pub location: String,
    pub message: String,
}

impl ValidationIssue {
    fn error(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            location: location.into(),
            message: message.into(),
        }
    }

    fn warning(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            location: location.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {}: {}", level, self.location, self.message)
    }
}

/// Whether any issue is an error.
pub fn has_errors(issues: &[ValidationIssue]) -> bool {
    issues.iter().any(|i| i.severity == Severity::Error)
}

/// Check a document for problems the backend would trip over.
pub fn validate_document(doc: &ExtractionRuleDocument) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if doc.table_types.is_empty() {
        issues.push(ValidationIssue::error("Dokument", "no table types"));
        return issues;
    }

    let mut seen_ids = HashSet::new();
    for (i, table) in doc.table_types.iter().enumerate() {
        let location = table_location(i, table);
        if !seen_ids.insert(table.id()) {
            issues.push(ValidationIssue::error(
                &location,
                format!("duplicate table type id '{}'", table.id()),
            ));
        }
        validate_table(table, &location, &mut issues);
    }

    issues
}

fn table_location(index: usize, table: &TableType) -> String {
    if table.table_name.trim().is_empty() {
        format!("Tabelle {}", index + 1)
    } else {
        table.table_name.clone()
    }
}

fn validate_table(table: &TableType, location: &str, issues: &mut Vec<ValidationIssue>) {
    if table.table_name.trim().is_empty() {
        issues.push(ValidationIssue::warning(location, "table type has no name"));
    }

    let matcher = &table.header_matcher;
    if matcher.matching_strategy == MatchingStrategy::MinimumCount {
        match matcher.minimum_match_count {
            None => issues.push(ValidationIssue::warning(
                location,
                "MINIMUM_COUNT without minimumMatchCount requires every header",
            )),
            Some(n) if n > matcher.required_headers.len() => issues.push(ValidationIssue::error(
                location,
                format!(
                    "minimumMatchCount {} exceeds the {} required headers",
                    n,
                    matcher.required_headers.len()
                ),
            )),
            Some(_) => {}
        }
    }

    let mut mapped = HashSet::new();
    for (i, column) in table.columns.iter().enumerate() {
        let column_location = format!("{} > Spalte {}", location, i + 1);
        if column.index != i {
            issues.push(ValidationIssue::error(
                &column_location,
                format!("column index {} does not match its position {}", column.index, i),
            ));
        }
        if column.name.trim().is_empty() {
            issues.push(ValidationIssue::warning(&column_location, "column has no name"));
        }
        if let Some(field) = column.mapped_to {
            if !mapped.insert(field) {
                issues.push(ValidationIssue::warning(
                    &column_location,
                    format!("{} is mapped by more than one column", field.target().1),
                ));
            }
        }
    }

    let validation = &table.validation_rules;
    if let Some(pattern) = &validation.position_number_pattern {
        if let Err(e) = compile_position_pattern(pattern) {
            issues.push(ValidationIssue::error(
                location,
                format!("invalid positionNumberPattern: {}", e),
            ));
        }
    }
    let rows = (validation.header_row_index, validation.first_data_row_index);
    if let (Some(header), Some(first)) = rows {
        if first <= header {
            issues.push(ValidationIssue::warning(
                location,
                format!("firstDataRowIndex {} is not after headerRowIndex {}", first, header),
            ));
        }
    }

    let multi = &table.multi_price_config;
    if multi.has_multiple_prices && multi.price_columns.is_empty() {
        issues.push(ValidationIssue::error(
            location,
            "multiple prices enabled without price columns",
        ));
    }
    if multi.has_multiple_prices {
        for (i, price) in multi.price_columns.iter().enumerate() {
            if price.column_index.is_none() {
                issues.push(ValidationIssue::warning(
                    format!("{} > Preisspalte {}", location, i + 1),
                    "price column has no column index",
                ));
            }
        }
    }

    let price_columns: HashSet<usize> = multi
        .price_columns
        .iter()
        .filter_map(|p| p.column_index)
        .collect();

    for (r, rule) in table.conditional_rules.iter().enumerate() {
        let rule_location = format!("{} > Regel {}", location, r + 1);
        if !rule.enabled {
            continue;
        }
        if rule.actions.is_empty() {
            issues.push(ValidationIssue::error(&rule_location, "rule has no actions"));
        }

        let condition = &rule.condition;
        match &condition.column {
            None => issues.push(ValidationIssue::warning(
                &rule_location,
                "condition has no column and never applies",
            )),
            Some(column @ ColumnRef::ByName(name)) if table.resolve_column(column).is_none() => {
                issues.push(ValidationIssue::warning(
                    &rule_location,
                    format!("condition column '{}' is not defined", name),
                ))
            }
            Some(_) => {}
        }

        let value = condition.value.as_deref().unwrap_or("");
        let needs_value =
            condition.kind.uses_value() && condition.kind != ConditionType::ColumnEquals;
        if needs_value && value.is_empty() {
            issues.push(ValidationIssue::warning(
                &rule_location,
                "condition value is empty and never matches",
            ));
        }
        if condition.kind == ConditionType::ColumnMatchesRegex && !value.is_empty() {
            if let Err(e) = compile_condition_regex(value, condition.case_sensitive) {
                issues.push(ValidationIssue::error(
                    &rule_location,
                    format!("invalid regex: {}", e),
                ));
            }
        }

        for (a, action) in rule.actions.iter().enumerate() {
            let action_location = format!("{} > Aktion {}", rule_location, a + 1);
            if action.field_name.trim().is_empty() {
                issues.push(ValidationIssue::warning(&action_location, "action has no field name"));
                continue;
            }
            if !action.scope.fields().contains(&action.field_name.as_str()) {
                issues.push(ValidationIssue::warning(
                    &action_location,
                    format!("'{}' is not a {:?} field", action.field_name, action.scope),
                ));
            } else if !action.value.is_empty()
                && !is_valid_field_value(&action.field_name, &action.value)
            {
                issues.push(ValidationIssue::warning(
                    &action_location,
                    format!("invalid value '{}' for {}", action.value, action.field_name),
                ));
            }

            if let Some(target) = action.target_price_column {
                if action.scope != RecordScope::Price || !multi.has_multiple_prices {
                    issues.push(ValidationIssue::warning(
                        &action_location,
                        "targetPriceColumn is ignored outside multi-price PRICE actions",
                    ));
                } else if !price_columns.contains(&target) {
                    issues.push(ValidationIssue::error(
                        &action_location,
                        format!("targetPriceColumn {} is not a configured price column", target),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rules::{
        ColumnDefinition, Condition, ConditionalRule, MappedField, PriceColumn, RuleAction,
    };

    fn valid_document() -> ExtractionRuleDocument {
        let mut doc = ExtractionRuleDocument::new();
        let table = &mut doc.table_types[0];
        table.columns = vec![ColumnDefinition::new(0), ColumnDefinition::new(1)];
        table.columns[0].name = "Pos.-Nr.".into();
        table.columns[0].mapped_to = Some(MappedField::PositionNumber);
        table.columns[1].name = "Preis".into();
        table.columns[1].mapped_to = Some(MappedField::Price);
        doc
    }

    fn rule_with(condition: Condition, action: RuleAction) -> ConditionalRule {
        ConditionalRule {
            name: "Regel".into(),
            enabled: true,
            condition,
            actions: vec![action],
        }
    }

    #[test]
    fn test_clean_document() {
        assert!(validate_document(&valid_document()).is_empty());
    }

    #[test]
    fn test_invalid_patterns_are_errors() {
        let mut doc = valid_document();
        let table = &mut doc.table_types[0];
        table.validation_rules.position_number_pattern = Some("(31".into());
        table.conditional_rules.push(rule_with(
            Condition {
                kind: ConditionType::ColumnMatchesRegex,
                column: Some(ColumnRef::ByIndex(0)),
                value: Some("[a-".into()),
                case_sensitive: false,
            },
            RuleAction {
                field_name: "unit".into(),
                value: "Stück".into(),
                ..RuleAction::default()
            },
        ));

        let issues = validate_document(&doc);
        assert_eq!(issues.len(), 2);
        assert!(has_errors(&issues));
        assert!(issues[1].location.ends_with("Regel 1"));
    }

    #[test]
    fn test_unknown_target_price_column() {
        let mut doc = valid_document();
        let table = &mut doc.table_types[0];
        table.multi_price_config.has_multiple_prices = true;
        table.multi_price_config.price_columns = vec![PriceColumn {
            column_index: Some(1),
            price_type: "Festpreis".into(),
        }];
        table.conditional_rules.push(rule_with(
            Condition {
                kind: ConditionType::ColumnNotEmpty,
                column: Some(ColumnRef::ByIndex(0)),
                value: None,
                case_sensitive: false,
            },
            RuleAction {
                field_name: "copaymentAdult".into(),
                value: "10,00".into(),
                scope: RecordScope::Price,
                target_price_column: Some(5),
                ..RuleAction::default()
            },
        ));

        let issues = validate_document(&doc);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Error);
        assert!(issues[0].message.contains("targetPriceColumn 5"));
    }

    #[test]
    fn test_rule_warnings() {
        let mut doc = valid_document();
        doc.table_types[0].conditional_rules.push(rule_with(
            Condition {
                kind: ConditionType::ColumnContains,
                column: Some(ColumnRef::ByName("Hinweis".into())),
                value: Some(String::new()),
                case_sensitive: false,
            },
            RuleAction {
                field_name: "price".into(),
                value: "1,00".into(),
                ..RuleAction::default()
            },
        ));

        let issues = validate_document(&doc);
        let messages: Vec<&str> = issues.iter().map(|i| i.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "condition column 'Hinweis' is not defined",
                "condition value is empty and never matches",
                "'price' is not a Position field",
            ]
        );
        assert!(!has_errors(&issues));
    }

    #[test]
    fn test_disabled_rules_are_not_checked() {
        let mut doc = valid_document();
        let mut rule = ConditionalRule::new();
        rule.enabled = false;
        doc.table_types[0].conditional_rules.push(rule);
        assert!(validate_document(&doc).is_empty());
    }

    #[test]
    fn test_duplicate_ids_and_mappings() {
        let mut doc = valid_document();
        doc.table_types.push(doc.table_types[0].clone());
        doc.table_types[1].columns[1].mapped_to = Some(MappedField::PositionNumber);

        let issues = validate_document(&doc);
        assert_eq!(issues.len(), 2);
        assert!(issues[0].message.contains("duplicate table type id"));
        assert!(issues[1].message.contains("positionNumber is mapped by more than one column"));
        assert_eq!(
            issues[1].to_string(),
            "warning: Haupttabelle > Spalte 2: positionNumber is mapped by more than one column"
        );
    }
}
