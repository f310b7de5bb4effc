//! Compiled conditions of conditional rules.

use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::error::RuleError;
use crate::models::rules::{Condition, ConditionType, TableType};

/// Compile the regex of a `COLUMN_MATCHES_REGEX` condition.
pub fn compile_condition_regex(pattern: &str, case_sensitive: bool) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
}

/// Compile a position number pattern; it must match the whole value.
pub fn compile_position_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{})$", pattern))
}

/// A condition with its column resolved and its pattern compiled.
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    kind: ConditionType,
    column: Option<usize>,
    value: String,
    case_sensitive: bool,
    regex: Option<Regex>,
}

impl CompiledCondition {
    /// Resolve `condition` against `table`.
    ///
    /// A condition without a resolvable column compiles but never matches.
    pub fn compile(
        condition: &Condition,
        table: &TableType,
        location: &str,
    ) -> Result<Self, RuleError> {
        let column = condition
            .column
            .as_ref()
            .and_then(|c| table.resolve_column(c));

        if column.is_none() {
            warn!(location, column = ?condition.column, "condition column does not resolve");
        }

        let raw_value = condition.value.clone().unwrap_or_default();
        let regex = match condition.kind {
            ConditionType::ColumnMatchesRegex if !raw_value.is_empty() => Some(
                compile_condition_regex(&raw_value, condition.case_sensitive).map_err(|e| {
                    RuleError::InvalidPattern {
                        location: location.to_string(),
                        reason: e.to_string(),
                    }
                })?,
            ),
            _ => None,
        };

        let value = if condition.case_sensitive {
            raw_value
        } else {
            raw_value.to_lowercase()
        };

        Ok(Self {
            kind: condition.kind,
            column,
            value,
            case_sensitive: condition.case_sensitive,
            regex,
        })
    }

    /// Whether the column was resolved.
    pub fn is_addressable(&self) -> bool {
        self.column.is_some()
    }

    /// Evaluate against one row; missing cells count as empty.
    pub fn matches(&self, cells: &[String]) -> bool {
        let Some(column) = self.column else {
            return false;
        };
        let cell = cells.get(column).map(|c| c.trim()).unwrap_or("");

        match self.kind {
            ConditionType::ColumnEmpty => cell.is_empty(),
            ConditionType::ColumnNotEmpty => !cell.is_empty(),
            ConditionType::ColumnMatchesRegex => {
                self.regex.as_ref().is_some_and(|r| r.is_match(cell))
            }
            ConditionType::ColumnContains => {
                !self.value.is_empty() && self.normalized(cell).contains(self.value.as_str())
            }
            ConditionType::ColumnEquals => self.normalized(cell) == self.value.trim(),
        }
    }

    fn normalized(&self, cell: &str) -> String {
        if self.case_sensitive {
            cell.to_string()
        } else {
            cell.to_lowercase()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rules::{ColumnDefinition, ColumnRef};

    fn table() -> TableType {
        let mut table = TableType::new("t", "Tabelle");
        table.columns = (0..3).map(ColumnDefinition::new).collect();
        table.columns[2].name = "Hinweis".to_string();
        table
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn condition(
        kind: ConditionType,
        column: ColumnRef,
        value: &str,
        case_sensitive: bool,
    ) -> Condition {
        Condition {
            kind,
            column: Some(column),
            value: Some(value.to_string()),
            case_sensitive,
        }
    }

    #[test]
    fn test_contains_case_insensitive() {
        let c = condition(ConditionType::ColumnContains, ColumnRef::ByIndex(2), "KV", false);
        let compiled = CompiledCondition::compile(&c, &table(), "rule 0").unwrap();

        assert!(compiled.matches(&row(&["1", "Rollstuhl", "nur mit kv"])));
        assert!(!compiled.matches(&row(&["1", "Rollstuhl", ""])));
    }

    #[test]
    fn test_equals_case_sensitive_by_name() {
        let column = ColumnRef::ByName("hinweis".into());
        let c = condition(ConditionType::ColumnEquals, column, "KV", true);
        let compiled = CompiledCondition::compile(&c, &table(), "rule 0").unwrap();

        assert!(compiled.matches(&row(&["1", "x", " KV "])));
        assert!(!compiled.matches(&row(&["1", "x", "kv"])));
    }

    #[test]
    fn test_regex_condition() {
        let c = condition(
            ConditionType::ColumnMatchesRegex,
            ColumnRef::ByIndex(0),
            r"^31\.\d+",
            false,
        );
        let compiled = CompiledCondition::compile(&c, &table(), "rule 0").unwrap();

        assert!(compiled.matches(&row(&["31.03.01"])));
        assert!(!compiled.matches(&row(&["12.03.01"])));
    }

    #[test]
    fn test_invalid_regex_is_reported() {
        let c = condition(ConditionType::ColumnMatchesRegex, ColumnRef::ByIndex(0), "(", false);
        let err = CompiledCondition::compile(&c, &table(), "rule 3").unwrap_err();
        assert!(err.to_string().contains("rule 3"));
    }

    #[test]
    fn test_empty_conditions() {
        let empty = condition(ConditionType::ColumnEmpty, ColumnRef::ByIndex(5), "", false);
        let compiled = CompiledCondition::compile(&empty, &table(), "rule 0").unwrap();
        assert!(compiled.matches(&row(&["a"])));

        let not_empty = condition(ConditionType::ColumnNotEmpty, ColumnRef::ByIndex(0), "", false);
        let compiled = CompiledCondition::compile(&not_empty, &table(), "rule 0").unwrap();
        assert!(compiled.matches(&row(&["a"])));
        assert!(!compiled.matches(&row(&["  "])));
    }

    #[test]
    fn test_unresolved_column_never_matches() {
        let c = condition(ConditionType::ColumnEmpty, ColumnRef::ByName("Fehlt".into()), "", false);
        let compiled = CompiledCondition::compile(&c, &table(), "rule 0").unwrap();
        assert!(!compiled.is_addressable());
        assert!(!compiled.matches(&row(&[""])));
    }

    #[test]
    fn test_position_pattern_is_anchored() {
        let pattern = compile_position_pattern(r"31\.\d+\.\d+").unwrap();
        assert!(pattern.is_match("31.03.01"));
        assert!(!pattern.is_match("Summe 31.03.01"));
    }
}
