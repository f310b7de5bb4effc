//! Upgrade of stored rule documents to the table-type structure.
//!
//! Older documents configured a single implicit table at the top level
//! (`columnMappings`, `multiPriceConfig`, ...). They are recognised by the
//! absence of `tableTypes` and wrapped into one synthetic table type.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::RuleError;
use crate::models::lenient_index;
use crate::models::rules::{
    ColumnDefinition, ConditionalRule, ExtractionRuleDocument, FreeForm, MappedField,
    MultiPriceConfig, TableType, ValidationRules,
};

/// A rule document as fetched from storage, before any editing.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredDocument {
    /// Flat single-table document.
    Legacy(LegacyDocument),
    /// Document with `tableTypes`.
    Current(ExtractionRuleDocument),
}

impl StoredDocument {
    /// Classify a raw JSON value by the presence of `tableTypes`.
    ///
    /// `null` is the default document.
    pub fn from_value(value: Value) -> Result<Self, RuleError> {
        if value.is_null() {
            return Ok(Self::Current(ExtractionRuleDocument::new()));
        }
        let has_table_types = value.get("tableTypes").is_some_and(|v| !v.is_null());
        if has_table_types {
            Ok(Self::Current(serde_json::from_value(value)?))
        } else {
            Ok(Self::Legacy(serde_json::from_value(value)?))
        }
    }

    /// Normalise into the current shape.
    pub fn migrate(self) -> ExtractionRuleDocument {
        migrate(self)
    }
}

impl<'de> Deserialize<'de> for StoredDocument {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

/// Flat document from before table types existed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyDocument {
    #[serde(default)]
    pub column_mappings: LegacyColumnMappings,

    #[serde(default)]
    pub transformation_rules: FreeForm,

    #[serde(default)]
    pub multi_price_config: MultiPriceConfig,

    #[serde(default)]
    pub contract_metadata: FreeForm,

    #[serde(default)]
    pub validation_rules: ValidationRules,

    #[serde(default)]
    pub conditional_rules: Vec<ConditionalRule>,
}

/// Highest legacy column count expanded with placeholders.
pub const MAX_LEGACY_COLUMNS: usize = 256;

/// Column index per semantic field, as configured in the flat document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyColumnMappings {
    #[serde(default, deserialize_with = "lenient_index")]
    pub position_number_column: Option<usize>,
    #[serde(default, deserialize_with = "lenient_index")]
    pub description_column: Option<usize>,
    #[serde(default, deserialize_with = "lenient_index")]
    pub unit_column: Option<usize>,
    #[serde(default, deserialize_with = "lenient_index")]
    pub price_column: Option<usize>,
    #[serde(default, deserialize_with = "lenient_index")]
    pub tax_column: Option<usize>,
    #[serde(default, deserialize_with = "lenient_index")]
    pub cost_estimate_column: Option<usize>,
    #[serde(default, deserialize_with = "lenient_index")]
    pub supply_type_column: Option<usize>,
}

impl LegacyColumnMappings {
    /// Mapped columns with their field and display label, in form order.
    pub fn entries(&self) -> Vec<(usize, MappedField, &'static str)> {
        [
            (self.position_number_column, MappedField::PositionNumber, "Positionsnummer"),
            (self.description_column, MappedField::Description, "Beschreibung"),
            (self.unit_column, MappedField::Unit, "Einheit"),
            (self.price_column, MappedField::Price, "Preis"),
            (self.tax_column, MappedField::Tax, "Steuersatz"),
            (self.cost_estimate_column, MappedField::CostEstimate, "Kostenvoranschlag"),
            (self.supply_type_column, MappedField::SupplyType, "Versorgungsart"),
        ]
        .into_iter()
        .filter_map(|(index, field, label)| index.map(|i| (i, field, label)))
        .collect()
    }

    /// Column definitions covering every mapped index.
    ///
    /// Unmapped positions below the highest mapped index become placeholder
    /// columns so that physical indices used by conditions stay valid. Past
    /// [`MAX_LEGACY_COLUMNS`] only the mapped columns are kept, in index order.
    pub fn to_columns(&self) -> Vec<ColumnDefinition> {
        let mut entries = self.entries();
        let Some(max_index) = entries.iter().map(|(i, _, _)| *i).max() else {
            return Vec::new();
        };

        if max_index >= MAX_LEGACY_COLUMNS {
            warn!(
                max_index,
                limit = MAX_LEGACY_COLUMNS,
                "legacy column index out of range, keeping mapped columns only"
            );
            entries.sort_by_key(|(i, _, _)| *i);
            entries.dedup_by_key(|(i, _, _)| *i);
            return entries
                .into_iter()
                .enumerate()
                .map(|(position, (_, field, label))| {
                    let mut column = ColumnDefinition::new(position);
                    column.name = label.to_string();
                    column.mapped_to = Some(field);
                    column.required = field == MappedField::PositionNumber;
                    column
                })
                .collect();
        }

        (0..=max_index)
            .map(|index| {
                let mut column = ColumnDefinition::new(index);
                let mut mapped = entries.iter().filter(|(i, _, _)| *i == index);
                match mapped.next() {
                    Some((_, field, label)) => {
                        column.name = (*label).to_string();
                        column.mapped_to = Some(*field);
                        column.required = *field == MappedField::PositionNumber;
                        if let Some((_, dropped, _)) = mapped.next() {
                            debug!(index, ?field, ?dropped, "column mapped twice, keeping first");
                        }
                    }
                    None => column.name = format!("Spalte {}", index + 1),
                }
                column
            })
            .collect()
    }
}

/// Normalise a stored document into the current shape.
///
/// Current documents pass through with only the structural invariants
/// restored, so migrating twice yields the same document.
pub fn migrate(stored: StoredDocument) -> ExtractionRuleDocument {
    let mut doc = match stored {
        StoredDocument::Current(doc) => doc,
        StoredDocument::Legacy(legacy) => {
            info!(
                rules = legacy.conditional_rules.len(),
                "migrating legacy rule document"
            );
            let mut table = TableType::default_table();
            table.columns = legacy.column_mappings.to_columns();
            table.transformation_rules = legacy.transformation_rules;
            table.multi_price_config = legacy.multi_price_config;
            table.validation_rules = legacy.validation_rules;
            table.conditional_rules = legacy.conditional_rules;

            ExtractionRuleDocument {
                contract_metadata: legacy.contract_metadata,
                table_types: vec![table],
            }
        }
    };
    doc.normalize();
    doc
}

/// Migrate a raw stored value; `None` and `null` yield the default document.
pub fn migrate_value(raw: Option<Value>) -> Result<ExtractionRuleDocument, RuleError> {
    match raw {
        None | Some(Value::Null) => Ok(ExtractionRuleDocument::new()),
        Some(value) => Ok(StoredDocument::from_value(value)?.migrate()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rules::{ColumnRef, DEFAULT_TABLE_NAME, DEFAULT_TABLE_TYPE_ID};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn legacy_value() -> Value {
        json!({
            "columnMappings": {"positionNumberColumn": 0, "priceColumn": 3},
            "transformationRules": {},
            "multiPriceConfig": {"hasMultiplePrices": false, "priceColumns": []},
            "contractMetadata": {"healthInsuranceName": "AOK Bayern"},
            "validationRules": {"positionNumberPattern": "31\\.\\d+\\.\\d+", "validityDateRules": {}},
            "conditionalRules": []
        })
    }

    #[test]
    fn test_legacy_document_is_wrapped() {
        let doc = migrate_value(Some(legacy_value())).unwrap();

        assert_eq!(doc.table_types.len(), 1);
        let table = &doc.table_types[0];
        assert_eq!(table.id(), DEFAULT_TABLE_TYPE_ID);
        assert_eq!(table.table_name, DEFAULT_TABLE_NAME);
        assert!(table.header_matcher.required_headers.is_empty());
        assert_eq!(
            table.validation_rules.position_number_pattern.as_deref(),
            Some("31\\.\\d+\\.\\d+")
        );
        assert!(table.conditional_rules.is_empty());
        assert_eq!(doc.metadata_str("healthInsuranceName"), Some("AOK Bayern"));
    }

    #[test]
    fn test_legacy_mappings_become_columns() {
        let doc = migrate_value(Some(legacy_value())).unwrap();
        let columns = &doc.table_types[0].columns;

        assert_eq!(columns.len(), 4);
        assert_eq!(columns[0].mapped_to, Some(MappedField::PositionNumber));
        assert!(columns[0].required);
        assert_eq!(columns[1].name, "Spalte 2");
        assert_eq!(columns[1].mapped_to, None);
        assert_eq!(columns[3].mapped_to, Some(MappedField::Price));
        assert_eq!(doc.table_types[0].price_column_indices(), vec![3]);
    }

    #[test]
    fn test_migration_is_idempotent() {
        let once = migrate_value(Some(legacy_value())).unwrap();
        let again = migrate_value(Some(serde_json::to_value(&once).unwrap())).unwrap();
        assert_eq!(again, once);

        let twice = migrate(StoredDocument::Current(once.clone()));
        assert_eq!(twice, once);
    }

    #[test]
    fn test_current_document_passes_through() {
        let raw = json!({
            "contractMetadata": {},
            "tableTypes": [
                {"tableTypeId": "a", "tableName": "Preistabelle"},
                {"tableTypeId": "b", "tableName": "Zuzahlungen"}
            ]
        });

        let doc = migrate_value(Some(raw)).unwrap();
        assert_eq!(doc.table_types.len(), 2);
        assert_eq!(doc.table_types[1].id(), "b");
    }

    #[test]
    fn test_null_yields_default_document() {
        let doc = migrate_value(Some(Value::Null)).unwrap();
        assert_eq!(doc, ExtractionRuleDocument::new());
        assert_eq!(migrate_value(None).unwrap().table_types[0].id(), DEFAULT_TABLE_TYPE_ID);
    }

    #[test]
    fn test_legacy_conditions_keep_physical_columns() {
        let raw = json!({
            "columnMappings": {"positionNumberColumn": 0},
            "conditionalRules": [{
                "name": "KV",
                "enabled": true,
                "condition": {"type": "COLUMN_CONTAINS", "columnIndex": 4, "value": "KV", "caseSensitive": false},
                "actions": [{"type": "SET_FIELD", "fieldName": "costEstimateRequired", "value": "YES", "scope": "POSITION", "targetPriceColumn": null}]
            }]
        });

        let doc = migrate_value(Some(raw)).unwrap();
        let rule = &doc.table_types[0].conditional_rules[0];
        assert_eq!(rule.condition.column, Some(ColumnRef::ByIndex(4)));
        assert_eq!(rule.actions.len(), 1);
    }

    #[test]
    fn test_stored_document_deserialize() {
        let stored: StoredDocument = serde_json::from_value(legacy_value()).unwrap();
        assert!(matches!(stored, StoredDocument::Legacy(_)));

        let stored: StoredDocument =
            serde_json::from_value(json!({"tableTypes": [{"tableTypeId": "x"}]})).unwrap();
        assert!(matches!(stored, StoredDocument::Current(_)));
    }

    #[test]
    fn test_negative_legacy_indices_are_unset() {
        let raw = json!({
            "columnMappings": {"positionNumberColumn": -1, "priceColumn": 1},
            "multiPriceConfig": {
                "hasMultiplePrices": true,
                "priceColumns": [{"columnIndex": -3, "priceType": "Festpreis"}]
            },
            "validationRules": {"headerRowIndex": -1, "firstDataRowIndex": "2"},
            "conditionalRules": [{
                "name": "KV",
                "condition": {"type": "COLUMN_CONTAINS", "columnIndex": -1, "value": "KV"},
                "actions": [{"type": "SET_FIELD", "fieldName": "price", "value": "0",
                             "scope": "PRICE", "targetPriceColumn": -2}]
            }]
        });

        let doc = migrate_value(Some(raw)).unwrap();
        let table = &doc.table_types[0];
        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.columns[1].mapped_to, Some(MappedField::Price));
        assert_eq!(table.multi_price_config.price_columns[0].column_index, None);
        assert_eq!(table.validation_rules.header_row_index, None);
        assert_eq!(table.validation_rules.first_data_row_index, Some(2));
        let rule = &table.conditional_rules[0];
        assert_eq!(rule.condition.column, None);
        assert_eq!(rule.actions[0].target_price_column, None);
    }

    #[test]
    fn test_out_of_range_legacy_index_is_not_expanded() {
        let raw = json!({
            "columnMappings": {"positionNumberColumn": 0, "priceColumn": 2000000}
        });

        let doc = migrate_value(Some(raw)).unwrap();
        let columns = &doc.table_types[0].columns;
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].mapped_to, Some(MappedField::PositionNumber));
        assert_eq!(columns[1].mapped_to, Some(MappedField::Price));
        assert_eq!(columns[1].index, 1);
        assert!(doc.is_well_formed());
    }

    #[test]
    fn test_null_stored_document_is_default() {
        let stored = StoredDocument::from_value(Value::Null).unwrap();
        assert_eq!(stored.migrate(), ExtractionRuleDocument::new());
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        let result = migrate_value(Some(json!({"tableTypes": "nope"})));
        assert!(matches!(result, Err(RuleError::Malformed(_))));
    }
}
