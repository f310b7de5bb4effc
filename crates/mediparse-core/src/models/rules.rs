//! Extraction rule document, the configuration consumed by the table extraction backend.
//!
//! JSON field names follow the backend wire format (camelCase, SCREAMING_SNAKE_CASE
//! enum values), so a document round-trips through `serde_json` without loss.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{empty_string_as_none, lenient_index, lenient_position};
use super::records::{RecordScope, fields};

/// Opaque string-keyed record passed through without interpretation.
pub type FreeForm = BTreeMap<String, serde_json::Value>;

/// Identifier of the table type synthesized for legacy documents.
pub const DEFAULT_TABLE_TYPE_ID: &str = "default";

/// Name of the table type synthesized for legacy documents.
pub const DEFAULT_TABLE_NAME: &str = "Haupttabelle";

/// Well-known keys of `contractMetadata`.
pub mod metadata_keys {
    pub const HEALTH_INSURANCE_NAME: &str = "healthInsuranceName";
    pub const VALID_FROM: &str = "validFrom";
    pub const VALID_UNTIL: &str = "validUntil";
    pub const DEFAULT_TAX: &str = "defaultTax";
    pub const DEFAULT_COST_ESTIMATE: &str = "defaultCostEstimate";
}

/// A complete rule document for one contract file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRuleDocument {
    /// Contract-level defaults (insurer, validity window, default tax class, ...).
    #[serde(default)]
    pub contract_metadata: FreeForm,

    /// Table profiles, in detection order. Never empty.
    pub table_types: Vec<TableType>,
}

impl ExtractionRuleDocument {
    /// Document with a single empty default table type.
    pub fn new() -> Self {
        Self::with_table_types(Vec::new())
    }

    /// Document seeded from detected table types, falling back to the default one.
    pub fn with_table_types(table_types: Vec<TableType>) -> Self {
        let table_types = if table_types.is_empty() {
            vec![TableType::default_table()]
        } else {
            table_types
        };
        Self {
            contract_metadata: FreeForm::new(),
            table_types,
        }
    }

    /// Table type at `index`.
    pub fn table_type(&self, index: usize) -> Option<&TableType> {
        self.table_types.get(index)
    }

    /// Table type with the given identifier.
    pub fn table_type_by_id(&self, id: &str) -> Option<&TableType> {
        self.table_types.iter().find(|t| t.table_type_id == id)
    }

    /// Position of the table type with the given identifier.
    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.table_types.iter().position(|t| t.table_type_id == id)
    }

    /// String value of a contract metadata entry, ignoring empty strings.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.contract_metadata
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Restore the structural invariants: at least one table type, contiguous
    /// column indices, at least one action per rule.
    pub fn normalize(&mut self) {
        if self.table_types.is_empty() {
            self.table_types.push(TableType::default_table());
        }
        for table in &mut self.table_types {
            table.normalize();
        }
    }

    /// Whether all structural invariants hold.
    pub fn is_well_formed(&self) -> bool {
        !self.table_types.is_empty()
            && self.table_types.iter().all(|t| {
                t.columns.iter().enumerate().all(|(i, c)| c.index == i)
                    && t.conditional_rules.iter().all(|r| !r.actions.is_empty())
            })
    }
}

impl Default for ExtractionRuleDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// Independently configured extraction profile for one recurring table layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableType {
    table_type_id: String,

    /// Human label.
    #[serde(default)]
    pub table_name: String,

    /// How a physical header row is matched to this type.
    #[serde(default)]
    pub header_matcher: HeaderMatcher,

    /// Column definitions, `columns[i].index == i`.
    #[serde(default)]
    pub columns: Vec<ColumnDefinition>,

    /// Backend-side value normalisation, opaque here.
    #[serde(default)]
    pub transformation_rules: FreeForm,

    /// Multiple price columns per row.
    #[serde(default)]
    pub multi_price_config: MultiPriceConfig,

    /// Row and value validation.
    #[serde(default)]
    pub validation_rules: ValidationRules,

    /// Post-processing rules in application order.
    #[serde(default)]
    pub conditional_rules: Vec<ConditionalRule>,
}

impl TableType {
    /// Empty table type with the given identifier and name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table_type_id: id.into(),
            table_name: name.into(),
            header_matcher: HeaderMatcher::default(),
            columns: Vec::new(),
            transformation_rules: FreeForm::new(),
            multi_price_config: MultiPriceConfig::default(),
            validation_rules: ValidationRules::default(),
            conditional_rules: Vec::new(),
        }
    }

    /// The `"default"` / `"Haupttabelle"` table type.
    pub fn default_table() -> Self {
        Self::new(DEFAULT_TABLE_TYPE_ID, DEFAULT_TABLE_NAME)
    }

    /// Stable identifier, fixed at creation.
    pub fn id(&self) -> &str {
        &self.table_type_id
    }

    /// Restore contiguous column indices and non-empty rule actions.
    ///
    /// Blank descriptions and a blank position pattern become `None`, the
    /// form they take after a save and reload.
    pub fn normalize(&mut self) {
        self.reindex_columns();
        for column in &mut self.columns {
            if column.description.as_deref().is_some_and(|d| d.trim().is_empty()) {
                column.description = None;
            }
        }
        let rules = &mut self.validation_rules;
        if rules.position_number_pattern.as_deref().is_some_and(|p| p.trim().is_empty()) {
            rules.position_number_pattern = None;
        }
        for rule in &mut self.conditional_rules {
            if rule.actions.is_empty() {
                rule.actions.push(RuleAction::default());
            }
        }
    }

    /// Re-derive every column index from its position.
    pub fn reindex_columns(&mut self) {
        for (i, column) in self.columns.iter_mut().enumerate() {
            column.index = i;
        }
    }

    /// Resolve a column reference to a physical column index.
    ///
    /// Names are compared after trimming, case-insensitively.
    pub fn resolve_column(&self, column: &ColumnRef) -> Option<usize> {
        match column {
            ColumnRef::ByIndex(index) => Some(*index),
            ColumnRef::ByName(name) => {
                let wanted = name.trim();
                self.columns
                    .iter()
                    .find(|c| c.name.trim().eq_ignore_ascii_case(wanted))
                    .map(|c| c.index)
            }
        }
    }

    /// Column indices of the configured price columns.
    ///
    /// Without multiple prices this is the single column mapped to `price`.
    pub fn price_column_indices(&self) -> Vec<usize> {
        if self.multi_price_config.has_multiple_prices {
            self.multi_price_config
                .price_columns
                .iter()
                .filter_map(|p| p.column_index)
                .collect()
        } else {
            self.columns
                .iter()
                .filter(|c| c.mapped_to == Some(MappedField::Price))
                .map(|c| c.index)
                .take(1)
                .collect()
        }
    }
}

/// Header row matching configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderMatcher {
    /// Headers that must appear (per strategy).
    #[serde(default)]
    pub required_headers: Vec<String>,

    /// Headers that raise match confidence.
    #[serde(default)]
    pub optional_headers: Vec<String>,

    #[serde(default)]
    pub matching_strategy: MatchingStrategy,

    /// Only meaningful under [`MatchingStrategy::MinimumCount`].
    #[serde(
        default,
        deserialize_with = "lenient_index",
        skip_serializing_if = "Option::is_none"
    )]
    pub minimum_match_count: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// How required headers are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchingStrategy {
    /// Every required header must be present.
    #[default]
    AllRequired,
    /// At least one required header must be present.
    AnyRequired,
    /// At least `minimumMatchCount` required headers must be present.
    MinimumCount,
}

/// One column of a table type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefinition {
    /// Zero-based position, kept in sync with array order.
    #[serde(default, deserialize_with = "lenient_position")]
    pub index: usize,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub data_type: DataType,

    #[serde(
        default,
        deserialize_with = "empty_string_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,

    #[serde(default)]
    pub required: bool,

    /// Semantic target field.
    #[serde(
        default,
        deserialize_with = "empty_string_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub mapped_to: Option<MappedField>,
}

impl ColumnDefinition {
    /// Empty `TEXT` column at `index`.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }
}

/// Cell data type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    #[default]
    Text,
    Number,
    Currency,
    Date,
    Percentage,
}

/// Semantic field a column maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MappedField {
    PositionNumber,
    Description,
    Unit,
    Price,
    Tax,
    CostEstimate,
    SupplyType,
    HmvCategory,
    HmvMainGroup,
    PriceType,
    ValidAt,
    ValidUntil,
    CopaymentAdult,
    CopaymentChild,
    CopaymentUniversal,
}

impl MappedField {
    /// Record and field name this mapping fills.
    pub fn target(self) -> (RecordScope, &'static str) {
        use RecordScope::{Position, Price};
        match self {
            Self::PositionNumber => (Position, fields::POSITION_NUMBER),
            Self::Description => (Position, fields::DESCRIPTION),
            Self::Unit => (Position, fields::UNIT),
            Self::Tax => (Position, fields::TAX),
            Self::CostEstimate => (Position, fields::COST_ESTIMATE_REQUIRED),
            Self::SupplyType => (Position, fields::SUPPLY_TYPE),
            Self::HmvCategory => (Position, fields::HMV_CATEGORY),
            Self::HmvMainGroup => (Position, fields::HMV_MAIN_GROUP),
            Self::Price => (Price, fields::PRICE),
            Self::PriceType => (Price, fields::PRICE_TYPE),
            Self::ValidAt => (Price, fields::VALID_AT),
            Self::ValidUntil => (Price, fields::VALID_UNTIL),
            Self::CopaymentAdult => (Price, fields::COPAYMENT_ADULT),
            Self::CopaymentChild => (Price, fields::COPAYMENT_CHILD),
            Self::CopaymentUniversal => (Price, fields::COPAYMENT_UNIVERSAL),
        }
    }
}

/// Multiple prices per row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiPriceConfig {
    #[serde(default)]
    pub has_multiple_prices: bool,

    /// Kept even while `has_multiple_prices` is off.
    #[serde(default)]
    pub price_columns: Vec<PriceColumn>,
}

/// One price column of a multi-price table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceColumn {
    #[serde(default, deserialize_with = "lenient_index")]
    pub column_index: Option<usize>,

    /// E.g. "Festpreis", "Höchstpreis".
    #[serde(default)]
    pub price_type: String,
}

/// Row layout and value validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRules {
    /// Regex a position number must fully match; other rows are skipped.
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub position_number_pattern: Option<String>,

    #[serde(default, deserialize_with = "lenient_index")]
    pub header_row_index: Option<usize>,

    #[serde(default, deserialize_with = "lenient_index")]
    pub first_data_row_index: Option<usize>,

    #[serde(default)]
    pub validity_date_rules: FreeForm,
}

/// If/then post-processing rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalRule {
    #[serde(default)]
    pub name: String,

    /// Disabled rules are kept but skipped.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,

    #[serde(default)]
    pub condition: Condition,

    /// Applied in order. Never empty.
    #[serde(default)]
    pub actions: Vec<RuleAction>,
}

fn enabled_by_default() -> bool {
    true
}

impl ConditionalRule {
    /// Enabled rule with an empty `COLUMN_CONTAINS` condition and one default action.
    pub fn new() -> Self {
        Self {
            name: String::new(),
            enabled: true,
            condition: Condition::default(),
            actions: vec![RuleAction::default()],
        }
    }
}

impl Default for ConditionalRule {
    fn default() -> Self {
        Self::new()
    }
}

/// Addressing of the cell a condition inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    /// Physical column position.
    ByIndex(usize),
    /// Column definition name, resolved per table type.
    ByName(String),
}

/// Condition of a [`ConditionalRule`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ConditionWire", into = "ConditionWire")]
pub struct Condition {
    pub kind: ConditionType,
    /// `None` until the user picks a column; such a condition never fires.
    pub column: Option<ColumnRef>,
    pub value: Option<String>,
    pub case_sensitive: bool,
}

impl Default for Condition {
    fn default() -> Self {
        Self {
            kind: ConditionType::ColumnContains,
            column: None,
            value: Some(String::new()),
            case_sensitive: false,
        }
    }
}

/// Wire form with the two addressing fields; a non-empty `columnName` wins.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConditionWire {
    #[serde(rename = "type", default)]
    kind: ConditionType,
    #[serde(default, deserialize_with = "lenient_index")]
    column_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    column_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(default)]
    case_sensitive: bool,
}

impl From<ConditionWire> for Condition {
    fn from(wire: ConditionWire) -> Self {
        let column = match (wire.column_name, wire.column_index) {
            (Some(name), _) if !name.trim().is_empty() => Some(ColumnRef::ByName(name)),
            (_, Some(index)) => Some(ColumnRef::ByIndex(index)),
            _ => None,
        };
        Self {
            kind: wire.kind,
            column,
            value: wire.value,
            case_sensitive: wire.case_sensitive,
        }
    }
}

impl From<Condition> for ConditionWire {
    fn from(condition: Condition) -> Self {
        let (column_index, column_name) = match condition.column {
            Some(ColumnRef::ByIndex(index)) => (Some(index), None),
            Some(ColumnRef::ByName(name)) => (None, Some(name)),
            None => (None, None),
        };
        Self {
            kind: condition.kind,
            column_index,
            column_name,
            value: condition.value,
            case_sensitive: condition.case_sensitive,
        }
    }
}

/// Condition predicate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionType {
    #[default]
    ColumnContains,
    ColumnEquals,
    ColumnMatchesRegex,
    ColumnNotEmpty,
    ColumnEmpty,
}

impl ConditionType {
    /// Whether the predicate compares against `value`.
    pub fn uses_value(self) -> bool {
        matches!(
            self,
            Self::ColumnContains | Self::ColumnEquals | Self::ColumnMatchesRegex
        )
    }
}

/// Action applied when a rule's condition holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleAction {
    #[serde(rename = "type", default)]
    pub kind: ActionType,

    #[serde(default)]
    pub field_name: String,

    #[serde(default)]
    pub value: String,

    #[serde(default)]
    pub scope: RecordScope,

    /// Only meaningful for `PRICE` scope on multi-price tables; `None`
    /// targets every price.
    #[serde(default, deserialize_with = "lenient_index")]
    pub target_price_column: Option<usize>,
}

impl Default for RuleAction {
    fn default() -> Self {
        Self {
            kind: ActionType::SetField,
            field_name: String::new(),
            value: String::new(),
            scope: RecordScope::Position,
            target_price_column: None,
        }
    }
}

/// Action kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    #[default]
    SetField,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_condition_column_name_takes_precedence() {
        let condition: Condition = serde_json::from_value(json!({
            "type": "COLUMN_EQUALS",
            "columnIndex": 4,
            "columnName": "Hinweis",
            "value": "KV",
            "caseSensitive": true
        }))
        .unwrap();

        assert_eq!(condition.column, Some(ColumnRef::ByName("Hinweis".to_string())));

        let wire = serde_json::to_value(&condition).unwrap();
        assert_eq!(wire["columnIndex"], serde_json::Value::Null);
        assert_eq!(wire["columnName"], "Hinweis");
    }

    #[test]
    fn test_condition_blank_name_falls_back_to_index() {
        let condition: Condition = serde_json::from_value(json!({
            "type": "COLUMN_CONTAINS",
            "columnIndex": 2,
            "columnName": "  "
        }))
        .unwrap();

        assert_eq!(condition.column, Some(ColumnRef::ByIndex(2)));
        assert!(!condition.case_sensitive);
    }

    #[test]
    fn test_empty_mapped_to_is_none() {
        let column: ColumnDefinition = serde_json::from_value(json!({
            "index": 0,
            "name": "Pos.",
            "dataType": "TEXT",
            "required": true,
            "mappedTo": ""
        }))
        .unwrap();

        assert_eq!(column.mapped_to, None);
        assert!(column.required);
    }

    #[test]
    fn test_document_json_round_trip() {
        let raw = json!({
            "contractMetadata": {"healthInsuranceName": "AOK Bayern", "validFrom": "2024-01-01"},
            "tableTypes": [{
                "tableTypeId": "tableType_1700000000000",
                "tableName": "Preistabelle",
                "headerMatcher": {
                    "requiredHeaders": ["Pos.-Nr.", "Preis"],
                    "optionalHeaders": ["Einheit"],
                    "matchingStrategy": "MINIMUM_COUNT",
                    "minimumMatchCount": 1
                },
                "columns": [
                    {"index": 0, "name": "Pos.-Nr.", "dataType": "TEXT", "required": true, "mappedTo": "positionNumber"},
                    {"index": 1, "name": "Preis", "dataType": "CURRENCY", "required": false, "mappedTo": "price"}
                ],
                "transformationRules": {"trim": true},
                "multiPriceConfig": {"hasMultiplePrices": true, "priceColumns": [{"columnIndex": 1, "priceType": "Festpreis"}]},
                "validationRules": {"positionNumberPattern": "31\\.\\d+", "headerRowIndex": 0, "firstDataRowIndex": 1, "validityDateRules": {}},
                "conditionalRules": [{
                    "name": "KV bedeutet Kostenvoranschlag",
                    "enabled": true,
                    "condition": {"type": "COLUMN_CONTAINS", "columnIndex": 0, "value": "KV", "caseSensitive": false},
                    "actions": [{"type": "SET_FIELD", "fieldName": "costEstimateRequired", "value": "YES", "scope": "POSITION", "targetPriceColumn": null}]
                }]
            }]
        });

        let doc: ExtractionRuleDocument = serde_json::from_value(raw).unwrap();
        let json = serde_json::to_string(&doc).unwrap();
        let parsed: ExtractionRuleDocument = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, doc);
        assert_eq!(doc.table_types[0].id(), "tableType_1700000000000");
    }

    #[test]
    fn test_normalize_restores_invariants() {
        let mut doc = ExtractionRuleDocument {
            contract_metadata: FreeForm::new(),
            table_types: Vec::new(),
        };
        doc.normalize();
        assert_eq!(doc.table_types.len(), 1);
        assert_eq!(doc.table_types[0].id(), DEFAULT_TABLE_TYPE_ID);

        let table = &mut doc.table_types[0];
        table.columns = vec![ColumnDefinition::new(5), ColumnDefinition::new(5)];
        let mut rule = ConditionalRule::new();
        rule.actions.clear();
        table.conditional_rules.push(rule);
        assert!(!doc.is_well_formed());

        doc.normalize();
        assert!(doc.is_well_formed());
        assert_eq!(doc.table_types[0].columns[1].index, 1);
    }

    #[test]
    fn test_resolve_column_by_name() {
        let mut table = TableType::new("t", "Tabelle");
        table.columns = vec![ColumnDefinition::new(0), ColumnDefinition::new(1)];
        table.columns[1].name = "Hinweis".to_string();

        assert_eq!(table.resolve_column(&ColumnRef::ByName("hinweis ".into())), Some(1));
        assert_eq!(table.resolve_column(&ColumnRef::ByName("Preis".into())), None);
        assert_eq!(table.resolve_column(&ColumnRef::ByIndex(7)), Some(7));
    }
}
