//! Position and price records produced per table row.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::rules::amounts::parse_german_amount;
use crate::rules::dates::parse_date;

/// Field names understood by the backend.
pub mod fields {
    pub const POSITION_NUMBER: &str = "positionNumber";
    pub const DESCRIPTION: &str = "description";
    pub const UNIT: &str = "unit";
    pub const TAX: &str = "tax";
    pub const COST_ESTIMATE_REQUIRED: &str = "costEstimateRequired";
    pub const SUPPLY_TYPE: &str = "supplyType";
    pub const HMV_CATEGORY: &str = "hmvCategory";
    pub const HMV_MAIN_GROUP: &str = "hmvMainGroup";

    pub const PRICE: &str = "price";
    pub const PRICE_TYPE: &str = "priceType";
    pub const VALID_AT: &str = "validAt";
    pub const VALID_UNTIL: &str = "validUntil";
    pub const COPAYMENT_ADULT: &str = "copaymentAdult";
    pub const COPAYMENT_CHILD: &str = "copaymentChild";
    pub const COPAYMENT_UNIVERSAL: &str = "copaymentUniversal";

    /// Fields of a position record.
    pub const POSITION_FIELDS: &[&str] = &[
        POSITION_NUMBER,
        DESCRIPTION,
        UNIT,
        TAX,
        COST_ESTIMATE_REQUIRED,
        SUPPLY_TYPE,
        HMV_CATEGORY,
        HMV_MAIN_GROUP,
    ];

    /// Fields of a price record.
    pub const PRICE_FIELDS: &[&str] = &[
        PRICE,
        PRICE_TYPE,
        VALID_AT,
        VALID_UNTIL,
        COPAYMENT_ADULT,
        COPAYMENT_CHILD,
        COPAYMENT_UNIVERSAL,
    ];

    /// Fields holding amounts.
    pub const AMOUNT_FIELDS: &[&str] =
        &[PRICE, COPAYMENT_ADULT, COPAYMENT_CHILD, COPAYMENT_UNIVERSAL];

    /// Fields holding dates.
    pub const DATE_FIELDS: &[&str] = &[VALID_AT, VALID_UNTIL];
}

/// Which record an action or column mapping writes to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordScope {
    #[default]
    Position,
    Price,
}

impl RecordScope {
    /// Field names valid in this scope.
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            Self::Position => fields::POSITION_FIELDS,
            Self::Price => fields::PRICE_FIELDS,
        }
    }
}

/// Tax class of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaxClass {
    /// Ermäßigt (7%).
    Reduced,
    /// Standard (19%).
    Standard,
}

impl TaxClass {
    /// Parse from the wire value or a percentage.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().trim_end_matches('%').trim().to_uppercase().as_str() {
            "REDUCED" | "7" | "ERMÄSSIGT" | "ERMÄẞIGT" => Some(Self::Reduced),
            "STANDARD" | "19" => Some(Self::Standard),
            _ => None,
        }
    }

    /// Tax rate as decimal.
    pub fn rate(self) -> Decimal {
        match self {
            Self::Reduced => Decimal::new(7, 2),
            Self::Standard => Decimal::new(19, 2),
        }
    }
}

/// Whether a cost estimate (Kostenvoranschlag) is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CostEstimate {
    Yes,
    No,
    Unknown,
}

impl CostEstimate {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "YES" | "JA" => Some(Self::Yes),
            "NO" | "NEIN" => Some(Self::No),
            "UNKNOWN" | "UNBEKANNT" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// Kind of supply a position covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupplyType {
    /// Erstversorgung.
    Initial,
    /// Wechselversorgung.
    Replacement,
    Both,
}

impl SupplyType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "INITIAL" => Some(Self::Initial),
            "REPLACEMENT" => Some(Self::Replacement),
            "BOTH" => Some(Self::Both),
            _ => None,
        }
    }
}

/// Check a value against the vocabulary of its field, if the field has one.
pub fn is_valid_field_value(field: &str, value: &str) -> bool {
    match field {
        fields::TAX => TaxClass::from_str(value).is_some(),
        fields::COST_ESTIMATE_REQUIRED => CostEstimate::from_str(value).is_some(),
        fields::SUPPLY_TYPE => SupplyType::from_str(value).is_some(),
        f if fields::AMOUNT_FIELDS.contains(&f) => parse_german_amount(value).is_some(),
        f if fields::DATE_FIELDS.contains(&f) => parse_date(value).is_some(),
        _ => true,
    }
}

/// One table row as a position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRecord {
    /// Row in the source grid.
    pub row_index: usize,

    /// Field values by field name.
    pub fields: BTreeMap<String, String>,

    /// One record per price column.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prices: Vec<PriceRecord>,

    /// Names of the conditional rules that fired, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applied_rules: Vec<String>,
}

impl PositionRecord {
    pub fn new(row_index: usize) -> Self {
        Self {
            row_index,
            ..Self::default()
        }
    }

    /// Field value, ignoring empty strings.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn position_number(&self) -> Option<&str> {
        self.get(fields::POSITION_NUMBER)
    }

    pub fn tax_class(&self) -> Option<TaxClass> {
        self.get(fields::TAX).and_then(TaxClass::from_str)
    }

    pub fn cost_estimate(&self) -> Option<CostEstimate> {
        self.get(fields::COST_ESTIMATE_REQUIRED)
            .and_then(CostEstimate::from_str)
    }

    pub fn supply_type(&self) -> Option<SupplyType> {
        self.get(fields::SUPPLY_TYPE).and_then(SupplyType::from_str)
    }

    /// Check the record and return any issues found.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.position_number().is_none() {
            issues.push(format!("Row {}: missing position number", self.row_index));
        }

        for (field, value) in &self.fields {
            if !value.is_empty() && !is_valid_field_value(field, value) {
                issues.push(format!(
                    "Row {}: invalid value '{}' for {}",
                    self.row_index, value, field
                ));
            }
        }

        for price in &self.prices {
            for (field, value) in &price.fields {
                if !value.is_empty() && !is_valid_field_value(field, value) {
                    issues.push(format!(
                        "Row {}: invalid value '{}' for {}",
                        self.row_index, value, field
                    ));
                }
            }
        }

        issues
    }
}

/// One price of a position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRecord {
    /// Column the price was read from.
    pub source_column: Option<usize>,

    /// Field values by field name.
    pub fields: BTreeMap<String, String>,
}

impl PriceRecord {
    pub fn new(source_column: Option<usize>) -> Self {
        Self {
            source_column,
            fields: BTreeMap::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Parsed price amount.
    pub fn amount(&self) -> Option<Decimal> {
        self.get(fields::PRICE).and_then(parse_german_amount)
    }

    pub fn valid_at(&self) -> Option<NaiveDate> {
        self.get(fields::VALID_AT).and_then(parse_date)
    }

    pub fn valid_until(&self) -> Option<NaiveDate> {
        self.get(fields::VALID_UNTIL).and_then(parse_date)
    }
}

/// Row excluded from the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRow {
    pub row_index: usize,
    pub reason: SkipReason,
}

/// Why a row was not treated as data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// All cells empty.
    Blank,
    /// Position number missing or not matching the configured pattern.
    PositionNumberMismatch,
}

/// Output of evaluating one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableExtraction {
    pub table_type_id: String,
    pub table_name: String,
    pub positions: Vec<PositionRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_rows: Vec<SkippedRow>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_tax_class_parsing() {
        assert_eq!(TaxClass::from_str("REDUCED"), Some(TaxClass::Reduced));
        assert_eq!(TaxClass::from_str("7%"), Some(TaxClass::Reduced));
        assert_eq!(TaxClass::from_str("standard"), Some(TaxClass::Standard));
        assert_eq!(TaxClass::from_str("16"), None);
        assert_eq!(TaxClass::Standard.rate(), Decimal::new(19, 2));
    }

    #[test]
    fn test_field_value_vocabulary() {
        assert!(is_valid_field_value(fields::COST_ESTIMATE_REQUIRED, "YES"));
        assert!(!is_valid_field_value(fields::COST_ESTIMATE_REQUIRED, "vielleicht"));
        assert!(is_valid_field_value(fields::SUPPLY_TYPE, "BOTH"));
        assert!(is_valid_field_value(fields::PRICE, "125,50"));
        assert!(!is_valid_field_value(fields::PRICE, "n/a"));
        assert!(is_valid_field_value(fields::VALID_AT, "01.04.2024"));
        assert!(is_valid_field_value(fields::DESCRIPTION, "anything"));
    }

    #[test]
    fn test_price_record_amount() {
        let mut price = PriceRecord::new(Some(3));
        price.set(fields::PRICE, "1.234,56 €");
        assert_eq!(price.amount(), Some(Decimal::from_str("1234.56").unwrap()));
    }

    #[test]
    fn test_position_validate() {
        let mut position = PositionRecord::new(4);
        position.set(fields::TAX, "REDUCED");
        let issues = position.validate();
        assert_eq!(issues, vec!["Row 4: missing position number".to_string()]);

        position.set(fields::POSITION_NUMBER, "31.03.01.0001");
        position.set(fields::TAX, "maybe");
        let issues = position.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("tax"));
    }
}
