//! Structural edits of a rule document.
//!
//! Every operation takes the current document by reference and returns a new
//! one; the argument is never modified. Indices that do not address an
//! existing element turn the operation into a no-op. The only failures are the
//! two invariant guards, reported as [`EditRejected`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::EditRejected;
use crate::models::records::RecordScope;
use crate::models::rules::{
    ColumnDefinition, ColumnRef, ConditionType, ConditionalRule, DataType,
    ExtractionRuleDocument, FreeForm, HeaderMatcher, MappedField, MultiPriceConfig, PriceColumn,
    RuleAction, TableType, ValidationRules,
};

/// Name of table types added by [`add_table_type`].
pub const NEW_TABLE_NAME: &str = "Neue Tabelle";

/// Direction for [`move_column`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    Up,
    Down,
}

/// Fields of a table type that may be replaced; the identifier is not among them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TableTypePatch {
    pub table_name: Option<String>,
    pub header_matcher: Option<HeaderMatcher>,
    pub columns: Option<Vec<ColumnDefinition>>,
    pub transformation_rules: Option<FreeForm>,
    pub multi_price_config: Option<MultiPriceConfig>,
    pub validation_rules: Option<ValidationRules>,
    pub conditional_rules: Option<Vec<ConditionalRule>>,
}

/// Single-field update of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum ColumnUpdate {
    Name(String),
    DataType(DataType),
    Description(Option<String>),
    Required(bool),
    MappedTo(Option<MappedField>),
}

/// Single-field update of a conditional rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum RuleUpdate {
    Name(String),
    Enabled(bool),
}

/// Single-field update of a rule condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum ConditionUpdate {
    Type(ConditionType),
    /// Address by position; replaces a name reference.
    ColumnIndex(Option<usize>),
    /// Address by column name; replaces an index reference.
    ColumnName(Option<String>),
    Value(Option<String>),
    CaseSensitive(bool),
}

/// Single-field update of a rule action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum ActionUpdate {
    FieldName(String),
    Value(String),
    Scope(RecordScope),
    TargetPriceColumn(Option<usize>),
}

/// Single-field update of a price column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum PriceColumnUpdate {
    ColumnIndex(Option<usize>),
    PriceType(String),
}

/// Single-field update of the validation rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum ValidationUpdate {
    PositionNumberPattern(Option<String>),
    HeaderRowIndex(Option<usize>),
    FirstDataRowIndex(Option<usize>),
}

/// Identifier not yet used in `doc`, derived from the current time.
pub fn generate_table_type_id(doc: &ExtractionRuleDocument) -> String {
    let base = format!("tableType_{}", Utc::now().timestamp_millis());
    if doc.table_type_by_id(&base).is_none() {
        return base;
    }
    let mut suffix = 1;
    loop {
        let id = format!("{}_{}", base, suffix);
        if doc.table_type_by_id(&id).is_none() {
            return id;
        }
        suffix += 1;
    }
}

/// Append an empty table type named [`NEW_TABLE_NAME`].
pub fn add_table_type(doc: &ExtractionRuleDocument) -> ExtractionRuleDocument {
    add_named_table_type(doc, NEW_TABLE_NAME)
}

/// Append an empty table type with a fresh identifier.
pub fn add_named_table_type(doc: &ExtractionRuleDocument, name: &str) -> ExtractionRuleDocument {
    let mut next = doc.clone();
    let id = generate_table_type_id(doc);
    debug!(%id, "adding table type");
    next.table_types.push(TableType::new(id, name));
    next
}

/// Remove the table type at `index`; the last one cannot be removed.
///
/// Callers holding a selection pointer adjust it with [`selection_after_delete`].
pub fn delete_table_type(
    doc: &ExtractionRuleDocument,
    index: usize,
) -> Result<ExtractionRuleDocument, EditRejected> {
    if doc.table_types.len() <= 1 {
        warn!("refusing to delete the last table type");
        return Err(EditRejected::LastTableType);
    }
    let mut next = doc.clone();
    if index < next.table_types.len() {
        next.table_types.remove(index);
    } else {
        warn!(index, "no table type to delete");
    }
    Ok(next)
}

/// Selection pointer after deleting the table type at `deleted`.
pub fn selection_after_delete(selected: usize, deleted: usize) -> usize {
    if selected >= deleted && selected > 0 {
        selected - 1
    } else {
        selected
    }
}

/// Replace the given fields of a table type.
pub fn update_table_type(
    doc: &ExtractionRuleDocument,
    index: usize,
    patch: TableTypePatch,
) -> ExtractionRuleDocument {
    edit_table(doc, index, |table| {
        if let Some(name) = patch.table_name {
            table.table_name = name;
        }
        if let Some(matcher) = patch.header_matcher {
            table.header_matcher = matcher;
        }
        if let Some(columns) = patch.columns {
            table.columns = columns;
        }
        if let Some(rules) = patch.transformation_rules {
            table.transformation_rules = rules;
        }
        if let Some(config) = patch.multi_price_config {
            table.multi_price_config = config;
        }
        if let Some(rules) = patch.validation_rules {
            table.validation_rules = rules;
        }
        if let Some(rules) = patch.conditional_rules {
            table.conditional_rules = rules;
        }
        table.normalize();
    })
}

/// Set or remove one contract metadata entry.
pub fn update_contract_metadata(
    doc: &ExtractionRuleDocument,
    key: &str,
    value: Option<serde_json::Value>,
) -> ExtractionRuleDocument {
    let mut next = doc.clone();
    match value {
        Some(value) => {
            next.contract_metadata.insert(key.to_string(), value);
        }
        None => {
            next.contract_metadata.remove(key);
        }
    }
    next
}

/// Update one field of the validation rules.
pub fn update_validation_rules(
    doc: &ExtractionRuleDocument,
    type_index: usize,
    update: ValidationUpdate,
) -> ExtractionRuleDocument {
    edit_table(doc, type_index, |table| {
        let rules = &mut table.validation_rules;
        match update {
            ValidationUpdate::PositionNumberPattern(pattern) => {
                rules.position_number_pattern = pattern.filter(|p| !p.trim().is_empty());
            }
            ValidationUpdate::HeaderRowIndex(index) => rules.header_row_index = index,
            ValidationUpdate::FirstDataRowIndex(index) => rules.first_data_row_index = index,
        }
    })
}

/// Append an empty `TEXT` column.
pub fn add_column(doc: &ExtractionRuleDocument, type_index: usize) -> ExtractionRuleDocument {
    edit_table(doc, type_index, |table| {
        let index = table.columns.len();
        table.columns.push(ColumnDefinition::new(index));
    })
}

/// Update one field of a column.
pub fn update_column(
    doc: &ExtractionRuleDocument,
    type_index: usize,
    column_index: usize,
    update: ColumnUpdate,
) -> ExtractionRuleDocument {
    edit_table(doc, type_index, |table| {
        if let Some(column) = table.columns.get_mut(column_index) {
            match update {
                ColumnUpdate::Name(name) => column.name = name,
                ColumnUpdate::DataType(data_type) => column.data_type = data_type,
                ColumnUpdate::Description(description) => {
                    column.description = description.filter(|d| !d.trim().is_empty());
                }
                ColumnUpdate::Required(required) => column.required = required,
                ColumnUpdate::MappedTo(mapped_to) => column.mapped_to = mapped_to,
            }
        } else {
            warn!(column_index, "no column to update");
        }
        table.reindex_columns();
    })
}

/// Remove a column and shift the following ones down.
pub fn remove_column(
    doc: &ExtractionRuleDocument,
    type_index: usize,
    column_index: usize,
) -> ExtractionRuleDocument {
    edit_table(doc, type_index, |table| {
        if column_index < table.columns.len() {
            table.columns.remove(column_index);
        }
        table.reindex_columns();
    })
}

/// Swap a column with its neighbour; no-op at either end.
pub fn move_column(
    doc: &ExtractionRuleDocument,
    type_index: usize,
    column_index: usize,
    direction: MoveDirection,
) -> ExtractionRuleDocument {
    edit_table(doc, type_index, |table| {
        let len = table.columns.len();
        let target = match direction {
            MoveDirection::Up if column_index > 0 && column_index < len => column_index - 1,
            MoveDirection::Down if column_index + 1 < len => column_index + 1,
            _ => return,
        };
        table.columns.swap(column_index, target);
        table.reindex_columns();
    })
}

/// Append an enabled rule with one default action.
pub fn add_conditional_rule(
    doc: &ExtractionRuleDocument,
    type_index: usize,
) -> ExtractionRuleDocument {
    edit_table(doc, type_index, |table| {
        table.conditional_rules.push(ConditionalRule::new());
    })
}

pub fn remove_conditional_rule(
    doc: &ExtractionRuleDocument,
    type_index: usize,
    rule_index: usize,
) -> ExtractionRuleDocument {
    edit_table(doc, type_index, |table| {
        if rule_index < table.conditional_rules.len() {
            table.conditional_rules.remove(rule_index);
        }
    })
}

pub fn update_conditional_rule(
    doc: &ExtractionRuleDocument,
    type_index: usize,
    rule_index: usize,
    update: RuleUpdate,
) -> ExtractionRuleDocument {
    edit_rule(doc, type_index, rule_index, |rule| match update {
        RuleUpdate::Name(name) => rule.name = name,
        RuleUpdate::Enabled(enabled) => rule.enabled = enabled,
    })
}

/// Update one field of a rule's condition.
///
/// Setting a column name clears the index reference and vice versa.
pub fn update_condition(
    doc: &ExtractionRuleDocument,
    type_index: usize,
    rule_index: usize,
    update: ConditionUpdate,
) -> ExtractionRuleDocument {
    edit_rule(doc, type_index, rule_index, |rule| {
        let condition = &mut rule.condition;
        match update {
            ConditionUpdate::Type(kind) => condition.kind = kind,
            ConditionUpdate::ColumnIndex(Some(index)) => {
                condition.column = Some(ColumnRef::ByIndex(index));
            }
            ConditionUpdate::ColumnIndex(None) => {
                if matches!(condition.column, Some(ColumnRef::ByIndex(_))) {
                    condition.column = None;
                }
            }
            ConditionUpdate::ColumnName(Some(name)) if !name.trim().is_empty() => {
                condition.column = Some(ColumnRef::ByName(name));
            }
            ConditionUpdate::ColumnName(_) => {
                if matches!(condition.column, Some(ColumnRef::ByName(_))) {
                    condition.column = None;
                }
            }
            ConditionUpdate::Value(value) => condition.value = value,
            ConditionUpdate::CaseSensitive(case_sensitive) => {
                condition.case_sensitive = case_sensitive;
            }
        }
    })
}

/// Append a default `SET_FIELD` action with position scope.
pub fn add_action(
    doc: &ExtractionRuleDocument,
    type_index: usize,
    rule_index: usize,
) -> ExtractionRuleDocument {
    edit_rule(doc, type_index, rule_index, |rule| {
        rule.actions.push(RuleAction::default());
    })
}

/// Remove an action; the last action of a rule cannot be removed.
pub fn remove_action(
    doc: &ExtractionRuleDocument,
    type_index: usize,
    rule_index: usize,
    action_index: usize,
) -> Result<ExtractionRuleDocument, EditRejected> {
    let action_count = doc
        .table_type(type_index)
        .and_then(|t| t.conditional_rules.get(rule_index))
        .map(|r| r.actions.len());

    if action_count.is_some_and(|n| n <= 1) {
        warn!(type_index, rule_index, "refusing to remove the last action of a rule");
        return Err(EditRejected::LastAction);
    }

    Ok(edit_rule(doc, type_index, rule_index, |rule| {
        if action_index < rule.actions.len() {
            rule.actions.remove(action_index);
        }
    }))
}

pub fn update_action(
    doc: &ExtractionRuleDocument,
    type_index: usize,
    rule_index: usize,
    action_index: usize,
    update: ActionUpdate,
) -> ExtractionRuleDocument {
    edit_rule(doc, type_index, rule_index, |rule| {
        let Some(action) = rule.actions.get_mut(action_index) else {
            warn!(action_index, "no action to update");
            return;
        };
        match update {
            ActionUpdate::FieldName(name) => action.field_name = name,
            ActionUpdate::Value(value) => action.value = value,
            ActionUpdate::Scope(scope) => action.scope = scope,
            ActionUpdate::TargetPriceColumn(column) => action.target_price_column = column,
        }
    })
}

/// Toggle multiple prices; configured price columns are kept either way.
pub fn set_multiple_prices(
    doc: &ExtractionRuleDocument,
    type_index: usize,
    enabled: bool,
) -> ExtractionRuleDocument {
    edit_table(doc, type_index, |table| {
        table.multi_price_config.has_multiple_prices = enabled;
    })
}

pub fn add_price_column(doc: &ExtractionRuleDocument, type_index: usize) -> ExtractionRuleDocument {
    edit_table(doc, type_index, |table| {
        table.multi_price_config.price_columns.push(PriceColumn::default());
    })
}

pub fn remove_price_column(
    doc: &ExtractionRuleDocument,
    type_index: usize,
    price_index: usize,
) -> ExtractionRuleDocument {
    edit_table(doc, type_index, |table| {
        let columns = &mut table.multi_price_config.price_columns;
        if price_index < columns.len() {
            columns.remove(price_index);
        }
    })
}

pub fn update_price_column(
    doc: &ExtractionRuleDocument,
    type_index: usize,
    price_index: usize,
    update: PriceColumnUpdate,
) -> ExtractionRuleDocument {
    edit_table(doc, type_index, |table| {
        let Some(column) = table.multi_price_config.price_columns.get_mut(price_index) else {
            warn!(price_index, "no price column to update");
            return;
        };
        match update {
            PriceColumnUpdate::ColumnIndex(index) => column.column_index = index,
            PriceColumnUpdate::PriceType(price_type) => column.price_type = price_type,
        }
    })
}

/// One editor operation as data, e.g. from a JSON edit script or the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EditOperation {
    AddTableType {
        #[serde(default)]
        table_name: Option<String>,
    },
    DeleteTableType {
        type_index: usize,
    },
    UpdateTableType {
        type_index: usize,
        patch: TableTypePatch,
    },
    UpdateContractMetadata {
        key: String,
        #[serde(default)]
        value: Option<serde_json::Value>,
    },
    UpdateValidationRules {
        type_index: usize,
        update: ValidationUpdate,
    },
    AddColumn {
        type_index: usize,
    },
    UpdateColumn {
        type_index: usize,
        column_index: usize,
        update: ColumnUpdate,
    },
    RemoveColumn {
        type_index: usize,
        column_index: usize,
    },
    MoveColumn {
        type_index: usize,
        column_index: usize,
        direction: MoveDirection,
    },
    AddConditionalRule {
        type_index: usize,
    },
    RemoveConditionalRule {
        type_index: usize,
        rule_index: usize,
    },
    UpdateConditionalRule {
        type_index: usize,
        rule_index: usize,
        update: RuleUpdate,
    },
    UpdateCondition {
        type_index: usize,
        rule_index: usize,
        update: ConditionUpdate,
    },
    AddAction {
        type_index: usize,
        rule_index: usize,
    },
    RemoveAction {
        type_index: usize,
        rule_index: usize,
        action_index: usize,
    },
    UpdateAction {
        type_index: usize,
        rule_index: usize,
        action_index: usize,
        update: ActionUpdate,
    },
    SetMultiplePrices {
        type_index: usize,
        enabled: bool,
    },
    AddPriceColumn {
        type_index: usize,
    },
    RemovePriceColumn {
        type_index: usize,
        price_index: usize,
    },
    UpdatePriceColumn {
        type_index: usize,
        price_index: usize,
        update: PriceColumnUpdate,
    },
}

impl EditOperation {
    /// Run the operation against `doc`.
    pub fn apply(
        self,
        doc: &ExtractionRuleDocument,
    ) -> Result<ExtractionRuleDocument, EditRejected> {
        let next = match self {
            Self::AddTableType { table_name } => match table_name {
                Some(name) => add_named_table_type(doc, &name),
                None => add_table_type(doc),
            },
            Self::DeleteTableType { type_index } => delete_table_type(doc, type_index)?,
            Self::UpdateTableType { type_index, patch } => {
                update_table_type(doc, type_index, patch)
            }
            Self::UpdateContractMetadata { key, value } => {
                update_contract_metadata(doc, &key, value)
            }
            Self::UpdateValidationRules { type_index, update } => {
                update_validation_rules(doc, type_index, update)
            }
            Self::AddColumn { type_index } => add_column(doc, type_index),
            Self::UpdateColumn { type_index, column_index, update } => {
                update_column(doc, type_index, column_index, update)
            }
            Self::RemoveColumn { type_index, column_index } => {
                remove_column(doc, type_index, column_index)
            }
            Self::MoveColumn { type_index, column_index, direction } => {
                move_column(doc, type_index, column_index, direction)
            }
            Self::AddConditionalRule { type_index } => add_conditional_rule(doc, type_index),
            Self::RemoveConditionalRule { type_index, rule_index } => {
                remove_conditional_rule(doc, type_index, rule_index)
            }
            Self::UpdateConditionalRule { type_index, rule_index, update } => {
                update_conditional_rule(doc, type_index, rule_index, update)
            }
            Self::UpdateCondition { type_index, rule_index, update } => {
                update_condition(doc, type_index, rule_index, update)
            }
            Self::AddAction { type_index, rule_index } => add_action(doc, type_index, rule_index),
            Self::RemoveAction { type_index, rule_index, action_index } => {
                remove_action(doc, type_index, rule_index, action_index)?
            }
            Self::UpdateAction { type_index, rule_index, action_index, update } => {
                update_action(doc, type_index, rule_index, action_index, update)
            }
            Self::SetMultiplePrices { type_index, enabled } => {
                set_multiple_prices(doc, type_index, enabled)
            }
            Self::AddPriceColumn { type_index } => add_price_column(doc, type_index),
            Self::RemovePriceColumn { type_index, price_index } => {
                remove_price_column(doc, type_index, price_index)
            }
            Self::UpdatePriceColumn { type_index, price_index, update } => {
                update_price_column(doc, type_index, price_index, update)
            }
        };
        Ok(next)
    }
}

fn edit_table(
    doc: &ExtractionRuleDocument,
    type_index: usize,
    edit: impl FnOnce(&mut TableType),
) -> ExtractionRuleDocument {
    let mut next = doc.clone();
    match next.table_types.get_mut(type_index) {
        Some(table) => edit(table),
        None => warn!(type_index, "no table type at index"),
    }
    next
}

fn edit_rule(
    doc: &ExtractionRuleDocument,
    type_index: usize,
    rule_index: usize,
    edit: impl FnOnce(&mut ConditionalRule),
) -> ExtractionRuleDocument {
    edit_table(doc, type_index, |table| {
        match table.conditional_rules.get_mut(rule_index) {
            Some(rule) => edit(rule),
            None => warn!(rule_index, "no conditional rule at index"),
        }
    })
}
