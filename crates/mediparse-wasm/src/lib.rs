//! WASM bindings for the extraction rules console.
//!
//! Documents cross the boundary as plain JS objects in the backend JSON shape.

use serde::Serialize;
use serde::de::DeserializeOwned;
use wasm_bindgen::prelude::*;

use mediparse_core::evaluator::{RuleEvaluator, TableEvaluator};
use mediparse_core::models::config::EvaluationConfig;
use mediparse_core::rules::editor::EditOperation;
use mediparse_core::rules::{amounts, validation};
use mediparse_core::{ExtractionRuleDocument, RuleSession, migrate_value};

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Version information.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

fn from_js<T: DeserializeOwned>(value: JsValue) -> Result<T, JsValue> {
    serde_wasm_bindgen::from_value(value).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn document_from_js(doc: JsValue) -> Result<ExtractionRuleDocument, JsValue> {
    let raw: Option<serde_json::Value> = from_js(doc)?;
    migrate_value(raw).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Migrate a stored document (legacy, current or null) to the current shape.
#[wasm_bindgen]
pub fn migrate_rules(stored: JsValue) -> Result<JsValue, JsValue> {
    to_js(&document_from_js(stored)?)
}

/// Check a document and return its issues.
#[wasm_bindgen]
pub fn validate_rules(doc: JsValue) -> Result<JsValue, JsValue> {
    let doc = document_from_js(doc)?;
    to_js(&validation::validate_document(&doc))
}

/// Index of the first table type matching a header row, if any.
#[wasm_bindgen]
pub fn detect_table_type(doc: JsValue, headers: JsValue) -> Result<Option<usize>, JsValue> {
    let doc = document_from_js(doc)?;
    let headers: Vec<String> = from_js(headers)?;
    Ok(mediparse_core::detect_table_type(&doc, &headers).map(|(index, _)| index))
}

/// Evaluate a grid of cell strings with one table type.
#[wasm_bindgen]
pub fn evaluate_table(doc: JsValue, type_index: usize, rows: JsValue) -> Result<JsValue, JsValue> {
    let doc = document_from_js(doc)?;
    let rows: Vec<Vec<String>> = from_js(rows)?;

    let evaluator = RuleEvaluator::new(&doc, type_index)
        .map_err(|e| JsValue::from_str(&e.to_string()))?
        .with_config(EvaluationConfig::default());

    to_js(&evaluator.evaluate(&rows))
}

/// Parse a German-formatted amount (e.g., "1.234,56").
#[wasm_bindgen]
pub fn parse_german_amount(amount: &str) -> Option<f64> {
    amounts::parse_german_amount(amount).map(|d| d.to_string().parse().unwrap_or(0.0))
}

/// Editing state of one contract file's rules.
///
/// Loading and saving stay in JS; report their outcome with
/// `markSaved` / `recordError`.
#[wasm_bindgen]
pub struct RuleEditor {
    session: RuleSession,
}

#[wasm_bindgen]
impl RuleEditor {
    /// Start editing a stored document (`null` for none).
    #[wasm_bindgen(constructor)]
    pub fn new(contract_file_id: &str, stored: JsValue) -> Result<RuleEditor, JsValue> {
        let doc = document_from_js(stored)?;
        Ok(Self {
            session: RuleSession::from_document(contract_file_id, doc),
        })
    }

    /// Start from table types returned by detection; an empty list gives the default document.
    #[wasm_bindgen(js_name = fromDetected)]
    pub fn from_detected(
        contract_file_id: &str,
        table_types: JsValue,
    ) -> Result<RuleEditor, JsValue> {
        let detected = from_js(table_types)?;
        let mut doc = ExtractionRuleDocument::with_table_types(detected);
        doc.normalize();
        Ok(Self {
            session: RuleSession::from_document(contract_file_id, doc),
        })
    }

    /// Current document.
    #[wasm_bindgen]
    pub fn document(&self) -> Result<JsValue, JsValue> {
        to_js(self.session.document())
    }

    /// Apply an operation such as `{op: "addColumn", typeIndex: 0}`.
    ///
    /// Returns `false` when the operation was rejected; see `message`.
    #[wasm_bindgen]
    pub fn apply(&mut self, op: JsValue) -> Result<bool, JsValue> {
        let op: EditOperation = from_js(op)?;
        Ok(self.apply_op(op))
    }

    #[wasm_bindgen(js_name = deleteTableType)]
    pub fn delete_table_type(&mut self, index: usize) -> bool {
        self.apply_op(EditOperation::DeleteTableType { type_index: index })
    }

    #[wasm_bindgen(js_name = removeAction)]
    pub fn remove_action(&mut self, rule_index: usize, action_index: usize) -> bool {
        self.apply_op(EditOperation::RemoveAction {
            type_index: self.session.selected(),
            rule_index,
            action_index,
        })
    }

    #[wasm_bindgen]
    pub fn selected(&self) -> usize {
        self.session.selected()
    }

    #[wasm_bindgen]
    pub fn select(&mut self, index: usize) {
        self.session.select(index);
    }

    /// Last error or notice.
    #[wasm_bindgen]
    pub fn message(&self) -> Option<String> {
        self.session.message().map(str::to_string)
    }

    #[wasm_bindgen(js_name = dismissMessage)]
    pub fn dismiss_message(&mut self) {
        self.session.dismiss_message();
    }

    #[wasm_bindgen(js_name = isDirty)]
    pub fn is_dirty(&self) -> bool {
        self.session.is_dirty()
    }

    #[wasm_bindgen(js_name = markSaved)]
    pub fn mark_saved(&mut self) {
        self.session.mark_saved();
    }

    /// Keep the document and show `message` after a failed request.
    #[wasm_bindgen(js_name = recordError)]
    pub fn record_error(&mut self, message: &str) {
        self.session.record_error(message);
    }

    /// Issues of the current document.
    #[wasm_bindgen]
    pub fn validate(&self) -> Result<JsValue, JsValue> {
        to_js(&validation::validate_document(self.session.document()))
    }
}

impl RuleEditor {
    fn apply_op(&mut self, op: EditOperation) -> bool {
        match self.session.apply(op) {
            Ok(()) => true,
            Err(rejected) => {
                web_sys::console::warn_1(&JsValue::from_str(&rejected.to_string()));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    fn legacy() -> JsValue {
        to_js(&serde_json::json!({
            "columnMappings": {"positionNumberColumn": 0, "priceColumn": 1},
            "conditionalRules": []
        }))
        .unwrap()
    }

    #[wasm_bindgen_test]
    fn test_migrate_null() {
        let doc: ExtractionRuleDocument = from_js(migrate_rules(JsValue::NULL).unwrap()).unwrap();
        assert_eq!(doc.table_types.len(), 1);
        assert_eq!(doc.table_types[0].id(), "default");
    }

    #[wasm_bindgen_test]
    fn test_editor_rejects_last_table_type() {
        let mut editor = RuleEditor::new("7", legacy()).unwrap();
        assert!(!editor.delete_table_type(0));
        assert!(editor.message().is_some());
        assert!(!editor.is_dirty());

        let op = to_js(&serde_json::json!({"op": "addTableType"})).unwrap();
        assert!(editor.apply(op).unwrap());
        assert!(editor.is_dirty());
        editor.mark_saved();
        assert!(!editor.is_dirty());
    }

    #[wasm_bindgen_test]
    fn test_evaluate_table() {
        let rows = to_js(&vec![vec!["Pos.", "Preis"], vec!["31.03.01", "12,50"]]).unwrap();
        let result = evaluate_table(legacy(), 0, rows).unwrap();
        let result: serde_json::Value = from_js(result).unwrap();
        assert_eq!(result["positions"][0]["fields"]["positionNumber"], "31.03.01");
    }

    #[wasm_bindgen_test]
    fn test_parse_german_amount() {
        let amount = parse_german_amount("1.234,56");
        assert!(amount.is_some());
        assert!((amount.unwrap() - 1234.56).abs() < 0.01);
    }
}
