//! Editing session for the rules of one contract file.

use tracing::{info, warn};

use super::RulesBackend;
use crate::error::{ApiError, EditRejected};
use crate::models::config::EditorConfig;
use crate::models::contract::ContractFileSummary;
use crate::models::rules::ExtractionRuleDocument;
use crate::rules::editor::{self, EditOperation};
use crate::rules::migration::migrate_value;

/// Loaded rule document plus the UI state around it.
///
/// All mutations take `&mut self`, and so does [`RuleSession::save`] for the
/// whole request; no edit can interleave with a save in flight.
#[derive(Debug, Clone)]
pub struct RuleSession {
    contract_file_id: String,
    document: ExtractionRuleDocument,
    selected: usize,
    message: Option<String>,
    dirty: bool,
    editor: EditorConfig,
}

impl RuleSession {
    /// Load the rules of a contract file.
    ///
    /// Without stored rules the backend is asked to detect table types; an
    /// empty or failed detection yields the default document.
    pub async fn open<B: RulesBackend>(
        backend: &B,
        contract_file_id: &str,
    ) -> Result<Self, ApiError> {
        Self::open_with_config(backend, contract_file_id, EditorConfig::default()).await
    }

    /// Like [`RuleSession::open`], naming new and fallback table types per `editor`.
    pub async fn open_with_config<B: RulesBackend>(
        backend: &B,
        contract_file_id: &str,
        editor: EditorConfig,
    ) -> Result<Self, ApiError> {
        let stored = backend.fetch_rules(contract_file_id).await?;

        let document = match stored {
            Some(value) => migrate_value(Some(value))?,
            None => {
                let detected = match backend.detect_table_types(contract_file_id).await {
                    Ok(detected) => detected,
                    Err(e) => {
                        warn!(error = %e, "table type detection failed, using default document");
                        Vec::new()
                    }
                };
                if detected.is_empty() {
                    let mut doc = ExtractionRuleDocument::new();
                    doc.table_types[0].table_name = editor.default_table_name.clone();
                    doc
                } else {
                    info!(count = detected.len(), "seeding rules from detected table types");
                    let mut doc = ExtractionRuleDocument::with_table_types(detected);
                    doc.normalize();
                    doc
                }
            }
        };

        Ok(Self::from_document(contract_file_id, document).with_editor_config(editor))
    }

    /// Session over an already loaded document.
    pub fn from_document(
        contract_file_id: impl Into<String>,
        document: ExtractionRuleDocument,
    ) -> Self {
        Self {
            contract_file_id: contract_file_id.into(),
            document,
            selected: 0,
            message: None,
            dirty: false,
            editor: EditorConfig::default(),
        }
    }

    pub fn with_editor_config(mut self, editor: EditorConfig) -> Self {
        self.editor = editor;
        self
    }

    pub fn contract_file_id(&self) -> &str {
        &self.contract_file_id
    }

    pub fn document(&self) -> &ExtractionRuleDocument {
        &self.document
    }

    /// Index of the selected table type.
    pub fn selected(&self) -> usize {
        self.selected
    }

    /// Select a table type; out-of-range indices are ignored.
    pub fn select(&mut self, index: usize) {
        if index < self.document.table_types.len() {
            self.selected = index;
        }
    }

    /// Last error or notice for the user.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn dismiss_message(&mut self) {
        self.message = None;
    }

    /// Whether there are edits not yet saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Apply one editor operation.
    ///
    /// A rejected operation leaves the document unchanged and sets a notice.
    pub fn apply(&mut self, op: EditOperation) -> Result<(), EditRejected> {
        let deleted = match &op {
            EditOperation::DeleteTableType { type_index } => Some(*type_index),
            _ => None,
        };
        let op = match op {
            EditOperation::AddTableType { table_name: None } => EditOperation::AddTableType {
                table_name: Some(self.editor.new_table_name.clone()),
            },
            op => op,
        };

        match op.apply(&self.document) {
            Ok(next) => {
                if next != self.document {
                    self.document = next;
                    self.dirty = true;
                }
                if let Some(index) = deleted {
                    self.selected = editor::selection_after_delete(self.selected, index);
                }
                self.clamp_selection();
                Ok(())
            }
            Err(rejected) => {
                self.message = Some(rejected.to_string());
                Err(rejected)
            }
        }
    }

    /// Delete a table type and keep the selection on a valid entry.
    pub fn delete_table_type(&mut self, index: usize) -> Result<(), EditRejected> {
        self.apply(EditOperation::DeleteTableType { type_index: index })
    }

    /// Remove an action of a rule in the selected table type.
    pub fn remove_action(
        &mut self,
        rule_index: usize,
        action_index: usize,
    ) -> Result<(), EditRejected> {
        self.apply(EditOperation::RemoveAction {
            type_index: self.selected,
            rule_index,
            action_index,
        })
    }

    /// Persist the document. On failure the document is kept and the error
    /// message is stored for display; nothing is retried.
    pub async fn save<B: RulesBackend>(
        &mut self,
        backend: &B,
    ) -> Result<ContractFileSummary, ApiError> {
        match backend.save_rules(&self.contract_file_id, &self.document).await {
            Ok(summary) => {
                self.mark_saved();
                Ok(summary)
            }
            Err(e) => {
                warn!(error = %e, id = %self.contract_file_id, "saving rules failed");
                self.record_error(e.to_string());
                Err(e)
            }
        }
    }

    /// Record a successful save done outside the session.
    pub fn mark_saved(&mut self) {
        self.dirty = false;
        self.message = None;
    }

    /// Record a failed request; the document is kept as is.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    pub fn into_document(self) -> ExtractionRuleDocument {
        self.document
    }

    fn clamp_selection(&mut self) {
        let last = self.document.table_types.len().saturating_sub(1);
        self.selected = self.selected.min(last);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::rules::{DEFAULT_TABLE_TYPE_ID, HeaderMatcher, TableType};
    use serde_json::{Value, json};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockBackend {
        stored: Option<Value>,
        detected: Option<Vec<TableType>>,
        fail_save: bool,
        saved: Mutex<Vec<ExtractionRuleDocument>>,
    }

    impl RulesBackend for MockBackend {
        async fn fetch_rules(&self, _id: &str) -> Result<Option<Value>, ApiError> {
            Ok(self.stored.clone())
        }

        async fn save_rules(
            &self,
            id: &str,
            doc: &ExtractionRuleDocument,
        ) -> Result<ContractFileSummary, ApiError> {
            if self.fail_save {
                return Err(ApiError::Server {
                    status: 500,
                    body: "Internal Server Error".into(),
                });
            }
            self.saved.lock().unwrap().push(doc.clone());
            Ok(ContractFileSummary {
                id: id.to_string(),
                file_name: "vertrag.pdf".into(),
                ..ContractFileSummary::default()
            })
        }

        async fn detect_table_types(&self, _id: &str) -> Result<Vec<TableType>, ApiError> {
            self.detected.clone().ok_or(ApiError::Server {
                status: 503,
                body: "detection unavailable".into(),
            })
        }
    }

    fn price_table() -> TableType {
        let mut table = TableType::new("tableType_1", "Preistabelle");
        table.header_matcher = HeaderMatcher {
            required_headers: vec!["Pos.-Nr.".into(), "Preis".into()],
            ..HeaderMatcher::default()
        };
        table
    }

    #[tokio::test]
    async fn test_open_seeds_from_detection() {
        let backend = MockBackend {
            detected: Some(vec![price_table()]),
            ..MockBackend::default()
        };

        let session = RuleSession::open(&backend, "7").await.unwrap();
        let doc = session.document();
        assert_eq!(doc.table_types.len(), 1);
        assert_eq!(doc.table_types[0].table_name, "Preistabelle");
        assert!(!session.is_dirty());
    }

    #[tokio::test]
    async fn test_open_falls_back_when_detection_fails() {
        let backend = MockBackend::default();
        let session = RuleSession::open(&backend, "7").await.unwrap();
        assert_eq!(session.document().table_types[0].id(), DEFAULT_TABLE_TYPE_ID);

        let backend = MockBackend {
            detected: Some(Vec::new()),
            ..MockBackend::default()
        };
        let session = RuleSession::open(&backend, "7").await.unwrap();
        assert_eq!(session.document().table_types[0].id(), DEFAULT_TABLE_TYPE_ID);
    }

    #[tokio::test]
    async fn test_open_migrates_stored_legacy_rules() {
        let backend = MockBackend {
            stored: Some(json!({
                "columnMappings": {"positionNumberColumn": 0},
                "conditionalRules": []
            })),
            ..MockBackend::default()
        };
        let session = RuleSession::open(&backend, "7").await.unwrap();
        let doc = session.document();
        assert_eq!(doc.table_types.len(), 1);
        assert_eq!(doc.table_types[0].columns.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_edits() {
        let mut session = RuleSession::from_document("7", ExtractionRuleDocument::new());
        session.apply(EditOperation::AddColumn { type_index: 0 }).unwrap();
        assert!(session.is_dirty());

        let failing = MockBackend {
            fail_save: true,
            ..MockBackend::default()
        };
        assert!(session.save(&failing).await.is_err());
        assert!(session.is_dirty());
        assert_eq!(session.document().table_types[0].columns.len(), 1);
        assert!(session.message().is_some_and(|m| m.contains("500")));

        let backend = MockBackend::default();
        let summary = session.save(&backend).await.unwrap();
        assert_eq!(summary.id, "7");
        assert!(!session.is_dirty());
        assert_eq!(session.message(), None);
        assert_eq!(backend.saved.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_adjusts_selection() {
        let mut session = RuleSession::from_document("7", ExtractionRuleDocument::new());
        session.apply(EditOperation::AddTableType { table_name: None }).unwrap();
        session.apply(EditOperation::AddTableType { table_name: None }).unwrap();
        session.select(2);

        session.delete_table_type(0).unwrap();
        assert_eq!(session.selected(), 1);

        session.delete_table_type(1).unwrap();
        assert_eq!(session.selected(), 0);

        assert_eq!(session.delete_table_type(0), Err(EditRejected::LastTableType));
        assert_eq!(session.document().table_types.len(), 1);
        assert!(session.message().is_some());
    }

    #[tokio::test]
    async fn test_editor_config_names_table_types() {
        let editor = EditorConfig {
            new_table_name: "Zuschläge".into(),
            default_table_name: "Hilfsmittel".into(),
        };
        let mut session = RuleSession::open_with_config(&MockBackend::default(), "7", editor)
            .await
            .unwrap();
        assert_eq!(session.document().table_types[0].table_name, "Hilfsmittel");
        assert_eq!(session.document().table_types[0].id(), DEFAULT_TABLE_TYPE_ID);

        session.apply(EditOperation::AddTableType { table_name: None }).unwrap();
        assert_eq!(session.document().table_types[1].table_name, "Zuschläge");
    }

    #[test]
    fn test_remove_last_action_sets_notice() {
        let mut session = RuleSession::from_document("7", ExtractionRuleDocument::new());
        session.apply(EditOperation::AddConditionalRule { type_index: 0 }).unwrap();
        session.dismiss_message();

        assert_eq!(session.remove_action(0, 0), Err(EditRejected::LastAction));
        assert_eq!(
            session.message(),
            Some("the last action of a rule cannot be removed")
        );
        assert_eq!(session.document().table_types[0].conditional_rules[0].actions.len(), 1);
    }
}
