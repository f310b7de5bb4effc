//! Document-processing backend: rule persistence and table type detection.

#[cfg(feature = "client")]
mod client;
pub mod session;

#[cfg(feature = "client")]
pub use client::HttpRulesBackend;
pub use session::RuleSession;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::models::contract::ContractFileSummary;
use crate::models::rules::{ExtractionRuleDocument, TableType};

/// Response body of the table type detection endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedTableTypes {
    #[serde(default)]
    pub table_types: Vec<TableType>,
}

/// Operations the rules console needs from the backend.
#[allow(async_fn_in_trait)]
pub trait RulesBackend {
    /// Stored rules of a contract file, unmigrated; `None` when nothing is stored.
    async fn fetch_rules(&self, contract_file_id: &str) -> Result<Option<Value>, ApiError>;

    /// Replace the stored rules wholesale.
    async fn save_rules(
        &self,
        contract_file_id: &str,
        doc: &ExtractionRuleDocument,
    ) -> Result<ContractFileSummary, ApiError>;

    /// Table types proposed by the backend for a contract file. Best effort.
    async fn detect_table_types(&self, contract_file_id: &str) -> Result<Vec<TableType>, ApiError>;
}
