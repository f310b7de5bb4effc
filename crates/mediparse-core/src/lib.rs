//! Core library for contract price table extraction rules.
//!
//! This crate provides:
//! - The extraction rule document model (table types, columns, conditional rules)
//! - Migration of stored legacy single-table documents
//! - Pure editor operations that keep the document invariants
//! - Header matching and offline evaluation of rules against table grids
//! - Document validation before saving
//! - The backend API (HTTP client behind the `client` feature) and editing session

pub mod error;
pub mod models;
pub mod rules;
pub mod evaluator;
pub mod api;

pub use error::{ApiError, EditRejected, MediparseError, Result, RuleError};
pub use models::config::ConsoleConfig;
pub use models::contract::ContractFileSummary;
pub use models::records::{PositionRecord, PriceRecord, RecordScope, TableExtraction};
pub use models::rules::{
    ColumnDefinition, ColumnRef, Condition, ConditionType, ConditionalRule, ExtractionRuleDocument,
    HeaderMatcher, MappedField, MatchingStrategy, RuleAction, TableType,
};
pub use rules::{
    EditOperation, StoredDocument, ValidationIssue, migrate, migrate_value, validate_document,
};
pub use evaluator::{RuleEvaluator, TableEvaluator, detect_table_type};
pub use api::{RuleSession, RulesBackend};
#[cfg(feature = "client")]
pub use api::HttpRulesBackend;
