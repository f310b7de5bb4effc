//! Rule document handling: migration, editing, validation and value parsing.

pub mod amounts;
pub mod dates;
pub mod editor;
pub mod migration;
pub mod patterns;
pub mod validation;

pub use amounts::{format_german_amount, parse_german_amount};
pub use dates::{normalize_date, parse_date};
pub use editor::{EditOperation, MoveDirection, TableTypePatch};
pub use migration::{StoredDocument, migrate, migrate_value};
pub use patterns::normalize_header;
pub use validation::{Severity, ValidationIssue, has_errors, validate_document};
