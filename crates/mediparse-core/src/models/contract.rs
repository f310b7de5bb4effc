//! Contract file summary returned by the backend after saving rules.

use serde::{Deserialize, Serialize};

use super::rules::FreeForm;

/// Contract file as listed by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractFileSummary {
    /// Backend identifier.
    #[serde(default, deserialize_with = "id_as_string")]
    pub id: String,

    #[serde(default)]
    pub file_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Remaining backend fields, kept verbatim.
    #[serde(flatten)]
    pub extra: FreeForm,
}

/// Numeric and string identifiers both occur.
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summary_accepts_numeric_id() {
        let summary: ContractFileSummary = serde_json::from_value(json!({
            "id": 42,
            "fileName": "vertrag_aok.pdf",
            "status": "PROCESSED",
            "uploadedAt": "2024-03-01T10:00:00Z"
        }))
        .unwrap();

        assert_eq!(summary.id, "42");
        assert_eq!(summary.file_name, "vertrag_aok.pdf");
        assert_eq!(summary.status.as_deref(), Some("PROCESSED"));
        assert!(summary.extra.contains_key("uploadedAt"));
    }
}
