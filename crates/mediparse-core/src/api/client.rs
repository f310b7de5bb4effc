//! HTTP implementation of [`RulesBackend`].

use reqwest::{Response, StatusCode};
use serde_json::Value;
use tracing::{debug, info};

use super::{DetectedTableTypes, RulesBackend};
use crate::error::ApiError;
use crate::models::config::ApiConfig;
use crate::models::contract::ContractFileSummary;
use crate::models::rules::{ExtractionRuleDocument, TableType};

/// Client for the backend's contract file endpoints.
pub struct HttpRulesBackend {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpRulesBackend {
    /// Create a client for the given base URL, e.g. `http://localhost:8080`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Create a client from the `api` config section.
    pub fn from_config(config: &ApiConfig) -> Self {
        let backend = Self::new(config.base_url.clone());
        match &config.token {
            Some(token) => backend.with_token(token.clone()),
            None => backend,
        }
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into()).filter(|t: &String| !t.is_empty());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn rules_url(&self, contract_file_id: &str) -> String {
        format!(
            "{}/api/contract-files/{}/extraction-rules",
            self.base_url, contract_file_id
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Map non-success statuses to errors.
async fn check_status(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ApiError::Unauthorized);
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ApiError::Server {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp)
}

impl RulesBackend for HttpRulesBackend {
    async fn fetch_rules(&self, contract_file_id: &str) -> Result<Option<Value>, ApiError> {
        let url = self.rules_url(contract_file_id);

        info!(url = %url, "fetching extraction rules");
        let resp = self.authorize(self.client.get(&url)).send().await?;
        if matches!(resp.status(), StatusCode::NO_CONTENT | StatusCode::NOT_FOUND) {
            debug!(status = resp.status().as_u16(), "no stored rules");
            return Ok(None);
        }
        let resp = check_status(resp).await?;

        let body = resp.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let value: Value = serde_json::from_str(&body)?;
        Ok(Some(value).filter(|v| !v.is_null()))
    }

    async fn save_rules(
        &self,
        contract_file_id: &str,
        doc: &ExtractionRuleDocument,
    ) -> Result<ContractFileSummary, ApiError> {
        let url = self.rules_url(contract_file_id);

        info!(url = %url, table_types = doc.table_types.len(), "saving extraction rules");
        let resp = self.authorize(self.client.put(&url).json(doc)).send().await?;
        let resp = check_status(resp).await?;

        let summary: ContractFileSummary = resp.json().await?;
        info!(id = %summary.id, "rules saved");
        Ok(summary)
    }

    async fn detect_table_types(&self, contract_file_id: &str) -> Result<Vec<TableType>, ApiError> {
        let url = format!("{}/detect-table-types", self.rules_url(contract_file_id));

        info!(url = %url, "detecting table types");
        let resp = self.authorize(self.client.post(&url)).send().await?;
        let resp = check_status(resp).await?;

        let detected: DetectedTableTypes = resp.json().await?;
        info!(count = detected.table_types.len(), "detected table types");
        Ok(detected.table_types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_trimmed() {
        let backend = HttpRulesBackend::new("http://localhost:8080/");
        assert_eq!(backend.base_url(), "http://localhost:8080");
        assert_eq!(
            backend.rules_url("42"),
            "http://localhost:8080/api/contract-files/42/extraction-rules"
        );
    }

    #[test]
    fn test_from_config_ignores_empty_token() {
        let config = ApiConfig {
            base_url: "https://backend.example".into(),
            token: Some(String::new()),
        };
        let backend = HttpRulesBackend::from_config(&config);
        assert!(backend.token.is_none());
    }
}
