//! Document analysis API client
//!
//! Thin wrapper over the external analysis service: one POST per document,
//! authenticated with an `X-API-Key` header. The endpoint, key, and timeout
//! are settings read by the caller per request, so a reconfiguration applies
//! without a restart.

use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = "LoanDesk/0.1.0";
const SNIPPET_LIMIT: usize = 200;

/// Analysis client errors
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Non-JSON response from analysis API (status {status}): {snippet}")]
    ProtocolViolation { status: u16, snippet: String },

    #[error("Analysis API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Client for the external document analysis API
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    http_client: reqwest::Client,
}

impl AnalysisClient {
    pub fn new() -> Result<Self, AnalysisError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AnalysisError::Network(e.to_string()))?;

        Ok(Self { http_client })
    }

    /// Submit a document for analysis and return the parsed result payload.
    ///
    /// The response must carry a JSON content type; anything else is a
    /// protocol violation regardless of status. Non-2xx JSON responses
    /// surface as [`AnalysisError::Api`] with the upstream status.
    pub async fn process_document(
        &self,
        api_url: &str,
        api_key: &str,
        timeout: Duration,
        document_id: &str,
    ) -> Result<serde_json::Value, AnalysisError> {
        tracing::debug!(document_id = %document_id, "Calling analysis API");

        let response = self
            .http_client
            .post(api_url)
            .header("X-API-Key", api_key)
            .timeout(timeout)
            .json(&json!({ "document_id": document_id }))
            .send()
            .await
            .map_err(|e| AnalysisError::Network(e.to_string()))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if !content_type.contains("application/json") {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::ProtocolViolation {
                status: status.as_u16(),
                snippet: truncate_snippet(&body),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AnalysisError::Parse(e.to_string()))?;

        tracing::debug!(document_id = %document_id, "Analysis API returned a result");
        Ok(payload)
    }
}

fn truncate_snippet(body: &str) -> String {
    body.chars().take(SNIPPET_LIMIT).collect()
}
