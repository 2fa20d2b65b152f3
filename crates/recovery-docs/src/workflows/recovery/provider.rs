use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::population::normalize_identifier;

/// Request to open a remote signing session for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SigningRequest {
    pub template_ref: String,
    pub submitter_email: String,
    pub submitter_name: String,
    pub prefilled: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningSession {
    pub submission_id: String,
    pub submitter_id: String,
    pub signing_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteSessionStatus {
    Pending,
    Opened,
    Completed,
    Declined,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningSessionState {
    pub status: RemoteSessionStatus,
    pub signing_url: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Outbound boundary to the e-signature provider.
#[async_trait]
pub trait SigningProvider: Send + Sync {
    async fn create_signing_session(
        &self,
        request: SigningRequest,
    ) -> Result<SigningSession, ProviderError>;

    async fn get_signing_session(
        &self,
        submission_id: &str,
    ) -> Result<SigningSessionState, ProviderError>;

    /// Field names the remote template accepts for prefilling.
    async fn get_template(&self, template_ref: &str) -> Result<Vec<String>, ProviderError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("signing provider is not configured")]
    NotConfigured,
    #[error("signing provider did not respond within {0:?}")]
    Timeout(Duration),
    #[error("template '{0}' is not registered with the signing provider")]
    TemplateNotFound(String),
    #[error("signing session '{0}' is unknown to the signing provider")]
    SessionNotFound(String),
    #[error("signing provider request failed: {0}")]
    Upstream(String),
}

/// Bound a provider call. On timeout the call's future is dropped and nothing is returned.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(limit)),
    }
}

/// Keep only the prefilled values the remote template declares.
pub fn accepted_prefill(
    prefilled: &BTreeMap<String, String>,
    template_fields: &[String],
) -> BTreeMap<String, String> {
    let accepted: Vec<String> = template_fields
        .iter()
        .map(|field| normalize_identifier(field))
        .collect();

    prefilled
        .iter()
        .filter(|(key, _)| accepted.contains(&normalize_identifier(key)))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
