use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use serde_json::{json, Value};

use crate::workflows::recovery::descriptors::find_template;
use crate::workflows::recovery::domain::{
    AuditEntry, CaseId, CaseRecord, DocumentId, DocumentRecord,
};
use crate::workflows::recovery::provider::{
    ProviderError, RemoteSessionStatus, SigningProvider, SigningRequest, SigningSession,
    SigningSessionState,
};
use crate::workflows::recovery::repository::{CaseRepository, RepositoryError};
use crate::workflows::recovery::session::{
    AgentSession, SessionRegistry, SessionStore, SessionToken,
};
use crate::workflows::recovery::{recovery_router, RecoveryCaseService};

pub(super) fn heir_questionnaire() -> Value {
    json!({
        "personalInfo": {
            "firstName": "Dana",
            "lastName": "Whitfield",
            "email": "dana@example.com",
            "phone": "512-555-0142",
            "address": "88 Elm St",
            "city": "Austin",
            "state": "TX",
            "zip": "78701"
        },
        "propertyInfo": {
            "address": "14 Ridge Rd",
            "city": "Round Rock",
            "state": "TX",
            "zip": "78664",
            "county": "Williamson",
            "parcelNumber": "R-558812"
        },
        "ownership": { "isHeir": true, "isEstateOpen": true },
        "deceasedOwner": {
            "name": "Harold Whitfield",
            "relationship": "son",
            "dateOfDeath": "2024-11-03"
        }
    })
}

pub(super) fn standard_questionnaire(state: &str) -> Value {
    json!({
        "personalInfo": {
            "fullName": "Morgan Reyes",
            "email": "morgan@example.com"
        },
        "propertyInfo": {
            "address": "301 Bay Ave",
            "state": state,
            "county": "Duval"
        },
        "ownership": { "isHeir": false }
    })
}

pub(super) fn build_service() -> (
    RecoveryCaseService<MemoryRepository, ScriptedProvider>,
    Arc<MemoryRepository>,
    Arc<ScriptedProvider>,
) {
    let repository = Arc::new(MemoryRepository::default());
    let provider = Arc::new(ScriptedProvider::default());
    let service = RecoveryCaseService::with_timeout(
        repository.clone(),
        provider.clone(),
        Duration::from_millis(200),
    );
    (service, repository, provider)
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) cases: Arc<Mutex<HashMap<CaseId, CaseRecord>>>,
    pub(super) documents: Arc<Mutex<HashMap<DocumentId, DocumentRecord>>>,
    pub(super) audit: Arc<Mutex<Vec<AuditEntry>>>,
    pub(super) document_writes: Arc<Mutex<usize>>,
}

impl MemoryRepository {
    pub(super) fn document_writes(&self) -> usize {
        *self.document_writes.lock().expect("repository mutex poisoned")
    }

    pub(super) fn audit_len(&self) -> usize {
        self.audit.lock().expect("repository mutex poisoned").len()
    }
}

impl CaseRepository for MemoryRepository {
    fn insert_case(&self, record: CaseRecord) -> Result<CaseRecord, RepositoryError> {
        let mut guard = self.cases.lock().expect("repository mutex poisoned");
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update_case(&self, record: CaseRecord) -> Result<(), RepositoryError> {
        let mut guard = self.cases.lock().expect("repository mutex poisoned");
        guard.insert(record.id.clone(), record);
        Ok(())
    }

    fn fetch_case(&self, id: &CaseId) -> Result<Option<CaseRecord>, RepositoryError> {
        let guard = self.cases.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn insert_documents(
        &self,
        documents: Vec<DocumentRecord>,
    ) -> Result<Vec<DocumentRecord>, RepositoryError> {
        let mut guard = self.documents.lock().expect("repository mutex poisoned");
        for document in &documents {
            guard.insert(document.id.clone(), document.clone());
        }
        Ok(documents)
    }

    fn update_document(&self, document: DocumentRecord) -> Result<(), RepositoryError> {
        let mut guard = self.documents.lock().expect("repository mutex poisoned");
        if !guard.contains_key(&document.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(document.id.clone(), document);
        *self.document_writes.lock().expect("repository mutex poisoned") += 1;
        Ok(())
    }

    fn fetch_document(&self, id: &DocumentId) -> Result<Option<DocumentRecord>, RepositoryError> {
        let guard = self.documents.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn documents_for_case(&self, id: &CaseId) -> Result<Vec<DocumentRecord>, RepositoryError> {
        let guard = self.documents.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|document| document.case_id.as_ref() == Some(id))
            .cloned()
            .collect())
    }

    fn documents_for_submission(
        &self,
        submission_id: &str,
    ) -> Result<Vec<DocumentRecord>, RepositoryError> {
        let guard = self.documents.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|document| {
                document
                    .remote
                    .as_ref()
                    .is_some_and(|remote| remote.submission_id == submission_id)
            })
            .cloned()
            .collect())
    }

    fn document_for_submitter(
        &self,
        submitter_id: &str,
    ) -> Result<Option<DocumentRecord>, RepositoryError> {
        let guard = self.documents.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .find(|document| {
                document
                    .remote
                    .as_ref()
                    .is_some_and(|remote| remote.submitter_id == submitter_id)
            })
            .cloned())
    }

    fn append_audit(&self, entry: AuditEntry) -> Result<(), RepositoryError> {
        self.audit
            .lock()
            .expect("repository mutex poisoned")
            .push(entry);
        Ok(())
    }

    fn audit_trail(&self, id: &DocumentId) -> Result<Vec<AuditEntry>, RepositoryError> {
        let guard = self.audit.lock().expect("repository mutex poisoned");
        Ok(guard
            .iter()
            .filter(|entry| &entry.document_id == id)
            .cloned()
            .collect())
    }
}

pub(super) struct UnavailableRepository;

impl CaseRepository for UnavailableRepository {
    fn insert_case(&self, _record: CaseRecord) -> Result<CaseRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update_case(&self, _record: CaseRecord) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch_case(&self, _id: &CaseId) -> Result<Option<CaseRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn insert_documents(
        &self,
        _documents: Vec<DocumentRecord>,
    ) -> Result<Vec<DocumentRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update_document(&self, _document: DocumentRecord) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch_document(&self, _id: &DocumentId) -> Result<Option<DocumentRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn documents_for_case(&self, _id: &CaseId) -> Result<Vec<DocumentRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn documents_for_submission(
        &self,
        _submission_id: &str,
    ) -> Result<Vec<DocumentRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn document_for_submitter(
        &self,
        _submitter_id: &str,
    ) -> Result<Option<DocumentRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn append_audit(&self, _entry: AuditEntry) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn audit_trail(&self, _id: &DocumentId) -> Result<Vec<AuditEntry>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Behaviour the scripted provider should exhibit on its next calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(super) enum ProviderMode {
    #[default]
    Accept,
    Fail,
    Stall,
    /// Answer successfully after the given delay.
    Delay(Duration),
}

#[derive(Default)]
pub(super) struct ScriptedProvider {
    mode: Mutex<ProviderMode>,
    remote_status: Mutex<Option<RemoteSessionStatus>>,
    requests: Mutex<Vec<SigningRequest>>,
    sequence: Mutex<u64>,
}

impl ScriptedProvider {
    pub(super) fn set_mode(&self, mode: ProviderMode) {
        *self.mode.lock().expect("provider mutex poisoned") = mode;
    }

    pub(super) fn set_remote_status(&self, status: RemoteSessionStatus) {
        *self.remote_status.lock().expect("provider mutex poisoned") = Some(status);
    }

    pub(super) fn requests(&self) -> Vec<SigningRequest> {
        self.requests.lock().expect("provider mutex poisoned").clone()
    }

    async fn gate(&self) -> Result<(), ProviderError> {
        let mode = *self.mode.lock().expect("provider mutex poisoned");
        match mode {
            ProviderMode::Accept => Ok(()),
            ProviderMode::Fail => Err(ProviderError::Upstream("503 from provider".to_string())),
            ProviderMode::Stall => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }
            ProviderMode::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl SigningProvider for ScriptedProvider {
    async fn create_signing_session(
        &self,
        request: SigningRequest,
    ) -> Result<SigningSession, ProviderError> {
        self.gate().await?;
        let id = {
            let mut sequence = self.sequence.lock().expect("provider mutex poisoned");
            *sequence += 1;
            *sequence
        };
        self.requests
            .lock()
            .expect("provider mutex poisoned")
            .push(request);
        Ok(SigningSession {
            submission_id: format!("{}", 500 + id),
            submitter_id: format!("{}", 900 + id),
            signing_url: format!("https://sign.example.com/s/{id}"),
        })
    }

    async fn get_signing_session(
        &self,
        _submission_id: &str,
    ) -> Result<SigningSessionState, ProviderError> {
        self.gate().await?;
        let status = self
            .remote_status
            .lock()
            .expect("provider mutex poisoned")
            .unwrap_or(RemoteSessionStatus::Pending);
        Ok(SigningSessionState {
            status,
            signing_url: Some("https://sign.example.com/s/refreshed".to_string()),
            completed_at: None,
        })
    }

    async fn get_template(&self, template_ref: &str) -> Result<Vec<String>, ProviderError> {
        self.gate().await?;
        if find_template(template_ref).is_none() {
            return Err(ProviderError::TemplateNotFound(template_ref.to_string()));
        }
        Ok(vec![
            "Client Name".to_string(),
            "Property Address".to_string(),
            "County".to_string(),
            "Signing Date".to_string(),
        ])
    }
}

#[derive(Default)]
pub(super) struct MemorySessions {
    sessions: Mutex<HashMap<SessionToken, AgentSession>>,
}

impl SessionStore for MemorySessions {
    fn insert(&self, session: AgentSession) -> Result<(), RepositoryError> {
        self.sessions
            .lock()
            .expect("session mutex poisoned")
            .insert(session.token.clone(), session);
        Ok(())
    }

    fn fetch(&self, token: &SessionToken) -> Result<Option<AgentSession>, RepositoryError> {
        Ok(self
            .sessions
            .lock()
            .expect("session mutex poisoned")
            .get(token)
            .cloned())
    }

    fn revoke(&self, token: &SessionToken) -> Result<(), RepositoryError> {
        self.sessions
            .lock()
            .expect("session mutex poisoned")
            .remove(token);
        Ok(())
    }
}

pub(super) fn session_registry() -> Arc<SessionRegistry> {
    Arc::new(SessionRegistry::new(
        Arc::new(MemorySessions::default()),
        chrono::Duration::minutes(30),
    ))
}

pub(super) fn router_with_service(
    service: RecoveryCaseService<MemoryRepository, ScriptedProvider>,
    sessions: Arc<SessionRegistry>,
    require_session: bool,
) -> axum::Router {
    recovery_router(Arc::new(service), sessions, require_session)
}

pub(super) fn signature_payload() -> Value {
    json!({
        "signature_url": "https://files.example.com/signatures/dana.png",
        "signer_ip": "203.0.113.7",
        "signer_user_agent": "Mozilla/5.0"
    })
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
