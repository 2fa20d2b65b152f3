use async_trait::async_trait;
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use recovery_docs::config::SigningProviderKind;
use recovery_docs::workflows::recovery::descriptors::find_template;
use recovery_docs::workflows::recovery::{
    AgentSession, AuditEntry, CaseId, CaseRecord, CaseRepository, DocumentId, DocumentRecord,
    ProviderError, RemoteSessionStatus, RepositoryError, SessionStore, SessionToken,
    SigningProvider, SigningRequest, SigningSession, SigningSessionState,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("in-memory store poisoned".to_string()))
}

#[derive(Default)]
struct CaseTables {
    cases: HashMap<CaseId, CaseRecord>,
    documents: HashMap<DocumentId, DocumentRecord>,
    audit: Vec<AuditEntry>,
}

/// Process-local store; state is lost on restart.
#[derive(Default, Clone)]
pub(crate) struct InMemoryCaseRepository {
    tables: Arc<Mutex<CaseTables>>,
}

impl InMemoryCaseRepository {
    pub(crate) fn all_audit_entries(&self) -> Result<Vec<AuditEntry>, RepositoryError> {
        Ok(lock(&self.tables)?.audit.clone())
    }
}

impl CaseRepository for InMemoryCaseRepository {
    fn insert_case(&self, record: CaseRecord) -> Result<CaseRecord, RepositoryError> {
        let mut tables = lock(&self.tables)?;
        if tables.cases.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.cases.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update_case(&self, record: CaseRecord) -> Result<(), RepositoryError> {
        let mut tables = lock(&self.tables)?;
        match tables.cases.get_mut(&record.id) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch_case(&self, id: &CaseId) -> Result<Option<CaseRecord>, RepositoryError> {
        Ok(lock(&self.tables)?.cases.get(id).cloned())
    }

    fn insert_documents(
        &self,
        documents: Vec<DocumentRecord>,
    ) -> Result<Vec<DocumentRecord>, RepositoryError> {
        let mut tables = lock(&self.tables)?;
        if documents
            .iter()
            .any(|document| tables.documents.contains_key(&document.id))
        {
            return Err(RepositoryError::Conflict);
        }
        for document in &documents {
            tables
                .documents
                .insert(document.id.clone(), document.clone());
        }
        Ok(documents)
    }

    fn update_document(&self, document: DocumentRecord) -> Result<(), RepositoryError> {
        let mut tables = lock(&self.tables)?;
        match tables.documents.get_mut(&document.id) {
            Some(existing) => {
                *existing = document;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch_document(&self, id: &DocumentId) -> Result<Option<DocumentRecord>, RepositoryError> {
        Ok(lock(&self.tables)?.documents.get(id).cloned())
    }

    fn documents_for_case(&self, id: &CaseId) -> Result<Vec<DocumentRecord>, RepositoryError> {
        Ok(lock(&self.tables)?
            .documents
            .values()
            .filter(|document| document.case_id.as_ref() == Some(id))
            .cloned()
            .collect())
    }

    fn documents_for_submission(
        &self,
        submission_id: &str,
    ) -> Result<Vec<DocumentRecord>, RepositoryError> {
        Ok(lock(&self.tables)?
            .documents
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
        Ok(lock(&self.tables)?
            .documents
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
        lock(&self.tables)?.audit.push(entry);
        Ok(())
    }

    fn audit_trail(&self, id: &DocumentId) -> Result<Vec<AuditEntry>, RepositoryError> {
        Ok(lock(&self.tables)?
            .audit
            .iter()
            .filter(|entry| &entry.document_id == id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct InMemorySessionStore {
    sessions: Mutex<HashMap<SessionToken, AgentSession>>,
}

impl SessionStore for InMemorySessionStore {
    fn insert(&self, session: AgentSession) -> Result<(), RepositoryError> {
        let mut sessions = lock(&self.sessions)?;
        if sessions.contains_key(&session.token) {
            return Err(RepositoryError::Conflict);
        }
        sessions.insert(session.token.clone(), session);
        Ok(())
    }

    fn fetch(&self, token: &SessionToken) -> Result<Option<AgentSession>, RepositoryError> {
        Ok(lock(&self.sessions)?.get(token).cloned())
    }

    fn revoke(&self, token: &SessionToken) -> Result<(), RepositoryError> {
        lock(&self.sessions)?.remove(token);
        Ok(())
    }
}

/// In-process provider that accepts every request against the built-in templates.
#[derive(Default)]
pub(crate) struct LoopbackSigningProvider {
    sequence: AtomicU64,
    sessions: Mutex<HashMap<String, SigningSessionState>>,
}

impl LoopbackSigningProvider {
    /// Mark a loopback session as completed, as if the signer had finished remotely.
    pub(crate) fn complete(&self, submission_id: &str) -> Result<(), ProviderError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| ProviderError::Upstream("loopback state poisoned".to_string()))?;
        let state = sessions
            .get_mut(submission_id)
            .ok_or_else(|| ProviderError::SessionNotFound(submission_id.to_string()))?;
        state.status = RemoteSessionStatus::Completed;
        state.completed_at = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl SigningProvider for LoopbackSigningProvider {
    async fn create_signing_session(
        &self,
        request: SigningRequest,
    ) -> Result<SigningSession, ProviderError> {
        find_template(&request.template_ref)
            .ok_or_else(|| ProviderError::TemplateNotFound(request.template_ref.clone()))?;

        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let signing_url = format!("https://sign.loopback.local/s/{}", Uuid::new_v4().simple());
        let session = SigningSession {
            submission_id: format!("{}", 10_000 + id),
            submitter_id: format!("{}", 20_000 + id),
            signing_url: signing_url.clone(),
        };

        self.sessions
            .lock()
            .map_err(|_| ProviderError::Upstream("loopback state poisoned".to_string()))?
            .insert(
                session.submission_id.clone(),
                SigningSessionState {
                    status: RemoteSessionStatus::Pending,
                    signing_url: Some(signing_url),
                    completed_at: None,
                },
            );
        Ok(session)
    }

    async fn get_signing_session(
        &self,
        submission_id: &str,
    ) -> Result<SigningSessionState, ProviderError> {
        self.sessions
            .lock()
            .map_err(|_| ProviderError::Upstream("loopback state poisoned".to_string()))?
            .get(submission_id)
            .cloned()
            .ok_or_else(|| ProviderError::SessionNotFound(submission_id.to_string()))
    }

    async fn get_template(&self, template_ref: &str) -> Result<Vec<String>, ProviderError> {
        let descriptor = find_template(template_ref)
            .ok_or_else(|| ProviderError::TemplateNotFound(template_ref.to_string()))?;
        Ok(descriptor
            .fields
            .iter()
            .map(|field| field.to_string())
            .collect())
    }
}

/// Provider selected from `APP_SIGNING_PROVIDER`.
pub(crate) enum ConfiguredSigningProvider {
    Loopback(LoopbackSigningProvider),
    Disabled,
}

impl ConfiguredSigningProvider {
    pub(crate) fn from_kind(kind: SigningProviderKind) -> Self {
        match kind {
            SigningProviderKind::Loopback => Self::Loopback(LoopbackSigningProvider::default()),
            SigningProviderKind::Disabled => Self::Disabled,
        }
    }
}

#[async_trait]
impl SigningProvider for ConfiguredSigningProvider {
    async fn create_signing_session(
        &self,
        request: SigningRequest,
    ) -> Result<SigningSession, ProviderError> {
        match self {
            Self::Loopback(provider) => provider.create_signing_session(request).await,
            Self::Disabled => Err(ProviderError::NotConfigured),
        }
    }

    async fn get_signing_session(
        &self,
        submission_id: &str,
    ) -> Result<SigningSessionState, ProviderError> {
        match self {
            Self::Loopback(provider) => provider.get_signing_session(submission_id).await,
            Self::Disabled => Err(ProviderError::NotConfigured),
        }
    }

    async fn get_template(&self, template_ref: &str) -> Result<Vec<String>, ProviderError> {
        match self {
            Self::Loopback(provider) => provider.get_template(template_ref).await,
            Self::Disabled => Err(ProviderError::NotConfigured),
        }
    }
}
