use serde::Serialize;

use super::domain::{AuditEntry, CaseId, CaseRecord, DocumentId, DocumentRecord};

/// Storage abstraction so the service module can be exercised in isolation.
///
/// Single-record updates are expected to be atomic. Nothing is ever deleted.
pub trait CaseRepository: Send + Sync {
    fn insert_case(&self, record: CaseRecord) -> Result<CaseRecord, RepositoryError>;
    fn update_case(&self, record: CaseRecord) -> Result<(), RepositoryError>;
    fn fetch_case(&self, id: &CaseId) -> Result<Option<CaseRecord>, RepositoryError>;

    /// Insert a batch of documents bound to one case (or a single ad-hoc document).
    fn insert_documents(
        &self,
        documents: Vec<DocumentRecord>,
    ) -> Result<Vec<DocumentRecord>, RepositoryError>;
    fn update_document(&self, document: DocumentRecord) -> Result<(), RepositoryError>;
    fn fetch_document(&self, id: &DocumentId) -> Result<Option<DocumentRecord>, RepositoryError>;
    fn documents_for_case(&self, id: &CaseId) -> Result<Vec<DocumentRecord>, RepositoryError>;
    fn documents_for_submission(
        &self,
        submission_id: &str,
    ) -> Result<Vec<DocumentRecord>, RepositoryError>;
    fn document_for_submitter(
        &self,
        submitter_id: &str,
    ) -> Result<Option<DocumentRecord>, RepositoryError>;

    fn append_audit(&self, entry: AuditEntry) -> Result<(), RepositoryError>;
    fn audit_trail(&self, id: &DocumentId) -> Result<Vec<AuditEntry>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Case plus its documents ordered for the signing queue.
#[derive(Debug, Clone, Serialize)]
pub struct CaseOverview {
    pub case: CaseRecord,
    pub documents: Vec<DocumentRecord>,
}

impl CaseOverview {
    pub fn new(case: CaseRecord, mut documents: Vec<DocumentRecord>) -> Self {
        documents.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        Self { case, documents }
    }

    pub fn outstanding(&self) -> impl Iterator<Item = &DocumentRecord> {
        self.documents
            .iter()
            .filter(|document| !document.is_signed() || document.awaiting_notary())
    }
}
