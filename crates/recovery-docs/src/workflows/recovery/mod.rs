//! Recovery case intake, document bundles, and the signing lifecycle.
//!
//! [`RecoveryCaseService`] composes the pieces: the classifier picks a [`CaseType`] from the
//! intake questionnaire, [`descriptors::resolve`] yields the bundle, the population engine fills
//! fields, and every status change goes through [`signing::apply_transition`]. Storage and the
//! remote signing provider sit behind the [`CaseRepository`] and [`SigningProvider`] traits.

pub mod audit;
pub mod classifier;
pub mod descriptors;
pub mod domain;
pub mod population;
pub mod provider;
pub mod questionnaire;
pub mod repository;
pub mod router;
pub mod service;
pub mod session;
pub mod signing;
pub mod webhook;

#[cfg(test)]
mod tests;

pub use audit::{write_audit_csv, AuditExportError};
pub use classifier::{classify, requires_attorney};
pub use descriptors::DocumentDescriptor;
pub use domain::{
    Actor, AuditEntry, CaseId, CaseRecord, CaseStatus, CaseType, DocumentGroup, DocumentId,
    DocumentRecord, DocumentStatus,
};
pub use provider::{
    ProviderError, RemoteSessionStatus, SigningProvider, SigningRequest, SigningSession,
    SigningSessionState,
};
pub use questionnaire::{IntakeError, IntakeQuestionnaire};
pub use repository::{CaseOverview, CaseRepository, RepositoryError};
pub use router::recovery_router;
pub use service::{
    AdHocDocumentRequest, CaseCreated, ErrorKind, IntakeSubmission, RecoveryCaseService,
    RecoveryServiceError, SendForSigningRequest, WebhookOutcome,
};
pub use session::{AgentSession, SessionError, SessionRegistry, SessionStore, SessionToken};
pub use signing::{SignatureCapture, SigningError};
pub use webhook::{SigningEvent, WebhookError};
