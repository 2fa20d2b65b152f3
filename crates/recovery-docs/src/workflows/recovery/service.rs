use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use super::classifier::classify_questionnaire;
use super::descriptors::{self, DocumentDescriptor};
use super::domain::{
    Actor, AuditEntry, CaseId, CaseRecord, CaseStatus, DocumentId, DocumentRecord,
    DocumentStatus, RemoteSession,
};
use super::population::{self, PopulationContext};
use super::provider::{
    accepted_prefill, with_timeout, ProviderError, SigningProvider, SigningRequest,
};
use super::questionnaire::{IntakeError, IntakeQuestionnaire};
use super::repository::{CaseOverview, CaseRepository, RepositoryError};
use super::signing::{
    self, aggregate_case_status, CaseEffect, DocumentTransition, SignatureCapture,
    SigningError, TransitionOutcome,
};
use super::webhook::SigningEvent;

pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

static CASE_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static DOCUMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_case_id(year: i32) -> (CaseId, String) {
    let id = CASE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    (CaseId(format!("case-{id:06}")), format!("RC-{year}-{id:06}"))
}

fn next_document_id() -> DocumentId {
    let id = DOCUMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    DocumentId(format!("doc-{id:06}"))
}

/// Finalised intake questionnaire.
#[derive(Debug, Clone, Deserialize)]
pub struct IntakeSubmission {
    pub questionnaire: Value,
}

/// Document prepared outside any case.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdHocDocumentRequest {
    pub template_ref: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub notary_required: bool,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// Recipient override when sending a document to the provider. Falls back to the case client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendForSigningRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseCreated {
    pub case: CaseRecord,
    pub documents: Vec<DocumentRecord>,
    pub document_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookOutcome {
    pub event_type: String,
    pub handled: bool,
    pub documents_updated: usize,
}

/// Coarse error taxonomy used by transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Upstream,
    Persistence,
}

/// Error raised by the recovery case service.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryServiceError {
    #[error(transparent)]
    Intake(#[from] IntakeError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error("ad-hoc documents require a template reference and a title")]
    IncompleteAdHocDocument,
    #[error("a recipient email is required before sending a document for signing")]
    MissingRecipientEmail,
    #[error("document {0} has not been sent for signing")]
    NotSentForSigning(DocumentId),
    #[error("document {0} is not attached to a case")]
    NotAttachedToCase(DocumentId),
    #[error("case {0} not found")]
    CaseNotFound(CaseId),
    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl RecoveryServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RecoveryServiceError::Intake(_)
            | RecoveryServiceError::Signing(_)
            | RecoveryServiceError::IncompleteAdHocDocument
            | RecoveryServiceError::MissingRecipientEmail
            | RecoveryServiceError::NotSentForSigning(_)
            | RecoveryServiceError::NotAttachedToCase(_) => ErrorKind::Validation,
            RecoveryServiceError::CaseNotFound(_)
            | RecoveryServiceError::DocumentNotFound(_)
            | RecoveryServiceError::Provider(ProviderError::TemplateNotFound(_))
            | RecoveryServiceError::Provider(ProviderError::SessionNotFound(_))
            | RecoveryServiceError::Repository(RepositoryError::NotFound) => ErrorKind::NotFound,
            RecoveryServiceError::Provider(_) => ErrorKind::Upstream,
            RecoveryServiceError::Repository(_) => ErrorKind::Persistence,
        }
    }
}

/// Service composing the classifier, descriptor bundles, field population, signing state
/// machine, repository, and signing provider.
pub struct RecoveryCaseService<R, P> {
    repository: Arc<R>,
    provider: Arc<P>,
    provider_timeout: Duration,
}

impl<R, P> RecoveryCaseService<R, P>
where
    R: CaseRepository + 'static,
    P: SigningProvider + 'static,
{
    pub fn new(repository: Arc<R>, provider: Arc<P>) -> Self {
        Self::with_timeout(repository, provider, DEFAULT_PROVIDER_TIMEOUT)
    }

    pub fn with_timeout(repository: Arc<R>, provider: Arc<P>, provider_timeout: Duration) -> Self {
        Self {
            repository,
            provider,
            provider_timeout,
        }
    }

    /// Classify the intake, open the case, and create its document bundle.
    ///
    /// Steps are not rolled back: a case whose documents fail to insert stays created and the
    /// failure is logged and returned.
    pub fn create_case(
        &self,
        intake: IntakeSubmission,
        actor: &Actor,
    ) -> Result<CaseCreated, RecoveryServiceError> {
        let questionnaire = IntakeQuestionnaire::new(&intake.questionnaire);
        questionnaire.validate()?;

        let now = Utc::now();
        let case_type = classify_questionnaire(&questionnaire);
        let (case_id, case_number) = next_case_id(now.year());

        let case = CaseRecord {
            id: case_id,
            case_number,
            case_type,
            client: questionnaire.client_identity(),
            property: questionnaire.property_details(),
            questionnaire: intake.questionnaire.clone(),
            status: CaseStatus::DocumentsPending,
            created_at: now,
            updated_at: now,
        };
        let case = self.repository.insert_case(case)?;

        let context = PopulationContext {
            questionnaire,
            case_number: Some(case.case_number.as_str()),
            signing_date: now.date_naive(),
        };
        let documents: Vec<DocumentRecord> = descriptors::resolve(case_type)
            .iter()
            .map(|descriptor| document_from_descriptor(&case.id, descriptor, &context, now))
            .collect();

        let documents = self.repository.insert_documents(documents).map_err(|err| {
            error!(case_id = %case.id, error = %err, "case created but document batch failed");
            err
        })?;

        for document in &documents {
            let entry = AuditEntry::new(
                document,
                "document_created",
                actor,
                now,
                json!({
                    "case_type": case_type.label(),
                    "template_ref": document.template_ref,
                    "populated_fields": document.fields.len(),
                }),
            );
            self.repository.append_audit(entry).map_err(|err| {
                error!(document_id = %document.id, error = %err, "audit write failed after case creation");
                err
            })?;
        }

        info!(
            case_id = %case.id,
            case_number = %case.case_number,
            case_type = case_type.label(),
            documents = documents.len(),
            "recovery case created"
        );

        Ok(CaseCreated {
            document_count: documents.len(),
            case,
            documents,
        })
    }

    /// Prepare a single document that is not bound to any case.
    pub fn prepare_document(
        &self,
        request: AdHocDocumentRequest,
        actor: &Actor,
    ) -> Result<DocumentRecord, RecoveryServiceError> {
        let template_ref = request.template_ref.trim().to_string();
        let title = request.title.trim().to_string();
        if template_ref.is_empty() || title.is_empty() {
            return Err(RecoveryServiceError::IncompleteAdHocDocument);
        }

        let now = Utc::now();
        let known = descriptors::find_template(&template_ref);
        let document = DocumentRecord {
            id: next_document_id(),
            case_id: None,
            template_ref,
            title,
            description: request.description,
            group: known.map(|descriptor| descriptor.group),
            notary_required: request.notary_required,
            priority: known.map(|descriptor| descriptor.priority).unwrap_or(0),
            fields: request.fields,
            status: DocumentStatus::Pending,
            sent_at: None,
            viewed_at: None,
            signed_at: None,
            notarized_at: None,
            printed_at: None,
            mailed_at: None,
            tracking_number: None,
            signature: None,
            remote: None,
            created_at: now,
            updated_at: now,
        };

        let mut stored = self.repository.insert_documents(vec![document])?;
        let document = stored.pop().ok_or(RepositoryError::NotFound)?;
        self.repository.append_audit(AuditEntry::new(
            &document,
            "document_prepared",
            actor,
            now,
            json!({ "template_ref": document.template_ref }),
        ))?;
        Ok(document)
    }

    pub fn get_case(&self, case_id: &CaseId) -> Result<CaseOverview, RecoveryServiceError> {
        let case = self
            .repository
            .fetch_case(case_id)?
            .ok_or_else(|| RecoveryServiceError::CaseNotFound(case_id.clone()))?;
        let documents = self.repository.documents_for_case(case_id)?;
        Ok(CaseOverview::new(case, documents))
    }

    pub fn get_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<DocumentRecord, RecoveryServiceError> {
        self.repository
            .fetch_document(document_id)?
            .ok_or_else(|| RecoveryServiceError::DocumentNotFound(document_id.clone()))
    }

    pub fn audit_trail(
        &self,
        document_id: &DocumentId,
    ) -> Result<Vec<AuditEntry>, RecoveryServiceError> {
        self.get_document(document_id)?;
        Ok(self.repository.audit_trail(document_id)?)
    }

    pub fn mark_ready(
        &self,
        document_id: &DocumentId,
        actor: &Actor,
    ) -> Result<DocumentRecord, RecoveryServiceError> {
        self.transition(document_id, DocumentTransition::MarkReady, actor)
    }

    pub fn update_fields(
        &self,
        document_id: &DocumentId,
        fields: BTreeMap<String, String>,
        actor: &Actor,
    ) -> Result<DocumentRecord, RecoveryServiceError> {
        self.transition(document_id, DocumentTransition::UpdateFields(fields), actor)
    }

    pub fn sign(
        &self,
        document_id: &DocumentId,
        capture: SignatureCapture,
        actor: &Actor,
    ) -> Result<DocumentRecord, RecoveryServiceError> {
        self.transition(document_id, DocumentTransition::Sign(capture), actor)
    }

    pub fn notarize(
        &self,
        document_id: &DocumentId,
        actor: &Actor,
    ) -> Result<DocumentRecord, RecoveryServiceError> {
        self.transition(document_id, DocumentTransition::Notarize, actor)
    }

    pub fn mark_printed(
        &self,
        document_id: &DocumentId,
        actor: &Actor,
    ) -> Result<DocumentRecord, RecoveryServiceError> {
        self.transition(document_id, DocumentTransition::MarkPrinted, actor)
    }

    pub fn mark_mailed(
        &self,
        document_id: &DocumentId,
        tracking_number: String,
        actor: &Actor,
    ) -> Result<DocumentRecord, RecoveryServiceError> {
        self.transition(
            document_id,
            DocumentTransition::MarkMailed { tracking_number },
            actor,
        )
    }

    /// Merge freshly computed defaults into the stored fields without overwriting any key
    /// that is already present. Status is left as is; signed documents are locked.
    pub fn repopulate_document(
        &self,
        document_id: &DocumentId,
        actor: &Actor,
    ) -> Result<DocumentRecord, RecoveryServiceError> {
        let mut document = self.get_document(document_id)?;
        signing::ensure_sendable(&document)?;
        let case_id = document
            .case_id
            .clone()
            .ok_or_else(|| RecoveryServiceError::NotAttachedToCase(document_id.clone()))?;
        let case = self
            .repository
            .fetch_case(&case_id)?
            .ok_or(RecoveryServiceError::CaseNotFound(case_id))?;

        let now = Utc::now();
        let context = PopulationContext {
            questionnaire: IntakeQuestionnaire::new(&case.questionnaire),
            case_number: Some(case.case_number.as_str()),
            signing_date: now.date_naive(),
        };
        let defaults = match descriptors::find_template(&document.template_ref) {
            Some(descriptor) => population::populate(descriptor.fields, &context),
            None => {
                let declared: Vec<String> = document.fields.keys().cloned().collect();
                population::populate(declared.as_slice(), &context)
            }
        };

        let added = population::merge_defaults(&mut document.fields, defaults);
        if added == 0 {
            return Ok(document);
        }
        document.updated_at = now;
        self.repository.update_document(document.clone())?;
        self.repository.append_audit(AuditEntry::new(
            &document,
            "prepare_fields",
            actor,
            now,
            json!({ "fields_added": added }),
        ))?;
        Ok(document)
    }

    /// Open a remote signing session and mark the document as sent.
    ///
    /// Local state is only written after the provider confirms the session.
    pub async fn send_for_signing(
        &self,
        document_id: &DocumentId,
        request: SendForSigningRequest,
        actor: &Actor,
    ) -> Result<DocumentRecord, RecoveryServiceError> {
        let document = self.get_document(document_id)?;
        signing::ensure_sendable(&document)?;

        let case = match &document.case_id {
            Some(case_id) => self.repository.fetch_case(case_id)?,
            None => None,
        };
        let email = non_blank(request.email)
            .or_else(|| case.as_ref().and_then(|case| case.client.email.clone()))
            .ok_or(RecoveryServiceError::MissingRecipientEmail)?;
        let name = non_blank(request.name)
            .or_else(|| case.as_ref().map(|case| case.client.full_name.clone()))
            .unwrap_or_else(|| email.clone());

        let template_fields = with_timeout(
            self.provider_timeout,
            self.provider.get_template(&document.template_ref),
        )
        .await?;
        let signing_request = SigningRequest {
            template_ref: document.template_ref.clone(),
            submitter_email: email,
            submitter_name: name,
            prefilled: accepted_prefill(&document.fields, &template_fields),
        };

        let session = with_timeout(
            self.provider_timeout,
            self.provider.create_signing_session(signing_request),
        )
        .await
        .map_err(|err| {
            warn!(document_id = %document.id, error = %err, "signing session was not created");
            err
        })?;

        // The provider call may have raced a direct signature; apply to the current copy.
        let current = self.get_document(document_id)?;
        if let Err(err) = signing::ensure_sendable(&current) {
            warn!(
                document_id = %current.id,
                submission_id = %session.submission_id,
                "document was signed while the signing session was being created; remote session left unused"
            );
            return Err(err.into());
        }
        let remote = RemoteSession {
            submission_id: session.submission_id,
            submitter_id: session.submitter_id,
            signing_url: Some(session.signing_url),
        };
        let (document, _) =
            self.apply_and_record(current, DocumentTransition::SentForSigning(remote), actor)?;
        Ok(document)
    }

    /// Pull the remote session state and feed it through the state machine.
    pub async fn refresh_signing_session(
        &self,
        document_id: &DocumentId,
        actor: &Actor,
    ) -> Result<DocumentRecord, RecoveryServiceError> {
        let document = self.get_document(document_id)?;
        let submission_id = document
            .remote
            .as_ref()
            .map(|remote| remote.submission_id.clone())
            .ok_or_else(|| RecoveryServiceError::NotSentForSigning(document_id.clone()))?;

        let state = with_timeout(
            self.provider_timeout,
            self.provider.get_signing_session(&submission_id),
        )
        .await?;

        let current = self.get_document(document_id)?;
        let (document, _) = self.apply_and_record(
            current,
            DocumentTransition::SessionRefreshed {
                status: state.status,
                signing_url: state.signing_url,
                completed_at: state.completed_at,
            },
            actor,
        )?;
        Ok(document)
    }

    /// Apply a provider event. Events that match no local document are reported as unhandled
    /// rather than failing.
    pub fn handle_signing_event(
        &self,
        event: SigningEvent,
    ) -> Result<WebhookOutcome, RecoveryServiceError> {
        let event_type = event.event_type().to_string();
        let actor = Actor::System;

        let targets: Vec<(DocumentRecord, DocumentTransition)> = match event {
            SigningEvent::FormViewed {
                submitter_id,
                viewed_at,
            } => self
                .repository
                .document_for_submitter(&submitter_id)?
                .map(|document| (document, DocumentTransition::ProviderViewed { viewed_at }))
                .into_iter()
                .collect(),
            SigningEvent::FormCompleted {
                submitter_id,
                completion,
                ..
            } => self
                .repository
                .document_for_submitter(&submitter_id)?
                .map(|document| (document, DocumentTransition::ProviderCompleted(completion)))
                .into_iter()
                .collect(),
            SigningEvent::SubmissionCompleted {
                submission_id,
                completed_at,
            } => self
                .repository
                .documents_for_submission(&submission_id)?
                .into_iter()
                .map(|document| {
                    (
                        document,
                        DocumentTransition::SubmissionCompleted { completed_at },
                    )
                })
                .collect(),
            SigningEvent::Unrecognized { .. } => {
                debug!(event_type = %event_type, "ignoring unrecognised signing event");
                return Ok(WebhookOutcome {
                    event_type,
                    handled: false,
                    documents_updated: 0,
                });
            }
        };

        if targets.is_empty() {
            warn!(event_type = %event_type, "signing event matched no local document");
            return Ok(WebhookOutcome {
                event_type,
                handled: false,
                documents_updated: 0,
            });
        }

        let mut updated = 0;
        let mut touched_cases = BTreeSet::new();
        for (document, transition) in targets {
            let case_effect = transition.case_effect();
            let (document, outcome) =
                self.apply_document(document, transition, &actor, Utc::now())?;
            if outcome == TransitionOutcome::Applied {
                updated += 1;
                if case_effect == CaseEffect::Aggregate {
                    if let Some(case_id) = document.case_id {
                        touched_cases.insert(case_id);
                    }
                }
            }
        }
        // Bulk completion may touch several documents of one case; aggregate each case once.
        for case_id in touched_cases {
            self.reconcile_case(&case_id, CaseEffect::Aggregate)?;
        }

        info!(event_type = %event_type, documents_updated = updated, "signing event applied");
        Ok(WebhookOutcome {
            event_type,
            handled: true,
            documents_updated: updated,
        })
    }

    fn transition(
        &self,
        document_id: &DocumentId,
        transition: DocumentTransition,
        actor: &Actor,
    ) -> Result<DocumentRecord, RecoveryServiceError> {
        let document = self.get_document(document_id)?;
        let (document, _) = self.apply_and_record(document, transition, actor)?;
        Ok(document)
    }

    /// Apply, persist, audit, then re-aggregate the owning case when the transition calls for it.
    fn apply_and_record(
        &self,
        document: DocumentRecord,
        transition: DocumentTransition,
        actor: &Actor,
    ) -> Result<(DocumentRecord, TransitionOutcome), RecoveryServiceError> {
        let case_effect = transition.case_effect();
        let (document, outcome) = self.apply_document(document, transition, actor, Utc::now())?;
        if outcome == TransitionOutcome::Applied {
            if let Some(case_id) = &document.case_id {
                self.reconcile_case(case_id, case_effect)?;
            }
        }
        Ok((document, outcome))
    }

    fn apply_document(
        &self,
        mut document: DocumentRecord,
        transition: DocumentTransition,
        actor: &Actor,
        at: DateTime<Utc>,
    ) -> Result<(DocumentRecord, TransitionOutcome), RecoveryServiceError> {
        let action = transition.action();
        let details_source = transition.clone();

        let outcome = signing::apply_transition(&mut document, transition, at)?;
        if outcome == TransitionOutcome::Unchanged {
            debug!(document_id = %document.id, action, status = document.status.label(), "transition left document unchanged");
            return Ok((document, outcome));
        }

        self.repository.update_document(document.clone())?;
        let details = details_source.audit_details(&document);
        self.repository
            .append_audit(AuditEntry::new(&document, action, actor, at, details))
            .map_err(|err| {
                error!(document_id = %document.id, action, error = %err, "document updated but audit write failed");
                err
            })?;

        info!(
            document_id = %document.id,
            action,
            status = document.status.label(),
            actor = %actor,
            "document transition applied"
        );
        Ok((document, outcome))
    }

    /// Recompute the case status from a fresh read of its documents. Safe to re-run.
    fn reconcile_case(
        &self,
        case_id: &CaseId,
        effect: CaseEffect,
    ) -> Result<Option<CaseStatus>, RecoveryServiceError> {
        if effect == CaseEffect::None {
            return Ok(None);
        }
        let mut case = self
            .repository
            .fetch_case(case_id)?
            .ok_or_else(|| RecoveryServiceError::CaseNotFound(case_id.clone()))?;
        if effect == CaseEffect::Reopen && case.status == CaseStatus::DocumentsPending {
            return Ok(None);
        }

        let documents = self.repository.documents_for_case(case_id)?;
        let status = aggregate_case_status(&documents);
        if status != case.status {
            info!(
                case_id = %case.id,
                from = case.status.label(),
                to = status.label(),
                "case status changed"
            );
            case.status = status;
            case.updated_at = Utc::now();
            self.repository.update_case(case)?;
        }
        Ok(Some(status))
    }
}

fn document_from_descriptor(
    case_id: &CaseId,
    descriptor: &DocumentDescriptor,
    context: &PopulationContext<'_>,
    now: DateTime<Utc>,
) -> DocumentRecord {
    DocumentRecord {
        id: next_document_id(),
        case_id: Some(case_id.clone()),
        template_ref: descriptor.template_name.to_string(),
        title: descriptor.title.to_string(),
        description: None,
        group: Some(descriptor.group),
        notary_required: descriptor.notary_required,
        priority: descriptor.priority,
        fields: population::populate(descriptor.fields, context),
        status: DocumentStatus::Pending,
        sent_at: None,
        viewed_at: None,
        signed_at: None,
        notarized_at: None,
        printed_at: None,
        mailed_at: None,
        tracking_number: None,
        signature: None,
        remote: None,
        created_at: now,
        updated_at: now,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
