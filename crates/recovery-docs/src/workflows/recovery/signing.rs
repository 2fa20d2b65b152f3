//! Document signing lifecycle and case status aggregation.
//!
//! Direct user actions, provider webhooks, and session refreshes all flow through
//! [`apply_transition`], so there is a single definition of which transitions are legal.
//! A rejected transition leaves the document untouched.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::domain::{
    CaseStatus, DocumentRecord, DocumentStatus, RemoteSession, SignatureMetadata,
};
use super::provider::RemoteSessionStatus;

pub const ELECTRONIC_CONSENT_TEXT: &str = "I agree that my electronic signature is the legal \
equivalent of my handwritten signature on this document and I consent to conduct this \
transaction electronically.";

/// Signature payload submitted by the signer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureCapture {
    #[serde(default)]
    pub signature_url: Option<String>,
    #[serde(default)]
    pub signer_ip: Option<String>,
    #[serde(default)]
    pub signer_user_agent: Option<String>,
}

/// Completion details reported by the signing provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCompletion {
    pub signature_url: Option<String>,
    pub signer_ip: Option<String>,
    pub signer_user_agent: Option<String>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentTransition {
    MarkReady,
    UpdateFields(BTreeMap<String, String>),
    Sign(SignatureCapture),
    Notarize,
    MarkPrinted,
    MarkMailed { tracking_number: String },
    SentForSigning(RemoteSession),
    ProviderViewed { viewed_at: DateTime<Utc> },
    ProviderCompleted(ProviderCompletion),
    SubmissionCompleted { completed_at: DateTime<Utc> },
    SessionRefreshed {
        status: RemoteSessionStatus,
        signing_url: Option<String>,
        completed_at: Option<DateTime<Utc>>,
    },
}

/// How a transition bears on the owning case's aggregate status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseEffect {
    None,
    Aggregate,
    /// Only recompute when the case has already left `documents_pending`.
    Reopen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SigningError {
    #[error("a signature payload is required to sign a document")]
    MissingSignature,
    #[error("document was already signed at {signed_at}")]
    AlreadySigned { signed_at: DateTime<Utc> },
    #[error("document has a captured signature and can no longer be edited or re-sent")]
    Locked,
    #[error("document does not require notarization")]
    NotaryNotRequired,
    #[error("document must be signed before it can be {action} (current status: {status})")]
    NotSigned {
        action: &'static str,
        status: &'static str,
    },
    #[error("a tracking number is required to mark a document as mailed")]
    MissingTrackingNumber,
}

impl DocumentTransition {
    /// Audit action name.
    pub fn action(&self) -> &'static str {
        match self {
            DocumentTransition::MarkReady => "mark_ready",
            DocumentTransition::UpdateFields(_) => "update_fields",
            DocumentTransition::Sign(_) => "sign",
            DocumentTransition::Notarize => "notarize",
            DocumentTransition::MarkPrinted => "mark_printed",
            DocumentTransition::MarkMailed { .. } => "mark_mailed",
            DocumentTransition::SentForSigning(_) => "send_for_signing",
            DocumentTransition::ProviderViewed { .. } => "webhook.form_viewed",
            DocumentTransition::ProviderCompleted(_) => "webhook.form_completed",
            DocumentTransition::SubmissionCompleted { .. } => "webhook.submission_completed",
            DocumentTransition::SessionRefreshed { .. } => "refresh_signing_session",
        }
    }

    pub fn case_effect(&self) -> CaseEffect {
        match self {
            DocumentTransition::MarkReady | DocumentTransition::UpdateFields(_) => {
                CaseEffect::Reopen
            }
            DocumentTransition::Sign(_)
            | DocumentTransition::Notarize
            | DocumentTransition::MarkPrinted
            | DocumentTransition::SentForSigning(_)
            | DocumentTransition::ProviderCompleted(_)
            | DocumentTransition::SubmissionCompleted { .. }
            | DocumentTransition::SessionRefreshed { .. } => CaseEffect::Aggregate,
            DocumentTransition::MarkMailed { .. } | DocumentTransition::ProviderViewed { .. } => {
                CaseEffect::None
            }
        }
    }

    /// Audit payload. Never includes raw signature data.
    pub fn audit_details(&self, document: &DocumentRecord) -> Value {
        let base = json!({ "status": document.status.label() });
        let extra = match self {
            DocumentTransition::UpdateFields(fields) => {
                json!({ "fields": fields.keys().collect::<Vec<_>>() })
            }
            DocumentTransition::Sign(capture) => json!({
                "signer_ip": capture.signer_ip,
                "signer_user_agent": capture.signer_user_agent,
            }),
            DocumentTransition::MarkMailed { tracking_number } => {
                json!({ "tracking_number": tracking_number })
            }
            DocumentTransition::SentForSigning(remote) => json!({
                "submission_id": remote.submission_id,
                "submitter_id": remote.submitter_id,
            }),
            DocumentTransition::ProviderCompleted(completion) => json!({
                "completed_at": completion.completed_at,
                "signer_ip": completion.signer_ip,
            }),
            DocumentTransition::SubmissionCompleted { completed_at } => {
                json!({ "completed_at": completed_at })
            }
            DocumentTransition::SessionRefreshed { status, .. } => {
                json!({ "remote_status": status })
            }
            _ => Value::Null,
        };
        match (base, extra) {
            (Value::Object(mut base), Value::Object(extra)) => {
                base.extend(extra);
                Value::Object(base)
            }
            (base, _) => base,
        }
    }
}

/// Check that a document can be handed to the provider, before any remote call is made.
pub fn ensure_sendable(document: &DocumentRecord) -> Result<(), SigningError> {
    if document.has_signature() {
        return Err(SigningError::Locked);
    }
    Ok(())
}

/// Apply one transition to a document. Preconditions are checked before anything is mutated.
pub fn apply_transition(
    document: &mut DocumentRecord,
    transition: DocumentTransition,
    at: DateTime<Utc>,
) -> Result<TransitionOutcome, SigningError> {
    let outcome = match transition {
        // Re-flags from any state. Signature metadata and annotations stay as recorded.
        DocumentTransition::MarkReady => {
            document.status = DocumentStatus::Pending;
            TransitionOutcome::Applied
        }
        DocumentTransition::UpdateFields(fields) => {
            ensure_sendable(document)?;
            document.fields.extend(fields);
            document.status = DocumentStatus::Pending;
            TransitionOutcome::Applied
        }
        DocumentTransition::Sign(capture) => sign(document, capture, at)?,
        DocumentTransition::Notarize => {
            if !document.notary_required {
                return Err(SigningError::NotaryNotRequired);
            }
            ensure_signed(document, "notarized")?;
            if document.notarized_at.is_some() {
                TransitionOutcome::Unchanged
            } else {
                document.notarized_at = Some(at);
                TransitionOutcome::Applied
            }
        }
        DocumentTransition::MarkPrinted => {
            if document.status == DocumentStatus::Printed {
                TransitionOutcome::Unchanged
            } else {
                document.printed_at = Some(at);
                document.status = DocumentStatus::Printed;
                TransitionOutcome::Applied
            }
        }
        DocumentTransition::MarkMailed { tracking_number } => {
            let tracking_number = tracking_number.trim();
            if tracking_number.is_empty() {
                return Err(SigningError::MissingTrackingNumber);
            }
            ensure_signed(document, "mailed")?;
            document.mailed_at = Some(at);
            document.tracking_number = Some(tracking_number.to_string());
            TransitionOutcome::Applied
        }
        DocumentTransition::SentForSigning(remote) => {
            ensure_sendable(document)?;
            document.remote = Some(remote);
            document.sent_at = Some(at);
            document.viewed_at = None;
            document.status = DocumentStatus::SentForSigning;
            TransitionOutcome::Applied
        }
        DocumentTransition::ProviderViewed { viewed_at } => provider_viewed(document, viewed_at),
        DocumentTransition::ProviderCompleted(completion) => {
            provider_completed(document, completion)
        }
        DocumentTransition::SubmissionCompleted { completed_at } => {
            submission_completed(document, completed_at)
        }
        DocumentTransition::SessionRefreshed {
            status,
            signing_url,
            completed_at,
        } => {
            let mut outcome = TransitionOutcome::Unchanged;
            if let (Some(remote), Some(url)) = (document.remote.as_mut(), signing_url) {
                if remote.signing_url.as_deref() != Some(url.as_str()) {
                    remote.signing_url = Some(url);
                    outcome = TransitionOutcome::Applied;
                }
            }
            let remote_outcome = match status {
                RemoteSessionStatus::Opened => provider_viewed(document, at),
                RemoteSessionStatus::Completed => {
                    submission_completed(document, completed_at.unwrap_or(at))
                }
                RemoteSessionStatus::Pending
                | RemoteSessionStatus::Declined
                | RemoteSessionStatus::Expired => TransitionOutcome::Unchanged,
            };
            if remote_outcome == TransitionOutcome::Applied {
                outcome = TransitionOutcome::Applied;
            }
            outcome
        }
    };

    if outcome == TransitionOutcome::Applied {
        document.updated_at = at;
    }
    Ok(outcome)
}

fn sign(
    document: &mut DocumentRecord,
    capture: SignatureCapture,
    at: DateTime<Utc>,
) -> Result<TransitionOutcome, SigningError> {
    let signature_url = capture
        .signature_url
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .ok_or(SigningError::MissingSignature)?;

    if let Some(signed_at) = document.signed_at {
        return Err(SigningError::AlreadySigned { signed_at });
    }

    document.signature = Some(SignatureMetadata {
        signature_url: Some(signature_url),
        signer_ip: capture.signer_ip,
        signer_user_agent: capture.signer_user_agent,
        consent_at: at,
        consent_text: ELECTRONIC_CONSENT_TEXT.to_string(),
    });
    document.signed_at = Some(at);
    document.status = DocumentStatus::Signed;
    Ok(TransitionOutcome::Applied)
}

fn ensure_signed(document: &DocumentRecord, action: &'static str) -> Result<(), SigningError> {
    if document.is_signed() {
        Ok(())
    } else {
        Err(SigningError::NotSigned {
            action,
            status: document.status.label(),
        })
    }
}

/// Only a document still waiting on the signer moves to `viewed`; anything further along
/// was reached by a faster path and is left alone.
fn provider_viewed(document: &mut DocumentRecord, viewed_at: DateTime<Utc>) -> TransitionOutcome {
    if document.status != DocumentStatus::SentForSigning {
        return TransitionOutcome::Unchanged;
    }
    document.status = DocumentStatus::Viewed;
    document.viewed_at = Some(viewed_at);
    TransitionOutcome::Applied
}

fn provider_completed(
    document: &mut DocumentRecord,
    completion: ProviderCompletion,
) -> TransitionOutcome {
    let mut outcome = TransitionOutcome::Unchanged;

    if document.signature.is_none() {
        document.signature = Some(SignatureMetadata {
            signature_url: completion.signature_url,
            signer_ip: completion.signer_ip,
            signer_user_agent: completion.signer_user_agent,
            consent_at: completion.completed_at,
            consent_text: ELECTRONIC_CONSENT_TEXT.to_string(),
        });
        outcome = TransitionOutcome::Applied;
    }
    if document.signed_at.is_none() {
        document.signed_at = Some(completion.completed_at);
        outcome = TransitionOutcome::Applied;
    }
    if !document.is_signed() {
        document.status = DocumentStatus::Signed;
        outcome = TransitionOutcome::Applied;
    }
    outcome
}

fn submission_completed(
    document: &mut DocumentRecord,
    completed_at: DateTime<Utc>,
) -> TransitionOutcome {
    if document.is_signed() {
        return TransitionOutcome::Unchanged;
    }
    document.status = DocumentStatus::Signed;
    document.signed_at.get_or_insert(completed_at);
    TransitionOutcome::Applied
}

/// Case status as a pure function of its documents.
pub fn aggregate_case_status(documents: &[DocumentRecord]) -> CaseStatus {
    let all_signed = documents.iter().all(DocumentRecord::is_signed);
    let needs_notary = documents.iter().any(DocumentRecord::awaiting_notary);

    match (all_signed, needs_notary) {
        (true, true) => CaseStatus::Notarization,
        (true, false) => CaseStatus::Submitted,
        (false, _) => CaseStatus::Signing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::recovery::domain::DocumentId;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 2, hour, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn document(status: DocumentStatus, notary_required: bool) -> DocumentRecord {
        DocumentRecord {
            id: DocumentId("doc-test".to_string()),
            case_id: None,
            template_ref: "contingent_fee_agreement".to_string(),
            title: "Contingent Fee Agreement".to_string(),
            description: None,
            group: None,
            notary_required,
            priority: 1,
            fields: BTreeMap::new(),
            status,
            sent_at: None,
            viewed_at: None,
            signed_at: None,
            notarized_at: None,
            printed_at: None,
            mailed_at: None,
            tracking_number: None,
            signature: None,
            remote: None,
            created_at: at(8),
            updated_at: at(8),
        }
    }

    fn capture() -> SignatureCapture {
        SignatureCapture {
            signature_url: Some("https://files.example.com/sig/1.png".to_string()),
            signer_ip: Some("203.0.113.7".to_string()),
            signer_user_agent: Some("Mozilla/5.0".to_string()),
        }
    }

    fn signed(notary_required: bool) -> DocumentRecord {
        let mut doc = document(DocumentStatus::Pending, notary_required);
        apply_transition(&mut doc, DocumentTransition::Sign(capture()), at(9)).expect("signs");
        doc
    }

    #[test]
    fn sign_without_payload_is_rejected_untouched() {
        let mut doc = document(DocumentStatus::Viewed, false);
        let before = doc.clone();

        let err = apply_transition(
            &mut doc,
            DocumentTransition::Sign(SignatureCapture::default()),
            at(9),
        )
        .expect_err("missing signature rejected");

        assert_eq!(err, SigningError::MissingSignature);
        assert_eq!(doc, before);

        let blank = SignatureCapture {
            signature_url: Some("   ".to_string()),
            ..SignatureCapture::default()
        };
        assert_eq!(
            apply_transition(&mut doc, DocumentTransition::Sign(blank), at(9)),
            Err(SigningError::MissingSignature)
        );
    }

    #[test]
    fn sign_records_metadata_and_consent() {
        let doc = signed(false);
        assert_eq!(doc.status, DocumentStatus::Signed);
        assert_eq!(doc.signed_at, Some(at(9)));
        let signature = doc.signature.expect("signature recorded");
        assert_eq!(signature.consent_text, ELECTRONIC_CONSENT_TEXT);
        assert_eq!(signature.signer_ip.as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn re_signing_is_rejected() {
        let mut doc = signed(false);
        let err = apply_transition(&mut doc, DocumentTransition::Sign(capture()), at(10))
            .expect_err("second sign rejected");
        assert_eq!(err, SigningError::AlreadySigned { signed_at: at(9) });
        assert_eq!(doc.signed_at, Some(at(9)));
    }

    #[test]
    fn update_fields_forces_pending_and_merges() {
        let mut doc = document(DocumentStatus::Viewed, false);
        doc.fields.insert("county".to_string(), "Travis".to_string());
        let mut edits = BTreeMap::new();
        edits.insert("client_name".to_string(), "Dana Whitfield".to_string());

        apply_transition(&mut doc, DocumentTransition::UpdateFields(edits), at(9))
            .expect("fields update");

        assert_eq!(doc.status, DocumentStatus::Pending);
        assert_eq!(doc.fields.len(), 2);
        assert_eq!(doc.updated_at, at(9));
    }

    #[test]
    fn field_edits_are_rejected_once_signed() {
        let mut doc = signed(false);
        let mut edits = BTreeMap::new();
        edits.insert("county".to_string(), "Hays".to_string());
        assert_eq!(
            apply_transition(&mut doc, DocumentTransition::UpdateFields(edits), at(10)),
            Err(SigningError::Locked)
        );
        assert_eq!(doc.status, DocumentStatus::Signed);
        assert!(doc.fields.is_empty());
    }

    #[test]
    fn mark_ready_reflags_any_state_and_keeps_the_signature() {
        let mut doc = signed(true);
        apply_transition(&mut doc, DocumentTransition::Notarize, at(10)).expect("notarizes");
        apply_transition(&mut doc, DocumentTransition::MarkPrinted, at(11)).expect("prints");

        let outcome =
            apply_transition(&mut doc, DocumentTransition::MarkReady, at(12)).expect("re-flags");

        assert_eq!(outcome, TransitionOutcome::Applied);
        assert_eq!(doc.status, DocumentStatus::Pending);
        assert_eq!(doc.signed_at, Some(at(9)));
        assert!(doc.signature.is_some());
        assert_eq!(doc.notarized_at, Some(at(10)));
        assert_eq!(
            apply_transition(&mut doc, DocumentTransition::Sign(capture()), at(13)),
            Err(SigningError::AlreadySigned { signed_at: at(9) })
        );
    }

    #[test]
    fn notarize_requires_flag_and_signature() {
        let mut plain = signed(false);
        assert_eq!(
            apply_transition(&mut plain, DocumentTransition::Notarize, at(10)),
            Err(SigningError::NotaryNotRequired)
        );

        let mut unsigned = document(DocumentStatus::Pending, true);
        assert!(matches!(
            apply_transition(&mut unsigned, DocumentTransition::Notarize, at(10)),
            Err(SigningError::NotSigned { .. })
        ));

        let mut doc = signed(true);
        assert_eq!(
            apply_transition(&mut doc, DocumentTransition::Notarize, at(10)),
            Ok(TransitionOutcome::Applied)
        );
        assert_eq!(doc.notarized_at, Some(at(10)));
        assert_eq!(doc.status, DocumentStatus::Signed);
        assert_eq!(
            apply_transition(&mut doc, DocumentTransition::Notarize, at(11)),
            Ok(TransitionOutcome::Unchanged)
        );
    }

    #[test]
    fn mailing_annotates_without_changing_state() {
        let mut doc = document(DocumentStatus::Pending, true);
        apply_transition(&mut doc, DocumentTransition::MarkPrinted, at(9)).expect("prints");
        assert_eq!(doc.status, DocumentStatus::Printed);

        apply_transition(
            &mut doc,
            DocumentTransition::MarkMailed {
                tracking_number: " 9400 1000 0000 ".to_string(),
            },
            at(10),
        )
        .expect("mails");

        assert_eq!(doc.status, DocumentStatus::Printed);
        assert_eq!(doc.mailed_at, Some(at(10)));
        assert_eq!(doc.tracking_number.as_deref(), Some("9400 1000 0000"));
    }

    #[test]
    fn viewed_webhook_only_applies_to_sent_documents() {
        let mut doc = signed(false);
        let before = doc.clone();
        assert_eq!(
            apply_transition(
                &mut doc,
                DocumentTransition::ProviderViewed { viewed_at: at(11) },
                at(11)
            ),
            Ok(TransitionOutcome::Unchanged)
        );
        assert_eq!(doc, before);

        let mut sent = document(DocumentStatus::SentForSigning, false);
        apply_transition(
            &mut sent,
            DocumentTransition::ProviderViewed { viewed_at: at(11) },
            at(12),
        )
        .expect("viewed applies");
        assert_eq!(sent.status, DocumentStatus::Viewed);
        assert_eq!(sent.viewed_at, Some(at(11)));
    }

    #[test]
    fn provider_completion_signs_from_any_state_without_overwriting() {
        let completion = ProviderCompletion {
            signature_url: Some("https://provider.example.com/s/99.pdf".to_string()),
            signer_ip: Some("198.51.100.4".to_string()),
            signer_user_agent: None,
            completed_at: at(12),
        };

        let mut pending = document(DocumentStatus::Pending, false);
        apply_transition(
            &mut pending,
            DocumentTransition::ProviderCompleted(completion.clone()),
            at(13),
        )
        .expect("completes");
        assert_eq!(pending.status, DocumentStatus::Signed);
        assert_eq!(pending.signed_at, Some(at(12)));

        let mut already = signed(false);
        let before = already.clone();
        assert_eq!(
            apply_transition(
                &mut already,
                DocumentTransition::ProviderCompleted(completion),
                at(13)
            ),
            Ok(TransitionOutcome::Unchanged)
        );
        assert_eq!(already, before);
    }

    #[test]
    fn submission_completion_is_idempotent() {
        let mut doc = document(DocumentStatus::Viewed, false);
        let first = apply_transition(
            &mut doc,
            DocumentTransition::SubmissionCompleted { completed_at: at(12) },
            at(12),
        );
        let snapshot = doc.clone();
        let second = apply_transition(
            &mut doc,
            DocumentTransition::SubmissionCompleted { completed_at: at(14) },
            at(14),
        );

        assert_eq!(first, Ok(TransitionOutcome::Applied));
        assert_eq!(second, Ok(TransitionOutcome::Unchanged));
        assert_eq!(doc, snapshot);
    }

    #[test]
    fn aggregate_follows_signed_and_notary_state() {
        let pending = document(DocumentStatus::Pending, false);

        assert_eq!(
            aggregate_case_status(&[signed(false), signed(false)]),
            CaseStatus::Submitted
        );
        assert_eq!(
            aggregate_case_status(&[signed(false), signed(true)]),
            CaseStatus::Notarization
        );
        assert_eq!(
            aggregate_case_status(&[signed(false), pending]),
            CaseStatus::Signing
        );

        let mut notarized = signed(true);
        notarized.notarized_at = Some(at(10));
        assert_eq!(
            aggregate_case_status(&[signed(false), notarized]),
            CaseStatus::Submitted
        );
    }

    #[test]
    fn printed_documents_count_as_signed() {
        let mut printed = document(DocumentStatus::Pending, false);
        apply_transition(&mut printed, DocumentTransition::MarkPrinted, at(9)).expect("prints");
        assert_eq!(
            aggregate_case_status(&[printed, signed(false)]),
            CaseStatus::Submitted
        );
    }
}
