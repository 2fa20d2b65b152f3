use super::common::*;
use serde_json::json;

use crate::workflows::recovery::domain::{Actor, CaseStatus, DocumentId, DocumentStatus};
use crate::workflows::recovery::service::{IntakeSubmission, SendForSigningRequest};
use crate::workflows::recovery::signing::SignatureCapture;
use crate::workflows::recovery::webhook::SigningEvent;

fn event(payload: serde_json::Value) -> SigningEvent {
    SigningEvent::from_value(&payload).expect("well-formed payload")
}

async fn sent_heir_case() -> (
    crate::workflows::recovery::RecoveryCaseService<MemoryRepository, ScriptedProvider>,
    std::sync::Arc<MemoryRepository>,
    Vec<(DocumentId, String, String)>,
) {
    let (service, repository, _) = build_service();
    let created = service
        .create_case(
            IntakeSubmission {
                questionnaire: heir_questionnaire(),
            },
            &Actor::Anonymous,
        )
        .expect("case created");

    let mut sent = Vec::new();
    for document in &created.documents {
        let document = service
            .send_for_signing(&document.id, SendForSigningRequest::default(), &Actor::System)
            .await
            .expect("sent");
        let remote = document.remote.expect("remote session");
        sent.push((document.id, remote.submission_id, remote.submitter_id));
    }
    (service, repository, sent)
}

#[tokio::test]
async fn form_viewed_marks_sent_documents_viewed_only() {
    let (service, _, sent) = sent_heir_case().await;
    let (document_id, _, submitter_id) = &sent[0];

    let outcome = service
        .handle_signing_event(event(json!({
            "event_type": "form.viewed",
            "timestamp": "2026-05-01T10:00:00Z",
            "data": { "id": submitter_id }
        })))
        .expect("handled");
    assert!(outcome.handled);
    assert_eq!(outcome.documents_updated, 1);
    assert_eq!(
        service.get_document(document_id).expect("document").status,
        DocumentStatus::Viewed
    );

    let (other_id, _, other_submitter) = &sent[1];
    service
        .sign(
            other_id,
            SignatureCapture {
                signature_url: Some("https://files.example.com/s.png".to_string()),
                ..SignatureCapture::default()
            },
            &Actor::Anonymous,
        )
        .expect("signed directly");
    let outcome = service
        .handle_signing_event(event(json!({
            "event_type": "form.viewed",
            "timestamp": "2026-05-01T10:05:00Z",
            "data": { "id": other_submitter }
        })))
        .expect("handled");
    assert_eq!(outcome.documents_updated, 0);
    assert_eq!(
        service.get_document(other_id).expect("document").status,
        DocumentStatus::Signed
    );
}

#[tokio::test]
async fn form_completed_captures_provider_signature_once() {
    let (service, repository, sent) = sent_heir_case().await;
    let (document_id, submission_id, submitter_id) = &sent[0];
    let payload = json!({
        "event_type": "form.completed",
        "timestamp": "2026-05-01T11:00:00Z",
        "data": {
            "id": submitter_id,
            "submission_id": submission_id,
            "ip": "198.51.100.4",
            "ua": "Mozilla/5.0",
            "completed_at": "2026-05-01T10:59:00Z",
            "documents": [{ "url": "https://sign.example.com/d/fee.pdf" }]
        }
    });

    let outcome = service
        .handle_signing_event(event(payload.clone()))
        .expect("handled");
    assert_eq!(outcome.documents_updated, 1);

    let document = service.get_document(document_id).expect("document");
    assert_eq!(document.status, DocumentStatus::Signed);
    let signature = document.signature.clone().expect("signature captured");
    assert_eq!(signature.signer_ip.as_deref(), Some("198.51.100.4"));
    assert_eq!(
        signature.signature_url.as_deref(),
        Some("https://sign.example.com/d/fee.pdf")
    );

    let audit_before = repository.audit_len();
    let outcome = service.handle_signing_event(event(payload)).expect("handled");
    assert_eq!(outcome.documents_updated, 0);
    assert_eq!(repository.audit_len(), audit_before);
    assert_eq!(
        service.get_document(document_id).expect("document").signature,
        Some(signature)
    );
}

#[tokio::test]
async fn submission_completed_is_idempotent_and_reconciles_the_case() {
    let (service, repository, sent) = sent_heir_case().await;

    let mut case_id = None;
    for (document_id, submission_id, _) in &sent {
        let payload = json!({
            "event_type": "submission.completed",
            "timestamp": "2026-05-02T09:00:00Z",
            "data": { "id": submission_id }
        });
        let outcome = service
            .handle_signing_event(event(payload.clone()))
            .expect("handled");
        assert_eq!(outcome.documents_updated, 1);

        let writes = repository.document_writes();
        let audit = repository.audit_len();
        let repeat = service.handle_signing_event(event(payload)).expect("handled");
        assert!(repeat.handled);
        assert_eq!(repeat.documents_updated, 0);
        assert_eq!(repository.document_writes(), writes);
        assert_eq!(repository.audit_len(), audit);

        let document = service.get_document(document_id).expect("document");
        assert_eq!(document.status, DocumentStatus::Signed);
        case_id = document.case_id;
    }

    let overview = service
        .get_case(&case_id.expect("case bound"))
        .expect("case");
    assert_eq!(overview.case.status, CaseStatus::Notarization);
}

#[tokio::test]
async fn unmatched_and_unknown_events_are_acknowledged_but_unhandled() {
    let (service, _, _) = sent_heir_case().await;

    let outcome = service
        .handle_signing_event(event(json!({
            "event_type": "form.completed",
            "timestamp": "2026-05-01T11:00:00Z",
            "data": { "id": 424242 }
        })))
        .expect("handled");
    assert!(!outcome.handled);
    assert_eq!(outcome.documents_updated, 0);

    let outcome = service
        .handle_signing_event(event(json!({ "event_type": "template.updated" })))
        .expect("handled");
    assert!(!outcome.handled);
    assert_eq!(outcome.event_type, "template.updated");
}
