use crate::infra::{InMemoryCaseRepository, LoopbackSigningProvider};
use clap::Args;
use recovery_docs::error::AppError;
use recovery_docs::workflows::recovery::descriptors::resolve;
use recovery_docs::workflows::recovery::{
    classify, write_audit_csv, Actor, DocumentRecord, DocumentStatus, IntakeSubmission,
    RecoveryCaseService, RecoveryServiceError, SendForSigningRequest, SignatureCapture,
    SigningEvent,
};
use serde_json::{json, Value};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Treat the claimant as an heir of the deceased owner of record
    #[arg(long)]
    pub(crate) heir: bool,
    /// For heirs: a probate estate has been opened
    #[arg(long)]
    pub(crate) estate_open: bool,
    /// Two-letter state of the foreclosed property
    #[arg(long, default_value = "TX")]
    pub(crate) state: String,
    /// Write the resulting audit trail as CSV to this path
    #[arg(long)]
    pub(crate) audit_csv: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct ClassifyArgs {
    /// Path to a questionnaire JSON document
    #[arg(long)]
    pub(crate) questionnaire: PathBuf,
}

pub(crate) fn run_classify(args: ClassifyArgs) -> Result<(), AppError> {
    let file = File::open(&args.questionnaire)?;
    let snapshot: Value = serde_json::from_reader(file).map_err(std::io::Error::from)?;

    let case_type = classify(&snapshot);
    println!("Case type: {}", case_type.label());
    println!("Required documents:");
    for descriptor in resolve(case_type) {
        println!(
            "  {:>2}. {}{}",
            descriptor.priority,
            descriptor.title,
            if descriptor.notary_required {
                " (notarized)"
            } else {
                ""
            }
        );
    }
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        heir,
        estate_open,
        state,
        audit_csv,
    } = args;

    println!("Recovery document demo");
    let repository = Arc::new(InMemoryCaseRepository::default());
    let provider = Arc::new(LoopbackSigningProvider::default());
    let service = RecoveryCaseService::new(repository.clone(), provider.clone());
    let agent = Actor::Agent("demo.agent@recovery.local".to_string());

    let created = service.create_case(
        IntakeSubmission {
            questionnaire: demo_questionnaire(heir, estate_open, &state),
        },
        &agent,
    )?;
    println!(
        "- Opened case {} ({}) for {}",
        created.case.case_number,
        created.case.case_type.label(),
        created.case.client.full_name
    );
    for document in &created.documents {
        println!(
            "  - [{}] {} | {} fields prefilled{}",
            document.priority,
            document.title,
            document.fields.len(),
            if document.notary_required {
                " | notary"
            } else {
                ""
            }
        );
    }

    let mut queue = created.documents.iter();

    if let Some(document) = queue.next() {
        println!("\nRemote signing via webhook");
        let sent = service
            .send_for_signing(&document.id, SendForSigningRequest::default(), &agent)
            .await?;
        report(&sent);
        let submitter_id = sent
            .remote
            .as_ref()
            .map(|remote| remote.submitter_id.clone())
            .unwrap_or_default();
        for payload in [
            json!({
                "event_type": "form.viewed",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "data": { "id": submitter_id }
            }),
            json!({
                "event_type": "form.completed",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "data": { "id": submitter_id, "ip": "198.51.100.24", "ua": "demo-browser" }
            }),
        ] {
            match SigningEvent::from_value(&payload) {
                Ok(event) => {
                    let outcome = service.handle_signing_event(event)?;
                    println!(
                        "  webhook {} -> {} document(s) updated",
                        outcome.event_type, outcome.documents_updated
                    );
                }
                Err(err) => println!("  webhook rejected: {err}"),
            }
        }
        report(&service.get_document(&document.id)?);
    }

    if let Some(document) = queue.next() {
        println!("\nRemote signing via session refresh");
        let sent = service
            .send_for_signing(&document.id, SendForSigningRequest::default(), &agent)
            .await?;
        if let Some(remote) = &sent.remote {
            provider
                .complete(&remote.submission_id)
                .map_err(RecoveryServiceError::from)?;
        }
        report(
            &service
                .refresh_signing_session(&document.id, &agent)
                .await?,
        );
    }

    println!("\nIn-person signatures");
    for document in queue {
        let signed = service.sign(
            &document.id,
            SignatureCapture {
                signature_url: Some(format!(
                    "https://files.recovery.local/signatures/{}.png",
                    document.id
                )),
                signer_ip: Some("203.0.113.10".to_string()),
                signer_user_agent: Some("kiosk".to_string()),
            },
            &agent,
        )?;
        report(&signed);
    }

    let overview = service.get_case(&created.case.id)?;
    println!("- Case status after signing: {}", overview.case.status.label());

    let awaiting: Vec<&DocumentRecord> = overview.outstanding().collect();
    println!("- {} document(s) outstanding", awaiting.len());
    if !awaiting.is_empty() {
        println!("\nNotarization and mailing");
        for (index, document) in awaiting.into_iter().enumerate() {
            service.notarize(&document.id, &agent)?;
            let mailed = service.mark_mailed(
                &document.id,
                format!("9400 1118 9956 {:04}", index + 1),
                &agent,
            )?;
            println!(
                "  - {} notarized, mailed with tracking {}",
                mailed.title,
                mailed.tracking_number.as_deref().unwrap_or("-")
            );
        }
    }

    let overview = service.get_case(&created.case.id)?;
    println!("- Final case status: {}", overview.case.status.label());

    let entries = repository
        .all_audit_entries()
        .map_err(RecoveryServiceError::from)?;
    println!("- {} audit entries recorded", entries.len());
    if let Some(path) = audit_csv {
        let writer = BufWriter::new(File::create(&path)?);
        let rows = write_audit_csv(&entries, writer)?;
        println!("- Audit trail written to {} ({rows} rows)", path.display());
    }

    Ok(())
}

fn report(document: &DocumentRecord) {
    let status = match document.status {
        DocumentStatus::Signed | DocumentStatus::Printed => {
            let source = document
                .signature
                .as_ref()
                .and_then(|signature| signature.signer_user_agent.as_deref())
                .unwrap_or("remote");
            format!("{} ({source})", document.status.label())
        }
        other => other.label().to_string(),
    };
    println!("  - {}: {}", document.title, status);
}

fn demo_questionnaire(heir: bool, estate_open: bool, state: &str) -> Value {
    let mut questionnaire = json!({
        "personalInfo": {
            "firstName": "Jordan",
            "lastName": "Ellis",
            "email": "jordan.ellis@example.com",
            "phone": "555-0100",
            "address": "410 Oak Street",
            "city": "Springfield",
            "state": state,
            "zip": "00000"
        },
        "propertyInfo": {
            "address": "22 Harbor Lane",
            "city": "Springfield",
            "state": state,
            "county": "Greene",
            "parcelNumber": "14-220-007",
            "foreclosureType": "tax"
        },
        "ownership": { "isHeir": heir }
    });

    if heir {
        questionnaire["ownership"]["isEstateOpen"] = Value::Bool(estate_open);
        questionnaire["deceasedOwner"] = json!({
            "name": "Pat Ellis",
            "relationship": "child",
            "dateOfDeath": "2024-02-11"
        });
    }
    questionnaire
}

#[cfg(test)]
mod tests {
    use super::*;
    use recovery_docs::workflows::recovery::CaseType;

    #[test]
    fn demo_questionnaire_covers_every_branch() {
        assert_eq!(
            classify(&demo_questionnaire(false, false, "TX")),
            CaseType::Standard
        );
        assert_eq!(
            classify(&demo_questionnaire(false, false, "GA")),
            CaseType::AttorneyRequired
        );
        assert_eq!(
            classify(&demo_questionnaire(true, true, "FL")),
            CaseType::Heir
        );
        assert_eq!(
            classify(&demo_questionnaire(true, false, "TX")),
            CaseType::PreEstate
        );
    }

    #[tokio::test]
    async fn demo_runs_to_completion_and_writes_audit_csv() {
        let path = std::env::temp_dir().join(format!(
            "recovery-demo-{}.csv",
            uuid::Uuid::new_v4().simple()
        ));
        run_demo(DemoArgs {
            heir: true,
            estate_open: false,
            state: "TX".to_string(),
            audit_csv: Some(path.clone()),
        })
        .await
        .expect("demo runs");

        let csv = std::fs::read_to_string(&path).expect("csv written");
        assert!(csv.starts_with("recorded_at,case_id,document_id,action,actor,details"));
        assert!(csv.contains("webhook.form_completed"));
        std::fs::remove_file(path).ok();
    }
}
