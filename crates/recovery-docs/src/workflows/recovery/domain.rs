use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier wrapper for recovery cases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaseId(pub String);

/// Identifier wrapper for case-bound and ad-hoc documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditEntryId(pub String);

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static AUDIT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Legally distinct document bundles a claim can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseType {
    Standard,
    Heir,
    AttorneyRequired,
    PreEstate,
}

impl CaseType {
    pub const ALL: [CaseType; 4] = [
        CaseType::Standard,
        CaseType::Heir,
        CaseType::AttorneyRequired,
        CaseType::PreEstate,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            CaseType::Standard => "standard",
            CaseType::Heir => "heir",
            CaseType::AttorneyRequired => "attorney_required",
            CaseType::PreEstate => "pre_estate",
        }
    }
}

/// Aggregate case status derived from the owned documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    DocumentsPending,
    Signing,
    Notarization,
    Submitted,
}

impl CaseStatus {
    pub const fn label(self) -> &'static str {
        match self {
            CaseStatus::DocumentsPending => "documents_pending",
            CaseStatus::Signing => "signing",
            CaseStatus::Notarization => "notarization",
            CaseStatus::Submitted => "submitted",
        }
    }
}

/// Primary lifecycle state of a single document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    SentForSigning,
    Viewed,
    Signed,
    Printed,
}

impl DocumentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::SentForSigning => "sent_for_signing",
            DocumentStatus::Viewed => "viewed",
            DocumentStatus::Signed => "signed",
            DocumentStatus::Printed => "printed",
        }
    }

    /// Printed documents count as signed for case aggregation.
    pub const fn is_signed(self) -> bool {
        matches!(self, DocumentStatus::Signed | DocumentStatus::Printed)
    }
}

/// Functional grouping used to organise the signing queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentGroup {
    Agreements,
    Authorization,
    Notary,
    Administrative,
}

/// Descriptive inclusion tag carried by a descriptor. List membership already encodes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorCondition {
    Always,
    HeirOnly,
    PreEstateOnly,
    AttorneyOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub mailing_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PropertyDetails {
    pub address: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub parcel_number: Option<String>,
}

/// One client's recovery claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: CaseId,
    pub case_number: String,
    pub case_type: CaseType,
    pub client: ClientIdentity,
    pub property: PropertyDetails,
    pub questionnaire: Value,
    pub status: CaseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Captured once per document; never overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureMetadata {
    pub signature_url: Option<String>,
    pub signer_ip: Option<String>,
    pub signer_user_agent: Option<String>,
    pub consent_at: DateTime<Utc>,
    pub consent_text: String,
}

/// Identifiers of the provider-hosted signing session bound to a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSession {
    pub submission_id: String,
    pub submitter_id: String,
    pub signing_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub case_id: Option<CaseId>,
    pub template_ref: String,
    pub title: String,
    pub description: Option<String>,
    pub group: Option<DocumentGroup>,
    pub notary_required: bool,
    pub priority: u16,
    pub fields: BTreeMap<String, String>,
    pub status: DocumentStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub signed_at: Option<DateTime<Utc>>,
    pub notarized_at: Option<DateTime<Utc>>,
    pub printed_at: Option<DateTime<Utc>>,
    pub mailed_at: Option<DateTime<Utc>>,
    pub tracking_number: Option<String>,
    pub signature: Option<SignatureMetadata>,
    pub remote: Option<RemoteSession>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    pub fn is_signed(&self) -> bool {
        self.status.is_signed()
    }

    pub fn awaiting_notary(&self) -> bool {
        self.notary_required && self.notarized_at.is_none()
    }

    /// True once any signature has been captured, whether directly or via the provider.
    pub fn has_signature(&self) -> bool {
        self.signed_at.is_some() || self.signature.is_some()
    }
}

/// Who performed a state-changing action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Agent(String),
    Anonymous,
    System,
}

impl Actor {
    pub fn label(&self) -> &str {
        match self {
            Actor::Agent(email) => email.as_str(),
            Actor::Anonymous => "anonymous",
            Actor::System => "system",
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Immutable record of an action taken on a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub document_id: DocumentId,
    pub case_id: Option<CaseId>,
    pub action: String,
    pub actor: String,
    pub recorded_at: DateTime<Utc>,
    pub details: Value,
}

impl AuditEntry {
    pub fn new(
        document: &DocumentRecord,
        action: &str,
        actor: &Actor,
        recorded_at: DateTime<Utc>,
        details: Value,
    ) -> Self {
        let sequence = AUDIT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self {
            id: AuditEntryId(format!("audit-{sequence:08}")),
            document_id: document.id.clone(),
            case_id: document.case_id.clone(),
            action: action.to_string(),
            actor: actor.label().to_string(),
            recorded_at,
            details,
        }
    }
}
