use std::io::Write;

use serde::Serialize;

use super::domain::AuditEntry;

#[derive(Debug, thiserror::Error)]
pub enum AuditExportError {
    #[error("failed to write audit CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush audit CSV: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct AuditRow<'a> {
    recorded_at: String,
    case_id: &'a str,
    document_id: &'a str,
    action: &'a str,
    actor: &'a str,
    details: String,
}

/// Write entries as CSV with a header row, oldest first. Returns the number of rows written.
pub fn write_audit_csv<W: Write>(
    entries: &[AuditEntry],
    writer: W,
) -> Result<usize, AuditExportError> {
    let mut ordered: Vec<&AuditEntry> = entries.iter().collect();
    ordered.sort_by_key(|entry| entry.recorded_at);

    let mut csv = csv::Writer::from_writer(writer);
    for entry in &ordered {
        csv.serialize(AuditRow {
            recorded_at: entry.recorded_at.to_rfc3339(),
            case_id: entry.case_id.as_ref().map(|id| id.0.as_str()).unwrap_or(""),
            document_id: &entry.document_id.0,
            action: &entry.action,
            actor: &entry.actor,
            details: entry.details.to_string(),
        })?;
    }
    csv.flush()?;
    Ok(ordered.len())
}
