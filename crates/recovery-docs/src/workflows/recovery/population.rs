use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::questionnaire::IntakeQuestionnaire;

const SIGNING_DATE_FORMAT: &str = "%m/%d/%Y";

/// Well-known template field identifiers the engine can fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    ClientName,
    ClientAddress,
    ClientPhone,
    ClientEmail,
    PropertyAddress,
    County,
    State,
    ParcelNumber,
    DeceasedName,
    Relationship,
    DateOfDeath,
    ForeclosureType,
    SigningDate,
    RoleText,
    CaseNumber,
}

impl FieldSource {
    /// Resolve a template field identifier, tolerant of case and separator style.
    pub fn for_identifier(identifier: &str) -> Option<Self> {
        let source = match normalize_identifier(identifier).as_str() {
            "client_name" | "claimant_name" | "full_name" | "heir_name" | "owner_name"
            | "printed_name" => FieldSource::ClientName,
            "client_address" | "mailing_address" | "address" => FieldSource::ClientAddress,
            "client_phone" | "phone" | "phone_number" => FieldSource::ClientPhone,
            "client_email" | "email" => FieldSource::ClientEmail,
            "property_address" | "property" => FieldSource::PropertyAddress,
            "county" | "property_county" => FieldSource::County,
            "state" | "property_state" => FieldSource::State,
            "parcel_number" | "parcel_id" | "apn" => FieldSource::ParcelNumber,
            "deceased_name" | "deceased_owner_name" | "decedent_name" => {
                FieldSource::DeceasedName
            }
            "relationship" | "relationship_to_deceased" => FieldSource::Relationship,
            "date_of_death" | "deceased_date_of_death" => FieldSource::DateOfDeath,
            "foreclosure_type" => FieldSource::ForeclosureType,
            "signing_date" | "date" | "date_signed" => FieldSource::SigningDate,
            "role" | "claimant_role" | "capacity" => FieldSource::RoleText,
            "case_number" | "file_number" => FieldSource::CaseNumber,
            _ => return None,
        };
        Some(source)
    }
}

/// Inputs the engine draws values from. Everything is borrowed; nothing is persisted here.
#[derive(Debug, Clone, Copy)]
pub struct PopulationContext<'a> {
    pub questionnaire: IntakeQuestionnaire<'a>,
    pub case_number: Option<&'a str>,
    pub signing_date: NaiveDate,
}

impl<'a> PopulationContext<'a> {
    fn value_for(&self, source: FieldSource) -> Option<String> {
        let q = &self.questionnaire;
        match source {
            FieldSource::ClientName => q.client_name(),
            FieldSource::ClientAddress => q.mailing_address(),
            FieldSource::ClientPhone => q.client_phone(),
            FieldSource::ClientEmail => q.client_email(),
            FieldSource::PropertyAddress => q.property_address(),
            FieldSource::County => q.property_county(),
            FieldSource::State => q.property_state(),
            FieldSource::ParcelNumber => q.parcel_number(),
            FieldSource::DeceasedName => q.deceased_name(),
            FieldSource::Relationship => q.relationship(),
            FieldSource::DateOfDeath => q.date_of_death(),
            FieldSource::ForeclosureType => q.foreclosure_type(),
            FieldSource::SigningDate => {
                Some(self.signing_date.format(SIGNING_DATE_FORMAT).to_string())
            }
            FieldSource::RoleText => Some(self.role_text()),
            FieldSource::CaseNumber => self.case_number.map(str::to_string),
        }
    }

    fn role_text(&self) -> String {
        let q = &self.questionnaire;
        if !q.is_heir() {
            return "Owner of record".to_string();
        }
        match (q.relationship(), q.deceased_name()) {
            (Some(relationship), Some(deceased)) => {
                format!("Heir ({relationship}) of {deceased}, deceased owner of record")
            }
            (None, Some(deceased)) => format!("Heir of {deceased}, deceased owner of record"),
            _ => "Heir of the deceased owner of record".to_string(),
        }
    }
}

/// Produce values for every declared field with a known source. Unknown identifiers and
/// absent answers are left unset.
pub fn populate<S: AsRef<str>>(
    declared_fields: &[S],
    context: &PopulationContext<'_>,
) -> BTreeMap<String, String> {
    declared_fields
        .iter()
        .filter_map(|field| {
            let field = field.as_ref();
            let source = FieldSource::for_identifier(field)?;
            let value = context.value_for(source)?;
            Some((field.to_string(), value))
        })
        .collect()
}

/// Merge freshly computed defaults into keys that are absent. A present key is never touched,
/// even when an edit left it blank. Returns the number of keys added.
pub fn merge_defaults(
    existing: &mut BTreeMap<String, String>,
    defaults: BTreeMap<String, String>,
) -> usize {
    let mut added = 0;
    for (key, value) in defaults {
        if let Entry::Vacant(slot) = existing.entry(key) {
            slot.insert(value);
            added += 1;
        }
    }
    added
}

/// `Client Name`, `client-name`, and `clientName` all normalise to `client_name`.
pub fn normalize_identifier(identifier: &str) -> String {
    let mut normalized = String::with_capacity(identifier.len() + 4);
    let mut previous_lower = false;
    for ch in identifier.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if ch.is_ascii_uppercase() && previous_lower {
                normalized.push('_');
            }
            previous_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
            normalized.push(ch.to_ascii_lowercase());
        } else {
            if !normalized.ends_with('_') && !normalized.is_empty() {
                normalized.push('_');
            }
            previous_lower = false;
        }
    }
    while normalized.ends_with('_') {
        normalized.pop();
    }
    normalized
}
