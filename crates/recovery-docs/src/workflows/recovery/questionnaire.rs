//! Read-only view over the intake questionnaire snapshot.
//!
//! The snapshot is stored verbatim on the case. Only a handful of well-known nested sections
//! (`personalInfo`, `propertyInfo`, `deceasedOwner`, `ownership`) are ever consulted; wrong types
//! and missing keys read as absent rather than failing.

use serde_json::Value;

use super::domain::{ClientIdentity, PropertyDetails};

pub const PERSONAL_INFO: &str = "personalInfo";
pub const PROPERTY_INFO: &str = "propertyInfo";
pub const DECEASED_OWNER: &str = "deceasedOwner";
pub const OWNERSHIP: &str = "ownership";

/// Validation errors raised when a questionnaire cannot open a case.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntakeError {
    #[error("questionnaire must be a JSON object")]
    NotAnObject,
    #[error("questionnaire is missing the client's name (personalInfo.firstName/lastName or fullName)")]
    MissingClientName,
}

#[derive(Debug, Clone, Copy)]
pub struct IntakeQuestionnaire<'a> {
    raw: &'a Value,
}

impl<'a> IntakeQuestionnaire<'a> {
    pub fn new(raw: &'a Value) -> Self {
        Self { raw }
    }

    /// Check the minimum needed to open a case: an object with a client name.
    pub fn validate(&self) -> Result<(), IntakeError> {
        if !self.raw.is_object() {
            return Err(IntakeError::NotAnObject);
        }
        if self.client_name().is_none() {
            return Err(IntakeError::MissingClientName);
        }
        Ok(())
    }

    pub fn raw(&self) -> &'a Value {
        self.raw
    }

    /// Text value at `section.key`; numbers are rendered, blanks read as absent.
    pub fn text(&self, section: &str, key: &str) -> Option<String> {
        self.raw.get(section).and_then(|s| s.get(key)).and_then(as_text)
    }

    /// First text value found across `(section, key)` candidates. An empty section reads the
    /// top level of the snapshot.
    fn first_text(&self, candidates: &[(&str, &str)]) -> Option<String> {
        candidates.iter().find_map(|(section, key)| {
            let node = if section.is_empty() {
                self.raw.get(key)
            } else {
                self.raw.get(section).and_then(|s| s.get(key))
            };
            node.and_then(as_text)
        })
    }

    fn first_flag(&self, candidates: &[(&str, &str)]) -> Option<bool> {
        candidates.iter().find_map(|(section, key)| {
            let node = if section.is_empty() {
                self.raw.get(key)
            } else {
                self.raw.get(section).and_then(|s| s.get(key))
            };
            node.and_then(as_flag)
        })
    }

    pub fn is_heir(&self) -> bool {
        self.first_flag(&[(OWNERSHIP, "isHeir"), (DECEASED_OWNER, "isHeir"), ("", "isHeir")])
            .unwrap_or(false)
    }

    /// `None` when the questionnaire never answered the question.
    pub fn estate_open(&self) -> Option<bool> {
        self.first_flag(&[
            (OWNERSHIP, "isEstateOpen"),
            (DECEASED_OWNER, "isEstateOpen"),
            ("", "isEstateOpen"),
        ])
    }

    pub fn property_state(&self) -> Option<String> {
        self.first_text(&[(PROPERTY_INFO, "state"), ("", "propertyState")])
    }

    pub fn client_name(&self) -> Option<String> {
        if let Some(full) = self.text(PERSONAL_INFO, "fullName") {
            return Some(full);
        }
        join_non_empty(
            &[
                self.text(PERSONAL_INFO, "firstName"),
                self.text(PERSONAL_INFO, "lastName"),
            ],
            " ",
        )
    }

    pub fn client_email(&self) -> Option<String> {
        self.text(PERSONAL_INFO, "email")
    }

    pub fn client_phone(&self) -> Option<String> {
        self.text(PERSONAL_INFO, "phone")
    }

    pub fn mailing_address(&self) -> Option<String> {
        self.address_of(PERSONAL_INFO)
    }

    pub fn property_address(&self) -> Option<String> {
        self.address_of(PROPERTY_INFO)
    }

    pub fn property_county(&self) -> Option<String> {
        self.text(PROPERTY_INFO, "county")
    }

    pub fn parcel_number(&self) -> Option<String> {
        self.text(PROPERTY_INFO, "parcelNumber")
    }

    pub fn foreclosure_type(&self) -> Option<String> {
        self.text(PROPERTY_INFO, "foreclosureType")
    }

    pub fn deceased_name(&self) -> Option<String> {
        if let Some(name) = self.text(DECEASED_OWNER, "name") {
            return Some(name);
        }
        join_non_empty(
            &[
                self.text(DECEASED_OWNER, "firstName"),
                self.text(DECEASED_OWNER, "lastName"),
            ],
            " ",
        )
    }

    pub fn relationship(&self) -> Option<String> {
        self.text(DECEASED_OWNER, "relationship")
    }

    pub fn date_of_death(&self) -> Option<String> {
        self.text(DECEASED_OWNER, "dateOfDeath")
    }

    pub fn client_identity(&self) -> ClientIdentity {
        ClientIdentity {
            full_name: self.client_name().unwrap_or_default(),
            email: self.client_email(),
            phone: self.client_phone(),
            mailing_address: self.mailing_address(),
        }
    }

    pub fn property_details(&self) -> PropertyDetails {
        PropertyDetails {
            address: self.property_address(),
            county: self.property_county(),
            state: self.property_state(),
            parcel_number: self.parcel_number(),
        }
    }

    /// `street, city, ST zip` from whichever parts are present.
    fn address_of(&self, section: &str) -> Option<String> {
        let region = join_non_empty(
            &[self.text(section, "state"), self.text(section, "zip")],
            " ",
        );
        join_non_empty(
            &[
                self.text(section, "address"),
                self.text(section, "city"),
                region,
            ],
            ", ",
        )
    }
}

fn as_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(n) => n.as_i64().and_then(|n| match n {
            1 => Some(true),
            0 => Some(false),
            _ => None,
        }),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn join_non_empty(parts: &[Option<String>], separator: &str) -> Option<String> {
    let present: Vec<&str> = parts.iter().flatten().map(String::as_str).collect();
    if present.is_empty() {
        None
    } else {
        Some(present.join(separator))
    }
}
