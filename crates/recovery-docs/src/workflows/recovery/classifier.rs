use serde_json::Value;

use super::domain::CaseType;
use super::questionnaire::IntakeQuestionnaire;

/// States whose surplus-fund claims must be filed through an attorney, as (code, name).
pub const ATTORNEY_REQUIRED_STATES: [(&str, &str); 2] = [("FL", "florida"), ("GA", "georgia")];

/// Map a questionnaire snapshot to exactly one case type. First matching rule wins.
pub fn classify(snapshot: &Value) -> CaseType {
    classify_questionnaire(&IntakeQuestionnaire::new(snapshot))
}

pub fn classify_questionnaire(questionnaire: &IntakeQuestionnaire<'_>) -> CaseType {
    if questionnaire.is_heir() {
        // Only an explicit "no open estate" routes to pre-estate; unanswered stays heir.
        return match questionnaire.estate_open() {
            Some(false) => CaseType::PreEstate,
            _ => CaseType::Heir,
        };
    }

    match questionnaire.property_state() {
        Some(state) if requires_attorney(&state) => CaseType::AttorneyRequired,
        _ => CaseType::Standard,
    }
}

pub fn requires_attorney(state: &str) -> bool {
    let state = state.trim();
    ATTORNEY_REQUIRED_STATES
        .iter()
        .any(|(code, name)| state.eq_ignore_ascii_case(code) || state.eq_ignore_ascii_case(name))
}
