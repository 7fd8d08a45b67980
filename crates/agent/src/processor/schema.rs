//! JSON shapes the LLM is asked to fill in. Each one is paired with a
//! `schema_hint()` string fed to [`llm_client::LlmRequest::schema_hint`] so
//! the model sees the exact field names and value vocabulary it must use.

use serde::{Deserialize, Serialize};

use recruiting_common::state_machine::DialogueState;

/// Main per-turn response (§4.2 step 7): `{response_text, new_state,
/// extracted_data}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorOutput {
    pub response_text: String,
    pub new_state: DialogueState,
    #[serde(default)]
    pub extracted_data: ExtractedData,
}

impl ProcessorOutput {
    pub fn schema_hint() -> &'static str {
        r#"{
  "response_text": "string, the reply to send the candidate (may be empty)",
  "new_state": "one of the dialogue state names, snake_case",
  "extracted_data": {
    "phone_number": "string or null",
    "citizenship": "string or null",
    "age": "integer or null",
    "city": "string or null",
    "readiness_to_start": "string or null",
    "interview_date": "string YYYY-MM-DD or null",
    "interview_time": "string HH:MM or null"
  }
}"#
    }
}

/// Fields the main LLM call may populate on the candidate (§4.2 step 7:
/// "Update Candidate fields from extracted_data when the dialogue is not
/// yet qualified"). All optional since most turns fill in only one or two.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedData {
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub citizenship: Option<String>,
    #[serde(default)]
    pub age: Option<i16>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub readiness_to_start: Option<String>,
    #[serde(default)]
    pub interview_date: Option<String>,
    #[serde(default)]
    pub interview_time: Option<String>,
}

/// Citizenship subflow classification (§4.2 step 3). `is` is a reserved
/// word in several languages this prompt is translated against, so the
/// field is renamed in the wire form rather than the Rust identifier.
#[derive(Debug, Clone, Deserialize)]
pub struct CitizenshipClassification {
    #[serde(rename = "is")]
    pub is_acceptable: YesNoAnswer,
    #[serde(default)]
    pub citizenship: Option<String>,
}

impl CitizenshipClassification {
    pub fn schema_hint() -> &'static str {
        r#"{"is": "yes" | "no", "citizenship": "EAEU" | "rvp rf" | "vnzh rf" | "<country name>" | null}"#
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YesNoAnswer {
    Yes,
    No,
}

impl YesNoAnswer {
    pub fn is_yes(self) -> bool {
        self == YesNoAnswer::Yes
    }
}

/// Minimal verification call for a candidate-declined signal (§4.2 step 8:
/// "did the candidate really decline?").
#[derive(Debug, Clone, Deserialize)]
pub struct DeclineVerification {
    pub declined: YesNoAnswer,
}

impl DeclineVerification {
    pub fn schema_hint() -> &'static str {
        r#"{"declined": "yes" | "no"}"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_processor_output_with_partial_extracted_data() {
        let raw = r#"{
            "response_text": "Thanks!",
            "new_state": "awaiting_phone",
            "extracted_data": {"age": 25}
        }"#;
        let parsed: ProcessorOutput = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.new_state, DialogueState::AwaitingPhone);
        assert_eq!(parsed.extracted_data.age, Some(25));
        assert!(parsed.extracted_data.phone_number.is_none());
    }

    #[test]
    fn parses_citizenship_classification_is_field() {
        let raw = r#"{"is": "yes", "citizenship": "EAEU"}"#;
        let parsed: CitizenshipClassification = serde_json::from_str(raw).unwrap();
        assert!(parsed.is_acceptable.is_yes());
        assert_eq!(parsed.citizenship.as_deref(), Some("EAEU"));
    }
}
