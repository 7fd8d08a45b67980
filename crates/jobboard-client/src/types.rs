use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Vacancy {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub area: Option<Area>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Area {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NegotiationsPage {
    pub items: Vec<Negotiation>,
    #[serde(default)]
    pub pages: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Negotiation {
    pub id: String,
    pub vacancy_id: Option<String>,
    pub messages_url: Option<String>,
    pub resume_id: Option<String>,
    pub updated_at: Option<String>,
    pub created_at: Option<String>,
    #[serde(default)]
    pub employer_state: Option<EmployerState>,
}

/// Current folder the response sits in, as the board's own `employer_state.id`
/// (`"response"`, `"consider"`, `"interview"`, `"assessment"`, ...). Used by
/// the dojim loop to confirm a human hasn't moved the candidate manually.
#[derive(Debug, Clone, Deserialize)]
pub struct EmployerState {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesPage {
    pub items: Vec<Message>,
    #[serde(default)]
    pub pages: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub author: MessageAuthor,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageAuthor {
    pub participant_type: String,
}
