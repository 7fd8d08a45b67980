//! Dialogue — the stateful conversation between the agent and a candidate
//! against one vacancy. Holds the full transcript as JSON rather than a
//! child table: the processor only ever reads/writes one dialogue's history
//! per tick, so there is no query pattern that benefits from normalizing it.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use crate::id::{CandidateId, DialogueId, RecruiterId, VacancyId};
use crate::record::Record;
use crate::state_machine::{DialogueState, DialogueStatus};

/// A history entry capped at 150 per dialogue (§3 invariant); oldest
/// entries are dropped from the front once the cap is exceeded.
pub const HISTORY_CAP: usize = 150;

/// Synthetic entries that tell the next turn of the LLM to take a specific
/// action rather than respond conversationally (§9 Design Notes). Never a
/// side channel: these are ordinary `pending_messages`/`history` entries
/// whose content happens to start with this prefix.
pub const SYSTEM_COMMAND_PREFIX: &str = "[SYSTEM COMMAND]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn glyph(self) -> &'static str {
        match self {
            Role::User => "🙂",
            Role::Assistant => "🤖",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub message_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp_local: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub extracted_data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub state: Option<DialogueState>,
}

impl HistoryEntry {
    pub fn is_system_command(&self) -> bool {
        self.content.starts_with(SYSTEM_COMMAND_PREFIX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingMessage {
    pub message_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp_local: DateTime<Utc>,
}

impl PendingMessage {
    pub fn synthetic_command(content: impl Into<String>) -> Self {
        Self {
            message_id: uuid::Uuid::now_v7().to_string(),
            role: Role::User,
            content: format!("{SYSTEM_COMMAND_PREFIX} {}", content.into()),
            timestamp_local: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DialogueRow {
    pub id: DialogueId,
    pub external_response_id: String,
    pub candidate_id: CandidateId,
    pub vacancy_id: VacancyId,
    pub recruiter_id: RecruiterId,
    pub status: DialogueStatus,
    pub dialogue_state: DialogueState,
    pub reminder_level: i16,
    pub history: sqlx::types::Json<Vec<HistoryEntry>>,
    pub pending_messages: sqlx::types::Json<Vec<PendingMessage>>,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub response_created_at: DateTime<Utc>,
    pub interview_datetime_utc: Option<DateTime<Utc>>,
    pub total_prompt_tokens: i64,
    pub total_completion_tokens: i64,
    pub total_cached_tokens: i64,
    pub total_cost: Decimal,
}

#[async_trait::async_trait]
impl Record for DialogueRow {
    const TABLE: &'static str = "dialogues";
    type Id = DialogueId;

    async fn find_by_id(id: Self::Id, db: &PgPool) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, external_response_id, candidate_id, vacancy_id, recruiter_id,
                   status, dialogue_state, reminder_level, history, pending_messages,
                   last_updated, created_at, response_created_at, interview_datetime_utc,
                   total_prompt_tokens, total_completion_tokens, total_cached_tokens, total_cost
            FROM dialogues
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    async fn insert(&self, db: &PgPool) -> Result<Self> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO dialogues (
                id, external_response_id, candidate_id, vacancy_id, recruiter_id,
                status, dialogue_state, reminder_level, history, pending_messages,
                last_updated, created_at, response_created_at, interview_datetime_utc,
                total_prompt_tokens, total_completion_tokens, total_cached_tokens, total_cost
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING id, external_response_id, candidate_id, vacancy_id, recruiter_id,
                      status, dialogue_state, reminder_level, history, pending_messages,
                      last_updated, created_at, response_created_at, interview_datetime_utc,
                      total_prompt_tokens, total_completion_tokens, total_cached_tokens, total_cost
            "#,
        )
        .bind(self.id)
        .bind(&self.external_response_id)
        .bind(self.candidate_id)
        .bind(self.vacancy_id)
        .bind(self.recruiter_id)
        .bind(self.status)
        .bind(self.dialogue_state)
        .bind(self.reminder_level)
        .bind(&self.history)
        .bind(&self.pending_messages)
        .bind(self.last_updated)
        .bind(self.created_at)
        .bind(self.response_created_at)
        .bind(self.interview_datetime_utc)
        .bind(self.total_prompt_tokens)
        .bind(self.total_completion_tokens)
        .bind(self.total_cached_tokens)
        .bind(self.total_cost)
        .fetch_one(db)
        .await?;
        Ok(row)
    }

    async fn update(&self, db: &PgPool) -> Result<Self> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            UPDATE dialogues SET
                status = $2, dialogue_state = $3, reminder_level = $4, history = $5,
                pending_messages = $6, last_updated = $7, interview_datetime_utc = $8,
                total_prompt_tokens = $9, total_completion_tokens = $10,
                total_cached_tokens = $11, total_cost = $12
            WHERE id = $1
            RETURNING id, external_response_id, candidate_id, vacancy_id, recruiter_id,
                      status, dialogue_state, reminder_level, history, pending_messages,
                      last_updated, created_at, response_created_at, interview_datetime_utc,
                      total_prompt_tokens, total_completion_tokens, total_cached_tokens, total_cost
            "#,
        )
        .bind(self.id)
        .bind(self.status)
        .bind(self.dialogue_state)
        .bind(self.reminder_level)
        .bind(&self.history)
        .bind(&self.pending_messages)
        .bind(self.last_updated)
        .bind(self.interview_datetime_utc)
        .bind(self.total_prompt_tokens)
        .bind(self.total_completion_tokens)
        .bind(self.total_cached_tokens)
        .bind(self.total_cost)
        .fetch_one(db)
        .await?;
        Ok(row)
    }
}

impl DialogueRow {
    /// Transaction-bound counterpart to [`Record::insert`], used by the
    /// poller's new-response ingestion (§4.1 step 4) so the ledger debit and
    /// the dialogue row live or die together with the fence move.
    pub async fn insert_tx(&self, tx: &mut Transaction<'_, Postgres>) -> Result<Self> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO dialogues (
                id, external_response_id, candidate_id, vacancy_id, recruiter_id,
                status, dialogue_state, reminder_level, history, pending_messages,
                last_updated, created_at, response_created_at, interview_datetime_utc,
                total_prompt_tokens, total_completion_tokens, total_cached_tokens, total_cost
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING id, external_response_id, candidate_id, vacancy_id, recruiter_id,
                      status, dialogue_state, reminder_level, history, pending_messages,
                      last_updated, created_at, response_created_at, interview_datetime_utc,
                      total_prompt_tokens, total_completion_tokens, total_cached_tokens, total_cost
            "#,
        )
        .bind(self.id)
        .bind(&self.external_response_id)
        .bind(self.candidate_id)
        .bind(self.vacancy_id)
        .bind(self.recruiter_id)
        .bind(self.status)
        .bind(self.dialogue_state)
        .bind(self.reminder_level)
        .bind(&self.history)
        .bind(&self.pending_messages)
        .bind(self.last_updated)
        .bind(self.created_at)
        .bind(self.response_created_at)
        .bind(self.interview_datetime_utc)
        .bind(self.total_prompt_tokens)
        .bind(self.total_completion_tokens)
        .bind(self.total_cached_tokens)
        .bind(self.total_cost)
        .fetch_one(&mut **tx)
        .await?;
        Ok(row)
    }

    /// Transaction-bound counterpart to [`Record::update`], used by the
    /// processor so every write a dialogue turn makes (candidate fields,
    /// terminal-state side effects, the reply-triggered history append)
    /// commits or rolls back as one unit (§4.2 step 10, §5/§9 turn
    /// atomicity).
    pub async fn update_tx(&self, tx: &mut Transaction<'_, Postgres>) -> Result<Self> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            UPDATE dialogues SET
                status = $2, dialogue_state = $3, reminder_level = $4, history = $5,
                pending_messages = $6, last_updated = $7, interview_datetime_utc = $8,
                total_prompt_tokens = $9, total_completion_tokens = $10,
                total_cached_tokens = $11, total_cost = $12
            WHERE id = $1
            RETURNING id, external_response_id, candidate_id, vacancy_id, recruiter_id,
                      status, dialogue_state, reminder_level, history, pending_messages,
                      last_updated, created_at, response_created_at, interview_datetime_utc,
                      total_prompt_tokens, total_completion_tokens, total_cached_tokens, total_cost
            "#,
        )
        .bind(self.id)
        .bind(self.status)
        .bind(self.dialogue_state)
        .bind(self.reminder_level)
        .bind(&self.history)
        .bind(&self.pending_messages)
        .bind(self.last_updated)
        .bind(self.interview_datetime_utc)
        .bind(self.total_prompt_tokens)
        .bind(self.total_completion_tokens)
        .bind(self.total_cached_tokens)
        .bind(self.total_cost)
        .fetch_one(&mut **tx)
        .await?;
        Ok(row)
    }

    /// Appends a history entry, trimming from the front once past the cap
    /// (§3 invariant: append-only except for the cap trim).
    pub fn push_history(&mut self, entry: HistoryEntry) {
        self.history.0.push(entry);
        let len = self.history.0.len();
        if len > HISTORY_CAP {
            self.history.0.drain(0..len - HISTORY_CAP);
        }
    }

    pub fn clear_pending_messages(&mut self) {
        self.pending_messages.0.clear();
    }

    pub fn add_usage(&mut self, prompt_tokens: i64, completion_tokens: i64, cached_tokens: i64, cost: Decimal) {
        self.total_prompt_tokens += prompt_tokens;
        self.total_completion_tokens += completion_tokens;
        self.total_cached_tokens += cached_tokens;
        self.total_cost += cost;
    }

    /// Already-seen message ids: the union of history and pending_messages,
    /// used by update ingestion (§4.1) to figure out which applicant
    /// messages are genuinely new.
    pub fn seen_message_ids(&self) -> std::collections::HashSet<&str> {
        self.history
            .0
            .iter()
            .map(|e| e.message_id.as_str())
            .chain(self.pending_messages.0.iter().map(|e| e.message_id.as_str()))
            .collect()
    }

    /// Claims a batch of dialogues ready for the processor: non-empty
    /// `pending_messages` and past the debounce window, using the same
    /// `SELECT ... FOR UPDATE SKIP LOCKED` CTE shape the job queue uses so
    /// concurrent processor workers never double-process one dialogue.
    pub async fn claim_batch(
        limit: i64,
        debounce_secs: i64,
        db: &PgPool,
    ) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, Self>(
            r#"
            WITH claimable AS (
                SELECT id FROM dialogues
                WHERE jsonb_array_length(pending_messages) > 0
                  AND last_updated <= now() - ($1 || ' seconds')::interval
                ORDER BY last_updated
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            SELECT d.id, d.external_response_id, d.candidate_id, d.vacancy_id, d.recruiter_id,
                   d.status, d.dialogue_state, d.reminder_level, d.history, d.pending_messages,
                   d.last_updated, d.created_at, d.response_created_at, d.interview_datetime_utc,
                   d.total_prompt_tokens, d.total_completion_tokens, d.total_cached_tokens, d.total_cost
            FROM dialogues d
            JOIN claimable ON claimable.id = d.id
            "#,
        )
        .bind(debounce_secs.to_string())
        .bind(limit)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    /// Claims dialogues eligible for a dojim nudge this cycle (§4.3a):
    /// `status = in_progress`, `reminder_level < 6`, and not sitting in a
    /// state the ladder must never touch.
    pub async fn claim_dojim_batch(
        recruiter_id: RecruiterId,
        limit: i64,
        db: &PgPool,
    ) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, Self>(
            r#"
            WITH claimable AS (
                SELECT id FROM dialogues
                WHERE recruiter_id = $1
                  AND status = 'in_progress'
                  AND reminder_level < 6
                  AND dialogue_state NOT IN ('declined_vacancy', 'declined_interview', 'call_later')
                ORDER BY last_updated
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            SELECT d.id, d.external_response_id, d.candidate_id, d.vacancy_id, d.recruiter_id,
                   d.status, d.dialogue_state, d.reminder_level, d.history, d.pending_messages,
                   d.last_updated, d.created_at, d.response_created_at, d.interview_datetime_utc,
                   d.total_prompt_tokens, d.total_completion_tokens, d.total_cached_tokens, d.total_cost
            FROM dialogues d
            JOIN claimable ON claimable.id = d.id
            "#,
        )
        .bind(recruiter_id)
        .bind(limit)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn find_by_external_response_id(
        external_response_id: &str,
        db: &PgPool,
    ) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, external_response_id, candidate_id, vacancy_id, recruiter_id,
                   status, dialogue_state, reminder_level, history, pending_messages,
                   last_updated, created_at, response_created_at, interview_datetime_utc,
                   total_prompt_tokens, total_completion_tokens, total_cached_tokens, total_cost
            FROM dialogues
            WHERE external_response_id = $1
            "#,
        )
        .bind(external_response_id)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> HistoryEntry {
        HistoryEntry {
            message_id: id.to_string(),
            role: Role::User,
            content: "hello".to_string(),
            timestamp_local: Utc::now(),
            extracted_data: None,
            state: None,
        }
    }

    #[test]
    fn history_trims_from_the_front_past_the_cap() {
        let mut row = sample_row();
        for i in 0..HISTORY_CAP + 10 {
            row.push_history(entry(&i.to_string()));
        }
        assert_eq!(row.history.0.len(), HISTORY_CAP);
        assert_eq!(row.history.0.first().unwrap().message_id, "10");
        assert_eq!(
            row.history.0.last().unwrap().message_id,
            (HISTORY_CAP + 9).to_string()
        );
    }

    fn sample_row() -> DialogueRow {
        DialogueRow {
            id: DialogueId::new(),
            external_response_id: "resp-1".into(),
            candidate_id: CandidateId::new(),
            vacancy_id: VacancyId::new(),
            recruiter_id: RecruiterId::new(),
            status: DialogueStatus::New,
            dialogue_state: DialogueState::InitialProcessing,
            reminder_level: 0,
            history: sqlx::types::Json(Vec::new()),
            pending_messages: sqlx::types::Json(Vec::new()),
            last_updated: Utc::now(),
            created_at: Utc::now(),
            response_created_at: Utc::now(),
            interview_datetime_utc: None,
            total_prompt_tokens: 0,
            total_completion_tokens: 0,
            total_cached_tokens: 0,
            total_cost: Decimal::ZERO,
        }
    }
}
