//! Append-only per-call ledger row. One row per LLM attempt, successful or
//! not (§4.2 step 6: "log one zero-cost row per prior failed retry
//! attempt"), so billing reconciliation never has to trust an aggregate
//! counter alone. Dialogue's running token/cost counters are defined as
//! the sum of the non-failed rows here (§3 invariant).

use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};

use crate::id::{DialogueId, Id};
use crate::state_machine::DialogueState;

pub struct LlmUsageLogMarker;
pub type LlmUsageLogId = Id<LlmUsageLogMarker>;

#[derive(Debug, Clone, FromRow)]
pub struct LlmUsageLogRow {
    pub id: LlmUsageLogId,
    pub dialogue_id: DialogueId,
    pub state_at_call: DialogueState,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub cached_tokens: i64,
    pub total_tokens: i64,
    pub cost: Decimal,
    pub failed: bool,
    pub created_at: DateTime<Utc>,
}

impl LlmUsageLogRow {
    pub async fn record(&self, db: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO llm_usage_log (
                id, dialogue_id, state_at_call, prompt_tokens, completion_tokens,
                cached_tokens, total_tokens, cost, failed, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(self.id)
        .bind(self.dialogue_id)
        .bind(self.state_at_call)
        .bind(self.prompt_tokens)
        .bind(self.completion_tokens)
        .bind(self.cached_tokens)
        .bind(self.total_tokens)
        .bind(self.cost)
        .bind(self.failed)
        .bind(self.created_at)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn total_cost_for_dialogue(dialogue_id: DialogueId, db: &PgPool) -> Result<Decimal> {
        let row: (Option<Decimal>,) = sqlx::query_as(
            "SELECT SUM(cost) FROM llm_usage_log WHERE dialogue_id = $1 AND failed = false",
        )
        .bind(dialogue_id)
        .fetch_one(db)
        .await?;
        Ok(row.0.unwrap_or_default())
    }
}
