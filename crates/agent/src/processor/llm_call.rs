//! Wraps `llm_client::LlmRequest` with the usage-logging contract (§4.2
//! step 6): one `LlmUsageLogRow` per attempt, successful or not, so billing
//! reconciliation never trusts an aggregate counter alone.

use llm_client::{LlmAttempt, LlmError, LlmRequest};
use recruiting_common::models::LlmUsageLogRow;
use recruiting_common::state_machine::DialogueState;
use recruiting_common::{DialogueId, Id};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use sqlx::PgPool;

/// Token/cost totals for one `call_llm` invocation's successful attempt,
/// shaped to feed straight into [`recruiting_common::models::DialogueRow::add_usage`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CallUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub cached_tokens: i64,
    pub cost: Decimal,
}

/// Builds the request, calls `output::<T>()`, and persists one usage-log
/// row per attempt (the successful one billed, every prior failed attempt
/// at zero cost). Returns the parsed value and the successful attempt's
/// usage totals.
pub async fn call_llm<T: DeserializeOwned>(
    request: LlmRequest<'_>,
    dialogue_id: DialogueId,
    state_at_call: DialogueState,
    input_rate_per_million: Decimal,
    output_rate_per_million: Decimal,
    db: &PgPool,
) -> Result<(T, CallUsage), LlmError> {
    match request.output::<T>().await {
        Ok((value, attempts)) => {
            let total_cost = log_attempts(
                &attempts,
                dialogue_id,
                state_at_call,
                input_rate_per_million,
                output_rate_per_million,
                db,
            )
            .await
            .unwrap_or(Decimal::ZERO);
            let success = attempts.last().map(|a| a.usage).unwrap_or_default();
            let usage = CallUsage {
                prompt_tokens: success.input_tokens,
                completion_tokens: success.output_tokens,
                cached_tokens: success.cache_read_input_tokens,
                cost: total_cost,
            };
            Ok((value, usage))
        }
        Err((err, attempts)) => {
            log_attempts(
                &attempts,
                dialogue_id,
                state_at_call,
                input_rate_per_million,
                output_rate_per_million,
                db,
            )
            .await
            .ok();
            Err(err)
        }
    }
}

/// Persists one row per attempt and returns the sum of non-failed costs
/// (§4.2 step 6: "log one zero-cost row per prior failed retry attempt").
async fn log_attempts(
    attempts: &[LlmAttempt],
    dialogue_id: DialogueId,
    state_at_call: DialogueState,
    input_rate_per_million: Decimal,
    output_rate_per_million: Decimal,
    db: &PgPool,
) -> anyhow::Result<Decimal> {
    let mut total_cost = Decimal::ZERO;
    for attempt in attempts {
        let failed = attempt.error.is_some();
        let cost = if failed {
            Decimal::ZERO
        } else {
            attempt
                .usage
                .cost(input_rate_per_million, output_rate_per_million)
        };
        if !failed {
            total_cost += cost;
        }

        let row = LlmUsageLogRow {
            id: Id::new(),
            dialogue_id,
            state_at_call,
            prompt_tokens: attempt.usage.input_tokens,
            completion_tokens: attempt.usage.output_tokens,
            cached_tokens: attempt.usage.cache_read_input_tokens,
            total_tokens: attempt.usage.total_tokens(),
            cost,
            failed,
            created_at: chrono::Utc::now(),
        };
        row.record(db).await?;
    }
    Ok(total_cost)
}
