//! Singleton settings/ledger row. One row, `id = 1`, row-locked by
//! [`crate::ledger`] whenever a debit or low-balance check needs to happen
//! atomically with the read.

use anyhow::Result;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};

#[derive(Debug, Clone, FromRow)]
pub struct AppSettingsRow {
    pub id: i32,
    pub balance: Decimal,
    pub low_balance_threshold: Decimal,
    pub low_balance_notified: bool,
    pub cost_per_dialogue_start: Decimal,
    pub cost_per_long_reminder: Decimal,
    pub total_spent_on_dialogues: Decimal,
    pub total_spent_on_reminders: Decimal,
}

impl AppSettingsRow {
    /// Plain unlocked read of the singleton row, for callers that only need
    /// to observe the balance (e.g. checking whether it has recovered above
    /// threshold) rather than mutate it under a transaction.
    pub async fn current(db: &PgPool) -> Result<Self> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, balance, low_balance_threshold, low_balance_notified,
                   cost_per_dialogue_start, cost_per_long_reminder,
                   total_spent_on_dialogues, total_spent_on_reminders
            FROM app_settings
            WHERE id = 1
            "#,
        )
        .fetch_one(db)
        .await?;
        Ok(row)
    }

    /// Locks the singleton row for the duration of the caller's transaction.
    /// Every balance mutation in the system goes through this so the
    /// low-balance check and the debit it gates never observe stale state.
    pub async fn lock(tx: &mut Transaction<'_, Postgres>) -> Result<Self> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, balance, low_balance_threshold, low_balance_notified,
                   cost_per_dialogue_start, cost_per_long_reminder,
                   total_spent_on_dialogues, total_spent_on_reminders
            FROM app_settings
            WHERE id = 1
            FOR UPDATE
            "#,
        )
        .fetch_one(&mut **tx)
        .await?;
        Ok(row)
    }

    /// Debits `amount` off the balance and rolls it into the running spend
    /// counter matching `reason` (§3: `total_spent_on_dialogues` /
    /// `total_spent_on_reminders`).
    pub async fn apply_debit(
        &self,
        amount: Decimal,
        reason: crate::ledger::DebitReason,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<()> {
        let query = match reason {
            crate::ledger::DebitReason::DialogueStart => {
                "UPDATE app_settings SET balance = balance - $1, \
                 total_spent_on_dialogues = total_spent_on_dialogues + $1 WHERE id = 1"
            }
            crate::ledger::DebitReason::LongReminder => {
                "UPDATE app_settings SET balance = balance - $1, \
                 total_spent_on_reminders = total_spent_on_reminders + $1 WHERE id = 1"
            }
        };
        sqlx::query(query).bind(amount).execute(&mut **tx).await?;
        Ok(())
    }

    pub fn is_low(&self) -> bool {
        self.balance <= self.low_balance_threshold
    }

    pub async fn mark_low_balance_notified(tx: &mut Transaction<'_, Postgres>) -> Result<()> {
        sqlx::query("UPDATE app_settings SET low_balance_notified = true WHERE id = 1")
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn clear_low_balance_notified(db: &PgPool) -> Result<()> {
        sqlx::query("UPDATE app_settings SET low_balance_notified = false WHERE id = 1")
            .execute(db)
            .await?;
        Ok(())
    }
}
