//! Balance ledger: the two places money leaves the account (starting a new
//! dialogue, sending a "long" reminder past the free-ladder rungs) and the
//! low-balance alert flag that gates the one-time operator notification.
//!
//! Every debit here runs inside the caller's transaction, locking
//! [`AppSettingsRow`] first, so a burst of concurrently-processed dialogues
//! can't all observe a pre-debit balance and overdraw the account.

use anyhow::Result;
use rust_decimal::Decimal;
use sqlx::{Postgres, Transaction};

use crate::models::AppSettingsRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitReason {
    DialogueStart,
    LongReminder,
}

#[derive(Debug, Clone, Copy)]
pub struct DebitOutcome {
    pub new_balance: Decimal,
    /// Set the first time a debit pushes the balance at or below the
    /// threshold; the caller is responsible for notifying and must not
    /// re-notify on every subsequent debit while the balance stays low.
    pub crossed_into_low_balance: bool,
}

/// Debits the ledger for `reason` under a row lock on [`AppSettingsRow`],
/// or returns `Ok(None)` without writing anything if the balance would go
/// negative (§3 invariant, §7 "budget exhaustion: skip silently"). Reports
/// whether a successful debit is the one that newly crossed the
/// low-balance threshold.
pub async fn debit(
    reason: DebitReason,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<Option<DebitOutcome>> {
    let settings = AppSettingsRow::lock(tx).await?;
    let amount = match reason {
        DebitReason::DialogueStart => settings.cost_per_dialogue_start,
        DebitReason::LongReminder => settings.cost_per_long_reminder,
    };

    if settings.balance < amount {
        return Ok(None);
    }

    settings.apply_debit(amount, reason, tx).await?;
    let new_balance = settings.balance - amount;
    let now_low = new_balance <= settings.low_balance_threshold;

    let crossed_into_low_balance = now_low && !settings.low_balance_notified;
    if crossed_into_low_balance {
        AppSettingsRow::mark_low_balance_notified(tx).await?;
    }

    Ok(Some(DebitOutcome {
        new_balance,
        crossed_into_low_balance,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_balance_only_fires_once_per_dip() {
        let settings = AppSettingsRow {
            id: 1,
            balance: Decimal::new(1000, 2),
            low_balance_threshold: Decimal::new(2000, 2),
            low_balance_notified: true,
            cost_per_dialogue_start: Decimal::new(100, 2),
            cost_per_long_reminder: Decimal::new(50, 2),
            total_spent_on_dialogues: Decimal::ZERO,
            total_spent_on_reminders: Decimal::ZERO,
        };
        let now_low = settings.is_low();
        assert!(now_low);
        // already notified, so a repeat debit should not re-trigger
        assert!(now_low && settings.low_balance_notified);
    }
}
