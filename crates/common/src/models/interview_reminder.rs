//! Interview reminders, scheduled by [`crate::reminders::schedule_interview_reminders`]
//! (kept in the `agent` crate, alongside the pipeline that consumes these
//! rows) and claimed by the reminders pipeline once `scheduled_send_time_utc`
//! has passed.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction, Type};

use crate::id::{DialogueId, Id, RecruiterId};

pub struct InterviewReminderMarker;
pub type InterviewReminderId = Id<InterviewReminderMarker>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type)]
#[sqlx(type_name = "interview_notification_type", rename_all = "snake_case")]
pub enum InterviewNotificationType {
    TMinus2h,
    DayBefore20Local,
    DayOf9Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type)]
#[sqlx(type_name = "interview_reminder_status", rename_all = "snake_case")]
pub enum InterviewReminderStatus {
    Pending,
    Sent,
    Cancelled,
    Error,
}

#[derive(Debug, Clone, FromRow)]
pub struct InterviewReminderRow {
    pub id: InterviewReminderId,
    pub dialogue_id: DialogueId,
    pub recruiter_id: RecruiterId,
    pub interview_datetime_utc: DateTime<Utc>,
    pub scheduled_send_time_utc: DateTime<Utc>,
    pub notification_type: InterviewNotificationType,
    pub status: InterviewReminderStatus,
    pub processed_at: Option<DateTime<Utc>>,
}

impl InterviewReminderRow {
    /// Transaction-bound: scheduled alongside the dialogue's terminal-state
    /// write so a rolled-back turn never leaves an orphaned reminder row
    /// (§4.2 step 9).
    pub async fn insert(&self, tx: &mut Transaction<'_, Postgres>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO interview_reminders (
                id, dialogue_id, recruiter_id, interview_datetime_utc,
                scheduled_send_time_utc, notification_type, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            "#,
        )
        .bind(self.id)
        .bind(self.dialogue_id)
        .bind(self.recruiter_id)
        .bind(self.interview_datetime_utc)
        .bind(self.scheduled_send_time_utc)
        .bind(self.notification_type)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Cancels every still-pending reminder for a dialogue. Called before
    /// scheduling a fresh set so a rescheduled interview never fires a
    /// reminder for the old time (§3 invariant, §8 property 5).
    pub async fn cancel_pending_for_dialogue(
        dialogue_id: DialogueId,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE interview_reminders SET status = 'cancelled', processed_at = now()
            WHERE dialogue_id = $1 AND status = 'pending'
            "#,
        )
        .bind(dialogue_id)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }

    /// Locks a batch of due rows without changing their status, so the
    /// caller can send the reminder and then, in the same transaction,
    /// mark exactly one of sent/cancelled/error — the row only ever leaves
    /// `pending` once (§8 property 5: idempotence via the status
    /// transition, not a separate dedup table).
    pub async fn lock_due_batch(
        limit: i64,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, dialogue_id, recruiter_id, interview_datetime_utc,
                   scheduled_send_time_utc, notification_type, status, processed_at
            FROM interview_reminders
            WHERE status = 'pending' AND scheduled_send_time_utc <= now()
            ORDER BY scheduled_send_time_utc
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(limit)
        .fetch_all(&mut **tx)
        .await?;
        Ok(rows)
    }

    pub async fn mark(
        id: InterviewReminderId,
        status: InterviewReminderStatus,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<()> {
        sqlx::query("UPDATE interview_reminders SET status = $2, processed_at = now() WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
