//! Short-ladder dojim (§4.3a): nudges a silent candidate through a fixed
//! sequence of job-board messages, escalating to the inactive queue and
//! finally to a handful of "long" reminders paid for out of the ledger.

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Timelike, Utc};
use chrono_tz::Tz;
use jobboard_client::JobBoardClient;
use recruiting_common::ledger;
use recruiting_common::models::{DialogueRow, HistoryEntry, InactiveNotificationRow, Role, SYSTEM_COMMAND_PREFIX};
use recruiting_common::record::Record;
use recruiting_common::state_machine::DialogueStatus;
use recruiting_common::RecruiterId;
use sqlx::PgPool;
use tracing::warn;

const OPERATING_START_HOUR: u32 = 9;
const OPERATING_END_HOUR: u32 = 20;

const LEVEL0_ELAPSED: ChronoDuration = ChronoDuration::minutes(30);
const LEVEL1_ELAPSED: ChronoDuration = ChronoDuration::minutes(60);
const LEVEL2_ELAPSED: ChronoDuration = ChronoDuration::minutes(30);
const LEVEL3_ELAPSED: ChronoDuration = ChronoDuration::days(7);
const LEVEL4_ELAPSED: ChronoDuration = ChronoDuration::days(21);
const LEVEL5_ELAPSED: ChronoDuration = ChronoDuration::days(51);

const NUDGE_MESSAGE_ONE: &str =
    "Добрый день! Кажется, вы могли пропустить моё предыдущее сообщение.";
const NUDGE_MESSAGE_TWO: &str = "Вакансия всё ещё открыта — интересно ли вам её обсудить?";
const REMINDER_MESSAGE: &str =
    "Напоминаю о себе — дайте знать, если вакансия всё ещё интересна.";
const LONG_REMINDER_MESSAGE: &str =
    "Возвращаемся к вам по вакансии — если обстоятельства изменились и вам снова интересно, напишите нам.";

const CONSIDER_FOLDER: &str = "consider";

/// Whether the dojim ladder is allowed to run right now, in the agent's
/// fixed operating zone (§4.3a: "Runs only during local 09:00-20:00").
pub fn within_operating_window(zone: Tz) -> bool {
    let hour = Utc::now().with_timezone(&zone).hour();
    (OPERATING_START_HOUR..OPERATING_END_HOUR).contains(&hour)
}

/// Claims and nudges one recruiter's batch of eligible dialogues.
pub async fn run_dojim_for_recruiter(
    recruiter_id: RecruiterId,
    access_token: &str,
    job_board: &JobBoardClient,
    batch_size: i64,
    db: &PgPool,
) -> Result<()> {
    let claimed = DialogueRow::claim_dojim_batch(recruiter_id, batch_size, db).await?;
    for dialogue in claimed {
        let dialogue_id = dialogue.id;
        if let Err(err) = nudge_one(dialogue, access_token, job_board, db).await {
            warn!(dialogue_id = %dialogue_id, error = %err, "dojim nudge failed");
        }
    }
    Ok(())
}

async fn nudge_one(
    mut dialogue: DialogueRow,
    access_token: &str,
    job_board: &JobBoardClient,
    db: &PgPool,
) -> Result<()> {
    match job_board
        .get_negotiation(access_token, &dialogue.external_response_id)
        .await
    {
        Ok(negotiation) => {
            let folder = negotiation.employer_state.map(|s| s.id);
            if folder.as_deref() != Some(CONSIDER_FOLDER) {
                dialogue.reminder_level = 3;
                dialogue.status = DialogueStatus::RecruiterHandled;
                dialogue.last_updated = Utc::now();
                InactiveNotificationRow::cancel(dialogue.id, db).await?;
                dialogue.update(db).await?;
                return Ok(());
            }
        }
        Err(err) if err.is_not_found() => {
            dialogue.status = DialogueStatus::TimedOut;
            dialogue.last_updated = Utc::now();
            dialogue.update(db).await?;
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    }

    let elapsed = Utc::now() - dialogue.last_updated;

    match dialogue.reminder_level {
        0 if elapsed > LEVEL0_ELAPSED => {
            job_board
                .send_message(access_token, &dialogue.external_response_id, NUDGE_MESSAGE_ONE)
                .await?;
            job_board
                .send_message(access_token, &dialogue.external_response_id, NUDGE_MESSAGE_TWO)
                .await?;
            dialogue.reminder_level = 1;
            dialogue.last_updated = Utc::now();
            dialogue.update(db).await?;
        }
        1 if elapsed > LEVEL1_ELAPSED => {
            job_board
                .send_message(access_token, &dialogue.external_response_id, REMINDER_MESSAGE)
                .await?;
            dialogue.reminder_level = 2;
            dialogue.last_updated = Utc::now();
            dialogue.update(db).await?;
        }
        2 if elapsed > LEVEL2_ELAPSED => {
            InactiveNotificationRow::enqueue_if_absent(dialogue.id, db).await?;
            dialogue.status = DialogueStatus::TimedOut;
            dialogue.reminder_level = 3;
            dialogue.last_updated = Utc::now();
            dialogue.update(db).await?;
        }
        3 if elapsed > LEVEL3_ELAPSED => send_long_reminder(&mut dialogue, 4, access_token, job_board, db).await?,
        4 if elapsed > LEVEL4_ELAPSED => send_long_reminder(&mut dialogue, 5, access_token, job_board, db).await?,
        5 if elapsed > LEVEL5_ELAPSED => send_long_reminder(&mut dialogue, 6, access_token, job_board, db).await?,
        _ => {}
    }

    Ok(())
}

/// Sends a long-ladder reminder, debiting `cost_per_long_reminder` under a
/// row lock (§4.3a). Debited only after the message goes out, so a failed
/// send never costs anything; if the balance can't cover it, the ladder
/// simply doesn't advance and retries next cycle.
async fn send_long_reminder(
    dialogue: &mut DialogueRow,
    next_level: i16,
    access_token: &str,
    job_board: &JobBoardClient,
    db: &PgPool,
) -> Result<()> {
    job_board
        .send_message(access_token, &dialogue.external_response_id, LONG_REMINDER_MESSAGE)
        .await?;

    let mut tx = db.begin().await?;
    let outcome = ledger::debit(ledger::DebitReason::LongReminder, &mut tx).await?;
    if outcome.is_none() {
        tx.rollback().await?;
        return Ok(());
    }

    dialogue.push_history(HistoryEntry {
        message_id: uuid::Uuid::now_v7().to_string(),
        role: Role::User,
        content: format!("{SYSTEM_COMMAND_PREFIX} resumed after long reminder, level {next_level}"),
        timestamp_local: Utc::now(),
        extracted_data: None,
        state: None,
    });
    dialogue.reminder_level = next_level;
    dialogue.last_updated = Utc::now();

    sqlx::query(
        "UPDATE dialogues SET history = $2, reminder_level = $3, last_updated = $4 WHERE id = $1",
    )
    .bind(dialogue.id)
    .bind(&dialogue.history)
    .bind(dialogue.reminder_level)
    .bind(dialogue.last_updated)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
