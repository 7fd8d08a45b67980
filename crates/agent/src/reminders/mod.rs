//! Reminders pipeline: two independently-scheduled loops sharing one crate
//! module because both read and write `interview_reminders`/`dialogues` —
//! the short-ladder dojim (§4.3a, fanned out per recruiter) and the
//! interview-reminder consumer (§4.3b, single consumer with batching).

pub mod dojim;
pub mod scheduler;

use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::stream::{self, StreamExt};
use jobboard_client::{JobBoardClient, TerminalKind};
use recruiting_common::models::{
    DialogueRow, InterviewNotificationType, InterviewReminderRow, InterviewReminderStatus,
    RecruiterRow,
};
use recruiting_common::record::Record;
use recruiting_common::{Config, RecruiterId};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::reminders::dojim::{run_dojim_for_recruiter, within_operating_window};
use crate::service::{HeartbeatHandle, Service};
use crate::token_refresh::TokenRefresher;

#[derive(Clone)]
pub struct RemindersContext {
    pub db: PgPool,
    pub job_board: JobBoardClient,
    pub token_refresher: TokenRefresher,
    pub config: Config,
}

impl RemindersContext {
    fn operating_zone(&self) -> Tz {
        Tz::from_str(&self.config.operating_zone).unwrap_or(chrono_tz::Europe::Moscow)
    }
}

/// Fans the short-ladder dojim out across tracked recruiters (§4.3a
/// "Concurrency": "fans out per recruiter with a semaphore, default 20").
pub struct DojimService {
    pub ctx: RemindersContext,
    pub recruiter_ids: Option<Vec<RecruiterId>>,
}

#[async_trait::async_trait]
impl Service for DojimService {
    fn name(&self) -> &'static str {
        "dojim"
    }

    async fn run(&self, shutdown: CancellationToken, heartbeat: HeartbeatHandle) -> Result<()> {
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            if within_operating_window(self.ctx.operating_zone()) {
                let recruiters =
                    RecruiterRow::tracked(self.recruiter_ids.as_deref(), &self.ctx.db).await?;
                let ctx = &self.ctx;

                stream::iter(recruiters)
                    .for_each_concurrent(ctx.config.dojim_fanout_concurrency, move |recruiter| async move {
                        let token = match ctx.token_refresher.access_token(recruiter.id, &ctx.db).await {
                            Ok(token) => token,
                            Err(err) => {
                                warn!(recruiter_id = %recruiter.id, error = %err, "dojim token refresh failed");
                                return;
                            }
                        };
                        if let Err(err) = run_dojim_for_recruiter(
                            recruiter.id,
                            &token,
                            &ctx.job_board,
                            ctx.config.processor_batch_size,
                            &ctx.db,
                        )
                        .await
                        {
                            warn!(recruiter_id = %recruiter.id, error = %err, "dojim cycle failed for recruiter");
                        }
                    })
                    .await;
            }

            heartbeat.beat().await;

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(Duration::from_secs(self.ctx.config.reminders_tick_interval_secs)) => {}
            }
        }
    }
}

/// Single-consumer batch loop sending due `t_minus_2h` / `day_before_20_local`
/// / `day_of_9_local` interview reminders (§4.3b).
pub struct InterviewReminderService {
    pub ctx: RemindersContext,
}

#[async_trait::async_trait]
impl Service for InterviewReminderService {
    fn name(&self) -> &'static str {
        "interview_reminders"
    }

    async fn run(&self, shutdown: CancellationToken, heartbeat: HeartbeatHandle) -> Result<()> {
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            let mut tx = self.ctx.db.begin().await?;
            let due =
                InterviewReminderRow::lock_due_batch(self.ctx.config.interview_reminder_batch_size, &mut tx)
                    .await?;
            tx.commit().await?;

            for row in due {
                let row_id = row.id;
                if let Err(err) = process_one_reminder(&self.ctx, row).await {
                    warn!(reminder_id = ?row_id, error = %err, "interview reminder send failed");
                }
            }

            heartbeat.beat().await;

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(Duration::from_secs(self.ctx.config.reminders_tick_interval_secs)) => {}
            }
        }
    }
}

async fn process_one_reminder(ctx: &RemindersContext, row: InterviewReminderRow) -> Result<()> {
    let dialogue = DialogueRow::find_by_id(row.dialogue_id, &ctx.db)
        .await?
        .ok_or_else(|| anyhow::anyhow!("dialogue {} missing for interview reminder", row.dialogue_id))?;

    let token = ctx.token_refresher.access_token(row.recruiter_id, &ctx.db).await?;
    let text = reminder_text(row.notification_type, row.interview_datetime_utc, ctx.operating_zone());

    let send_result = ctx
        .job_board
        .send_message(&token, &dialogue.external_response_id, &text)
        .await;

    let mut tx = ctx.db.begin().await?;
    match send_result {
        Ok(()) => InterviewReminderRow::mark(row.id, InterviewReminderStatus::Sent, &mut tx).await?,
        Err(err) if err.terminal_kind() == Some(TerminalKind::NegotiationGone) => {
            InterviewReminderRow::mark(row.id, InterviewReminderStatus::Cancelled, &mut tx).await?
        }
        Err(err) => {
            warn!(reminder_id = ?row.id, error = %err, "interview reminder send errored");
            InterviewReminderRow::mark(row.id, InterviewReminderStatus::Error, &mut tx).await?
        }
    }
    tx.commit().await?;
    Ok(())
}

fn reminder_text(kind: InterviewNotificationType, interview_at_utc: DateTime<Utc>, zone: Tz) -> String {
    let local = interview_at_utc.with_timezone(&zone);
    match kind {
        InterviewNotificationType::TMinus2h => {
            format!("Напоминаем: собеседование сегодня в {}.", local.format("%H:%M"))
        }
        InterviewNotificationType::DayBefore20Local => format!(
            "Напоминаем, что завтра в {} у вас запланировано собеседование.",
            local.format("%H:%M")
        ),
        InterviewNotificationType::DayOf9Local => format!(
            "Сегодня в {} у вас собеседование — ждём вас.",
            local.format("%H:%M")
        ),
    }
}
