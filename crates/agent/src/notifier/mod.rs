//! Notifier pipeline (§4.4): three independent consumers draining the
//! qualified/rejected/inactive queues plus the daily history-retention
//! sweep, all four supervised as [`Service`]s with their own heartbeat.

pub mod dossier;

use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use chrono::Timelike;
use chrono_tz::Tz;
use messenger_client::MessengerClient;
use recruiting_common::models::{
    CandidateRow, DialogueRow, NotificationChannel, NotificationStatus, OutboundQueueRow,
    RecruiterRow, VacancyRow,
};
use recruiting_common::record::Record;
use recruiting_common::Config;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::notifier::dossier::{render_caption, render_transcript};
use crate::service::{HeartbeatHandle, Service};

#[derive(Clone)]
pub struct NotifierContext {
    pub db: PgPool,
    pub messenger: MessengerClient,
    pub config: Config,
}

impl NotifierContext {
    fn operating_zone(&self) -> Tz {
        Tz::from_str(&self.config.operating_zone).unwrap_or(chrono_tz::Europe::Moscow)
    }
}

/// One cycle of one queue (§4.4 steps 1-5): claim up to `batch_size` pending
/// rows, render and ship a dossier for each, mark the row's outcome. A
/// failure on one row never stops the batch — it's logged and the row is
/// marked `error` so the next cycle doesn't retry it forever silently.
async fn run_queue_cycle<R: OutboundQueueRow>(
    ctx: &NotifierContext,
    channel: NotificationChannel,
    batch_size: i64,
) -> Result<()> {
    let rows = R::claim_pending_batch(batch_size, &ctx.db).await?;
    for row in rows {
        let dialogue_id = row.dialogue_id();
        let status = match deliver_one(ctx, channel, dialogue_id).await {
            Ok(true) => NotificationStatus::Sent,
            Ok(false) => NotificationStatus::SkippedNoChat,
            Err(err) => {
                warn!(dialogue_id = %dialogue_id, error = %err, "dossier delivery failed");
                NotificationStatus::Error
            }
        };
        R::mark_status(row.row_id(), status, &ctx.db).await?;
    }
    Ok(())
}

/// Loads the dialogue's related rows, renders the dossier and ships it.
/// Returns `Ok(false)` (never an error) when the recruiter has no chat or
/// topic configured for this channel (§4.4 step 2) — that's a deliberate
/// `skipped_no_chat`, not a failure.
async fn deliver_one(
    ctx: &NotifierContext,
    channel: NotificationChannel,
    dialogue_id: recruiting_common::DialogueId,
) -> Result<bool> {
    let dialogue = DialogueRow::find_by_id(dialogue_id, &ctx.db)
        .await?
        .ok_or_else(|| anyhow::anyhow!("dialogue {dialogue_id} missing for notification"))?;
    let candidate = CandidateRow::find_by_id(dialogue.candidate_id, &ctx.db)
        .await?
        .ok_or_else(|| anyhow::anyhow!("candidate {} missing", dialogue.candidate_id))?;
    let vacancy = VacancyRow::find_by_id(dialogue.vacancy_id, &ctx.db)
        .await?
        .ok_or_else(|| anyhow::anyhow!("vacancy {} missing", dialogue.vacancy_id))?;
    let recruiter = RecruiterRow::find_by_id(dialogue.recruiter_id, &ctx.db)
        .await?
        .ok_or_else(|| anyhow::anyhow!("recruiter {} missing", dialogue.recruiter_id))?;

    let (Some(chat_id), Some(thread_id)) = (recruiter.chat_id, recruiter.topic_for(channel)) else {
        return Ok(false);
    };

    let caption = render_caption(&candidate, &vacancy);
    let transcript = render_transcript(&dialogue, &candidate, &vacancy, &recruiter, ctx.operating_zone());
    let filename = format!("{}.txt", dialogue.external_response_id);

    match ctx
        .messenger
        .send_document(chat_id, Some(thread_id), &filename, transcript, &caption)
        .await
    {
        Ok(()) => Ok(true),
        Err(_) => {
            // Fall back to a text-only message (§6: "Text-only fallback if
            // the transcript file cannot be built") before giving up.
            ctx.messenger
                .send_message(chat_id, Some(thread_id), &caption)
                .await?;
            Ok(true)
        }
    }
}

macro_rules! queue_service {
    ($service:ident, $row:ty, $channel:expr, $name:literal) => {
        pub struct $service {
            pub ctx: NotifierContext,
        }

        #[async_trait::async_trait]
        impl Service for $service {
            fn name(&self) -> &'static str {
                $name
            }

            async fn run(&self, shutdown: CancellationToken, heartbeat: HeartbeatHandle) -> Result<()> {
                loop {
                    if shutdown.is_cancelled() {
                        return Ok(());
                    }

                    if let Err(err) =
                        run_queue_cycle::<$row>(&self.ctx, $channel, self.ctx.config.notifier_batch_size).await
                    {
                        warn!(error = %err, queue = $name, "notifier cycle failed");
                    }

                    heartbeat.beat().await;

                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(Duration::from_secs(self.ctx.config.notifier_tick_interval_secs)) => {}
                    }
                }
            }
        }
    };
}

queue_service!(
    QualifiedNotifierService,
    recruiting_common::models::QualifiedNotificationRow,
    NotificationChannel::Qualified,
    "notifier_qualified"
);
queue_service!(
    RejectedNotifierService,
    recruiting_common::models::RejectedNotificationRow,
    NotificationChannel::Rejected,
    "notifier_rejected"
);
queue_service!(
    InactiveNotifierService,
    recruiting_common::models::InactiveNotificationRow,
    NotificationChannel::Timeout,
    "notifier_inactive"
);

/// Once-a-day bulk-null of `history` on dialogues past the retention window
/// (§4.4 "History cleanup"). Runs as a [`Service`] like its three siblings
/// so the same supervisor/heartbeat machinery covers it, checking hourly
/// whether today's sweep has happened yet rather than sleeping a fixed
/// 24h (which would never recover from a missed tick after a restart).
pub struct HistoryCleanupService {
    pub db: PgPool,
    pub retention_days: i64,
    pub fixed_hour_utc: u32,
}

#[async_trait::async_trait]
impl Service for HistoryCleanupService {
    fn name(&self) -> &'static str {
        "history_cleanup"
    }

    async fn run(&self, shutdown: CancellationToken, heartbeat: HeartbeatHandle) -> Result<()> {
        let mut last_run_date: Option<chrono::NaiveDate> = None;
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            let now = chrono::Utc::now();
            if now.hour() == self.fixed_hour_utc && last_run_date != Some(now.date_naive()) {
                match sweep_history(&self.db, self.retention_days).await {
                    Ok(rows) => tracing::info!(rows, "history cleanup swept stale dialogues"),
                    Err(err) => warn!(error = %err, "history cleanup sweep failed"),
                }
                last_run_date = Some(now.date_naive());
            }

            heartbeat.beat().await;

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(Duration::from_secs(3600)) => {}
            }
        }
    }
}

async fn sweep_history(db: &PgPool, retention_days: i64) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE dialogues SET history = '[]'::jsonb
        WHERE last_updated < now() - ($1 || ' days')::interval
          AND history != '[]'::jsonb
        "#,
    )
    .bind(retention_days.to_string())
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}
