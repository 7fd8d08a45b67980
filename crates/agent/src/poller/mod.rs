//! Poller pipeline (§4.1): vacancy reconciliation and response ingestion,
//! fanned out per recruiter with bounded concurrency.

pub mod responses;
pub mod vacancies;

use std::time::Duration;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use jobboard_client::JobBoardClient;
use messenger_client::MessengerClient;
use recruiting_common::models::{AppSettingsRow, RecruiterRow};
use recruiting_common::record::Record;
use recruiting_common::{Config, RecruiterId};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::poller::responses::{ingest_new_responses, ingest_updates, LowBalanceAlert};
use crate::poller::vacancies::reconcile_vacancies;
use crate::service::{HeartbeatHandle, Service};
use crate::token_refresh::TokenRefresher;

/// Everything one poller tick needs, cloned cheaply per recruiter task.
#[derive(Clone)]
pub struct PollerContext {
    pub db: PgPool,
    pub job_board: JobBoardClient,
    pub token_refresher: TokenRefresher,
    pub messenger: MessengerClient,
    pub config: Config,
}

/// One recruiter's full cycle: refresh the token, reconcile vacancies, then
/// ingest new and updated responses (§4.1 contract, steps 1-4).
async fn process_one_recruiter(
    ctx: &PollerContext,
    recruiter: &RecruiterRow,
) -> Result<Vec<LowBalanceAlert>> {
    let token = ctx.token_refresher.access_token(recruiter.id, &ctx.db).await?;

    reconcile_vacancies(
        recruiter,
        &token,
        &ctx.job_board,
        ctx.config.vacancy_sync_cache_window_secs,
        &ctx.db,
    )
    .await?;

    let alerts = ingest_new_responses(recruiter, &token, &ctx.job_board, &ctx.db).await?;
    ingest_updates(recruiter, &token, &ctx.job_board, &ctx.db).await?;

    Ok(alerts)
}

/// Delivers the one-time low-balance alert to the operator chat (§4.1 step
/// 6). Absent configuration degrades to a log line rather than panicking —
/// the operator console out of scope here is the only other place balance
/// gets topped up, so a missing chat id just means nobody gets pinged.
async fn broadcast_low_balance(ctx: &PollerContext, alert: &LowBalanceAlert) {
    let text = format!(
        "⚠️ Balance low after recruiter {} started a new dialogue: {} remaining.",
        alert.recruiter_id, alert.balance
    );
    match ctx.config.operator_chat_id {
        Some(chat_id) => {
            if let Err(err) = ctx.messenger.send_message(chat_id, None, &text).await {
                warn!(error = %err, "failed to deliver low balance alert");
            }
        }
        None => warn!(
            recruiter_id = %alert.recruiter_id,
            balance = %alert.balance,
            "low balance alert has no operator chat configured"
        ),
    }
}

/// Clears the low-balance flag once the balance has recovered above
/// threshold (§4.1 step 6: "reset the flag when balance rises above
/// threshold"), so a subsequent dip notifies again instead of staying
/// silent forever.
async fn reset_low_balance_flag_if_recovered(db: &PgPool) {
    match AppSettingsRow::current(db).await {
        Ok(settings) if settings.low_balance_notified && !settings.is_low() => {
            if let Err(err) = AppSettingsRow::clear_low_balance_notified(db).await {
                warn!(error = %err, "failed to clear low balance flag");
            }
        }
        Ok(_) => {}
        Err(err) => warn!(error = %err, "failed to read app settings for low balance recovery check"),
    }
}

/// Runs the poller as a supervised [`Service`]. One failing recruiter never
/// blocks its peers: a cycle error is logged and that recruiter simply
/// contributes no alerts this tick (§4.1 "Concurrency").
pub struct PollerService {
    pub ctx: PollerContext,
    pub recruiter_ids: Option<Vec<RecruiterId>>,
}

#[async_trait::async_trait]
impl Service for PollerService {
    fn name(&self) -> &'static str {
        "poller"
    }

    async fn run(&self, shutdown: CancellationToken, heartbeat: HeartbeatHandle) -> Result<()> {
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            let recruiters = RecruiterRow::tracked(self.recruiter_ids.as_deref(), &self.ctx.db).await?;
            let ctx = &self.ctx;

            let alerts: Vec<LowBalanceAlert> = stream::iter(recruiters)
                .map(move |recruiter| async move {
                    match process_one_recruiter(ctx, &recruiter).await {
                        Ok(alerts) => alerts,
                        Err(err) => {
                            warn!(
                                recruiter_id = %recruiter.id,
                                error = %err,
                                "poller cycle failed for recruiter"
                            );
                            Vec::new()
                        }
                    }
                })
                .buffer_unordered(ctx.config.recruiter_fanout_concurrency)
                .collect::<Vec<_>>()
                .await
                .into_iter()
                .flatten()
                .collect();

            for alert in &alerts {
                broadcast_low_balance(&self.ctx, alert).await;
            }
            reset_low_balance_flag_if_recovered(&self.ctx.db).await;

            heartbeat.beat().await;

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(Duration::from_secs(self.ctx.config.poll_interval_secs)) => {}
            }
        }
    }
}
