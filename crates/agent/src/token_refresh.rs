//! OAuth token refresh, collapsed so concurrent callers for the same
//! recruiter never fire two refresh requests at once (§9 Design Notes).
//!
//! Two layers of locking: an in-process `tokio::sync::Mutex` per recruiter
//! collapses concurrent callers *within this process* onto a single refresh
//! call, and a `SELECT ... FOR UPDATE` on the recruiter row collapses
//! concurrent callers *across processes* (poller, processor and reminders
//! binaries all refresh through this same path). A contender that loses the
//! in-process race simply re-reads the row the winner just wrote, rather
//! than calling the job board a second time.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use jobboard_client::JobBoardClient;
use recruiting_common::models::RecruiterRow;
use recruiting_common::RecruiterId;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::info;

/// Refresh ahead of actual expiry so a borrowed token never goes stale
/// mid-call.
const REFRESH_SKEW: ChronoDuration = ChronoDuration::minutes(5);

#[derive(Clone)]
pub struct TokenRefresher {
    job_board: JobBoardClient,
    locks: Arc<Mutex<HashMap<RecruiterId, Arc<Mutex<()>>>>>,
}

impl TokenRefresher {
    pub fn new(job_board: JobBoardClient) -> Self {
        Self {
            job_board,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns a valid access token for `recruiter_id`, refreshing first if
    /// the cached token is within [`REFRESH_SKEW`] of expiry.
    pub async fn access_token(&self, recruiter_id: RecruiterId, db: &PgPool) -> Result<String> {
        let per_recruiter_lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(recruiter_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        let _guard = per_recruiter_lock.lock().await;

        let row = RecruiterRow::find_by_id(recruiter_id, db)
            .await?
            .ok_or_else(|| anyhow::anyhow!("recruiter {recruiter_id} not found"))?;

        if row.token_expires_at - REFRESH_SKEW > Utc::now() {
            return Ok(row.access_token);
        }

        let mut tx = db.begin().await?;
        let locked = sqlx::query_as::<_, RecruiterRow>(
            r#"
            SELECT id, external_id, name, refresh_token, access_token, token_expires_at,
                   vacancies_last_synced_at, chat_id, topic_qualified, topic_rejected,
                   topic_timeout, is_active, created_at
            FROM recruiters WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(recruiter_id)
        .fetch_one(&mut *tx)
        .await?;

        // Another process may have refreshed between our unlocked read and
        // acquiring the row lock; re-check before calling out.
        if locked.token_expires_at - REFRESH_SKEW > Utc::now() {
            tx.commit().await?;
            return Ok(locked.access_token);
        }

        info!(recruiter_id = %recruiter_id, "refreshing job board access token");
        let refreshed = self.job_board.refresh_token(&locked.refresh_token).await?;
        let new_expires_at = Utc::now() + ChronoDuration::seconds(refreshed.expires_in);

        sqlx::query(
            "UPDATE recruiters SET access_token = $2, refresh_token = $3, token_expires_at = $4 WHERE id = $1",
        )
        .bind(recruiter_id)
        .bind(&refreshed.access_token)
        .bind(&refreshed.refresh_token)
        .bind(new_expires_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(refreshed.access_token)
    }
}
