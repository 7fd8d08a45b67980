//! Vacancy reconciliation (§4.1 "Vacancy reconciliation"): keeps the local
//! vacancy table in sync with whatever the job board currently reports as
//! active for one recruiter.

use anyhow::Result;
use chrono::Utc;
use jobboard_client::JobBoardClient;
use recruiting_common::models::{RecruiterRow, VacancyRow};
use sqlx::PgPool;
use tracing::{info, warn};

pub async fn reconcile_vacancies(
    recruiter: &RecruiterRow,
    access_token: &str,
    job_board: &JobBoardClient,
    cache_window_secs: i64,
    db: &PgPool,
) -> Result<()> {
    if let Some(last_synced) = recruiter.vacancies_last_synced_at {
        if Utc::now() - last_synced < chrono::Duration::seconds(cache_window_secs) {
            return Ok(());
        }
    }

    let employer_id = job_board.current_employer_id(access_token).await?;
    let remote = job_board
        .list_active_vacancies(access_token)
        .await
        .map_err(|err| {
            warn!(recruiter_id = %recruiter.id, employer_id, error = %err, "vacancy sync failed");
            err
        })?;

    let mut seen_external_ids = Vec::with_capacity(remote.len());
    for vacancy in &remote {
        seen_external_ids.push(vacancy.id.clone());
        VacancyRow::upsert_active(
            recruiter.id,
            &vacancy.id,
            &vacancy.name,
            vacancy.area.as_ref().map(|a| a.name.as_str()),
            db,
        )
        .await?;
    }

    let detached = VacancyRow::detach_missing(recruiter.id, &seen_external_ids, db).await?;
    if detached > 0 {
        info!(recruiter_id = %recruiter.id, detached, "detached vacancies no longer active");
    }

    sqlx::query("UPDATE recruiters SET vacancies_last_synced_at = now() WHERE id = $1")
        .bind(recruiter.id)
        .execute(db)
        .await?;

    Ok(())
}
