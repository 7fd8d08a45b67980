//! Vacancy — a job posting synced from the job board. `recruiter_id` is
//! nullable: an absent value means the vacancy was observed to have gone
//! inactive, not that it was deleted.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use crate::id::{RecruiterId, VacancyId};
use crate::record::Record;

#[derive(Debug, Clone, FromRow)]
pub struct VacancyRow {
    pub id: VacancyId,
    pub external_id: String,
    pub title: String,
    pub city: Option<String>,
    pub recruiter_id: Option<RecruiterId>,
    /// Running count of candidates that reached a qualified terminal state
    /// against this vacancy (§4.2 step 9's "increment the per-vacancy
    /// qualified counter"), bumped in the same transaction as the
    /// dialogue's terminal-state write.
    pub qualified_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait::async_trait]
impl Record for VacancyRow {
    const TABLE: &'static str = "vacancies";
    type Id = VacancyId;

    async fn find_by_id(id: Self::Id, db: &PgPool) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, external_id, title, city, recruiter_id, qualified_count, created_at, updated_at
            FROM vacancies
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    async fn insert(&self, db: &PgPool) -> Result<Self> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO vacancies (id, external_id, title, city, recruiter_id, qualified_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, external_id, title, city, recruiter_id, qualified_count, created_at, updated_at
            "#,
        )
        .bind(self.id)
        .bind(&self.external_id)
        .bind(&self.title)
        .bind(&self.city)
        .bind(self.recruiter_id)
        .bind(self.qualified_count)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(db)
        .await?;
        Ok(row)
    }

    async fn update(&self, db: &PgPool) -> Result<Self> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            UPDATE vacancies SET
                title = $2, city = $3, recruiter_id = $4, qualified_count = $5, updated_at = now()
            WHERE id = $1
            RETURNING id, external_id, title, city, recruiter_id, qualified_count, created_at, updated_at
            "#,
        )
        .bind(self.id)
        .bind(&self.title)
        .bind(&self.city)
        .bind(self.recruiter_id)
        .bind(self.qualified_count)
        .fetch_one(db)
        .await?;
        Ok(row)
    }
}

impl VacancyRow {
    /// Upsert-by-`external_id`, used by the poller's vacancy sync step.
    pub async fn upsert_active(
        recruiter_id: RecruiterId,
        external_id: &str,
        title: &str,
        city: Option<&str>,
        db: &PgPool,
    ) -> Result<Self> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO vacancies (id, external_id, title, city, recruiter_id, qualified_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 0, now(), now())
            ON CONFLICT (external_id) DO UPDATE SET
                title = EXCLUDED.title, city = EXCLUDED.city, recruiter_id = EXCLUDED.recruiter_id, updated_at = now()
            RETURNING id, external_id, title, city, recruiter_id, qualified_count, created_at, updated_at
            "#,
        )
        .bind(VacancyId::new())
        .bind(external_id)
        .bind(title)
        .bind(city)
        .bind(recruiter_id)
        .fetch_one(db)
        .await?;
        Ok(row)
    }

    /// Detaches (never deletes) vacancies the remote active list no longer
    /// reports for this recruiter.
    pub async fn detach_missing(
        recruiter_id: RecruiterId,
        seen_external_ids: &[String],
        db: &PgPool,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE vacancies SET recruiter_id = NULL, updated_at = now()
            WHERE recruiter_id = $1 AND NOT (external_id = ANY($2))
            "#,
        )
        .bind(recruiter_id)
        .bind(seen_external_ids)
        .execute(db)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn active_for_recruiter(recruiter_id: RecruiterId, db: &PgPool) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, external_id, title, city, recruiter_id, qualified_count, created_at, updated_at
            FROM vacancies
            WHERE recruiter_id = $1
            "#,
        )
        .bind(recruiter_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn increment_qualified_count(id: VacancyId, db: &PgPool) -> Result<()> {
        sqlx::query("UPDATE vacancies SET qualified_count = qualified_count + 1 WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Transaction-bound counterpart, used by the processor so the counter
    /// only actually advances once the turn's transaction commits — a
    /// retried turn (after a rolled-back send/move failure) never bumps it
    /// twice (§4.2 step 9).
    pub async fn increment_qualified_count_tx(id: VacancyId, tx: &mut Transaction<'_, Postgres>) -> Result<()> {
        sqlx::query("UPDATE vacancies SET qualified_count = qualified_count + 1 WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
