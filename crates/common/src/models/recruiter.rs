//! Recruiter — owns vacancies and dialogues; mutated by token refresh and the
//! (out-of-scope) operator console.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::id::RecruiterId;
use crate::record::Record;

#[derive(Debug, Clone, FromRow)]
pub struct RecruiterRow {
    pub id: RecruiterId,
    pub external_id: String,
    pub name: String,
    pub refresh_token: String,
    pub access_token: String,
    pub token_expires_at: DateTime<Utc>,
    pub vacancies_last_synced_at: Option<DateTime<Utc>>,
    pub chat_id: Option<i64>,
    pub topic_qualified: Option<i64>,
    pub topic_rejected: Option<i64>,
    pub topic_timeout: Option<i64>,
    /// Gates whether the poller/processor pick up this recruiter's dialogues
    /// at all. Distinct from a transient token-refresh failure, which is
    /// handled per-call; this is flipped by the operator console when a
    /// recruiter's job-board account has been deauthorized.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[async_trait::async_trait]
impl Record for RecruiterRow {
    const TABLE: &'static str = "recruiters";
    type Id = RecruiterId;

    async fn find_by_id(id: Self::Id, db: &PgPool) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, external_id, name, refresh_token, access_token, token_expires_at,
                   vacancies_last_synced_at, chat_id, topic_qualified, topic_rejected,
                   topic_timeout, is_active, created_at
            FROM recruiters
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
            INSERT INTO recruiters (
                id, external_id, name, refresh_token, access_token, token_expires_at,
                vacancies_last_synced_at, chat_id, topic_qualified, topic_rejected,
                topic_timeout, is_active, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id, external_id, name, refresh_token, access_token, token_expires_at,
                      vacancies_last_synced_at, chat_id, topic_qualified, topic_rejected,
                      topic_timeout, is_active, created_at
            "#,
        )
        .bind(self.id)
        .bind(&self.external_id)
        .bind(&self.name)
        .bind(&self.refresh_token)
        .bind(&self.access_token)
        .bind(self.token_expires_at)
        .bind(self.vacancies_last_synced_at)
        .bind(self.chat_id)
        .bind(self.topic_qualified)
        .bind(self.topic_rejected)
        .bind(self.topic_timeout)
        .bind(self.is_active)
        .bind(self.created_at)
        .fetch_one(db)
        .await?;
        Ok(row)
    }

    async fn update(&self, db: &PgPool) -> Result<Self> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            UPDATE recruiters SET
                name = $2, refresh_token = $3, access_token = $4, token_expires_at = $5,
                vacancies_last_synced_at = $6, chat_id = $7, topic_qualified = $8,
                topic_rejected = $9, topic_timeout = $10, is_active = $11
            WHERE id = $1
            RETURNING id, external_id, name, refresh_token, access_token, token_expires_at,
                      vacancies_last_synced_at, chat_id, topic_qualified, topic_rejected,
                      topic_timeout, is_active, created_at
            "#,
        )
        .bind(self.id)
        .bind(&self.name)
        .bind(&self.refresh_token)
        .bind(&self.access_token)
        .bind(self.token_expires_at)
        .bind(self.vacancies_last_synced_at)
        .bind(self.chat_id)
        .bind(self.topic_qualified)
        .bind(self.topic_rejected)
        .bind(self.topic_timeout)
        .bind(self.is_active)
        .fetch_one(db)
        .await?;
        Ok(row)
    }
}

impl RecruiterRow {
    /// All recruiters the poller/processor should consider, optionally
    /// restricted to a subset (the `--recruiters id,id,...` CLI surface).
    pub async fn tracked(ids: Option<&[RecruiterId]>, db: &PgPool) -> Result<Vec<Self>> {
        let rows = match ids {
            Some(ids) if !ids.is_empty() => {
                let uuids: Vec<uuid::Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
                sqlx::query_as::<_, Self>(
                    r#"
                    SELECT id, external_id, name, refresh_token, access_token, token_expires_at,
                           vacancies_last_synced_at, chat_id, topic_qualified, topic_rejected,
                           topic_timeout, is_active, created_at
                    FROM recruiters
                    WHERE is_active = true AND id = ANY($1)
                    "#,
                )
                .bind(&uuids)
                .fetch_all(db)
                .await?
            }
            _ => {
                sqlx::query_as::<_, Self>(
                    r#"
                    SELECT id, external_id, name, refresh_token, access_token, token_expires_at,
                           vacancies_last_synced_at, chat_id, topic_qualified, topic_rejected,
                           topic_timeout, is_active, created_at
                    FROM recruiters
                    WHERE is_active = true
                    "#,
                )
                .fetch_all(db)
                .await?
            }
        };
        Ok(rows)
    }

    /// Whether this recruiter's chat is configured to receive a given topic.
    pub fn topic_for(&self, queue: NotificationChannel) -> Option<i64> {
        match queue {
            NotificationChannel::Qualified => self.topic_qualified,
            NotificationChannel::Rejected => self.topic_rejected,
            NotificationChannel::Timeout => self.topic_timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationChannel {
    Qualified,
    Rejected,
    Timeout,
}
