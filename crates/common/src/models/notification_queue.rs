//! The notifier reads from three small, deliberately separate queues rather
//! than one generic "notification" table: qualified/rejected/inactive each
//! carry a different upstream trigger and are claimed independently so a
//! recruiter's `topic_qualified` chat being down never blocks the rejected
//! queue draining.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction, Type};

use crate::id::{CandidateId, DialogueId, Id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type)]
#[sqlx(type_name = "notification_status", rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Error,
    Cancelled,
    SkippedNoChat,
}

/// Common surface the notifier's queue consumer drives generically over
/// all three queue tables, without caring which one it's looking at.
#[async_trait::async_trait]
pub trait OutboundQueueRow: Sized + Send + Sync {
    type Id: Copy + Send + Sync;

    fn row_id(&self) -> Self::Id;
    fn dialogue_id(&self) -> DialogueId;
    async fn claim_pending_batch(limit: i64, db: &PgPool) -> Result<Vec<Self>>;
    async fn mark_status(id: Self::Id, status: NotificationStatus, db: &PgPool) -> Result<()>;
}

macro_rules! notification_queue_row {
    ($marker:ident, $id_alias:ident, $row:ident, $table:literal) => {
        pub struct $marker;
        pub type $id_alias = Id<$marker>;

        #[derive(Debug, Clone, FromRow)]
        pub struct $row {
            pub id: $id_alias,
            pub dialogue_id: DialogueId,
            pub status: NotificationStatus,
            pub created_at: DateTime<Utc>,
            pub processed_at: Option<DateTime<Utc>>,
        }

        impl $row {
            /// Inserts a pending row unless one already exists for this
            /// dialogue (at-most-one-pending-per-dialogue, §3 invariant).
            pub async fn enqueue_if_absent(dialogue_id: DialogueId, db: &PgPool) -> Result<()> {
                sqlx::query(concat!(
                    "INSERT INTO ", $table, " (id, dialogue_id, status, created_at) ",
                    "VALUES ($1, $2, 'pending', now()) ",
                    "ON CONFLICT (dialogue_id) DO NOTHING"
                ))
                .bind($id_alias::new())
                .bind(dialogue_id)
                .execute(db)
                .await?;
                Ok(())
            }

            /// Transaction-bound counterpart, used by the processor so the
            /// enqueue commits or rolls back with the rest of the turn.
            pub async fn enqueue_if_absent_tx(dialogue_id: DialogueId, tx: &mut Transaction<'_, Postgres>) -> Result<()> {
                sqlx::query(concat!(
                    "INSERT INTO ", $table, " (id, dialogue_id, status, created_at) ",
                    "VALUES ($1, $2, 'pending', now()) ",
                    "ON CONFLICT (dialogue_id) DO NOTHING"
                ))
                .bind($id_alias::new())
                .bind(dialogue_id)
                .execute(&mut **tx)
                .await?;
                Ok(())
            }

            /// Re-enqueues an existing row (reusing it rather than
            /// inserting a duplicate) or inserts a fresh pending one.
            pub async fn enqueue_or_reset(dialogue_id: DialogueId, db: &PgPool) -> Result<()> {
                sqlx::query(concat!(
                    "INSERT INTO ", $table, " (id, dialogue_id, status, created_at) ",
                    "VALUES ($1, $2, 'pending', now()) ",
                    "ON CONFLICT (dialogue_id) DO UPDATE SET status = 'pending', processed_at = NULL"
                ))
                .bind($id_alias::new())
                .bind(dialogue_id)
                .execute(db)
                .await?;
                Ok(())
            }

            /// Transaction-bound counterpart to [`Self::enqueue_or_reset`].
            pub async fn enqueue_or_reset_tx(dialogue_id: DialogueId, tx: &mut Transaction<'_, Postgres>) -> Result<()> {
                sqlx::query(concat!(
                    "INSERT INTO ", $table, " (id, dialogue_id, status, created_at) ",
                    "VALUES ($1, $2, 'pending', now()) ",
                    "ON CONFLICT (dialogue_id) DO UPDATE SET status = 'pending', processed_at = NULL"
                ))
                .bind($id_alias::new())
                .bind(dialogue_id)
                .execute(&mut **tx)
                .await?;
                Ok(())
            }

            pub async fn cancel(dialogue_id: DialogueId, db: &PgPool) -> Result<()> {
                sqlx::query(concat!(
                    "UPDATE ", $table, " SET status = 'cancelled', processed_at = now() ",
                    "WHERE dialogue_id = $1 AND status = 'pending'"
                ))
                .bind(dialogue_id)
                .execute(db)
                .await?;
                Ok(())
            }

            pub async fn exists_any_status(dialogue_id: DialogueId, db: &PgPool) -> Result<bool> {
                let row: (bool,) = sqlx::query_as(concat!(
                    "SELECT EXISTS(SELECT 1 FROM ", $table, " WHERE dialogue_id = $1)"
                ))
                .bind(dialogue_id)
                .fetch_one(db)
                .await?;
                Ok(row.0)
            }

            /// Transaction-bound counterpart to [`Self::exists_any_status`].
            pub async fn exists_any_status_tx(dialogue_id: DialogueId, tx: &mut Transaction<'_, Postgres>) -> Result<bool> {
                let row: (bool,) = sqlx::query_as(concat!(
                    "SELECT EXISTS(SELECT 1 FROM ", $table, " WHERE dialogue_id = $1)"
                ))
                .bind(dialogue_id)
                .fetch_one(&mut **tx)
                .await?;
                Ok(row.0)
            }

            pub async fn claim_pending(limit: i64, db: &PgPool) -> Result<Vec<Self>> {
                let rows = sqlx::query_as::<_, Self>(concat!(
                    "WITH claimable AS (",
                    "  SELECT id FROM ", $table, " WHERE status = 'pending' ",
                    "  ORDER BY created_at LIMIT $1 FOR UPDATE SKIP LOCKED",
                    ") ",
                    "SELECT t.id, t.dialogue_id, t.status, t.created_at, t.processed_at ",
                    "FROM ", $table, " t JOIN claimable ON claimable.id = t.id"
                ))
                .bind(limit)
                .fetch_all(db)
                .await?;
                Ok(rows)
            }

            pub async fn mark(id: $id_alias, status: NotificationStatus, db: &PgPool) -> Result<()> {
                sqlx::query(concat!(
                    "UPDATE ", $table, " SET status = $2, processed_at = now() WHERE id = $1"
                ))
                .bind(id)
                .bind(status)
                .execute(db)
                .await?;
                Ok(())
            }
        }

        #[async_trait::async_trait]
        impl OutboundQueueRow for $row {
            type Id = $id_alias;

            fn row_id(&self) -> Self::Id {
                self.id
            }

            fn dialogue_id(&self) -> DialogueId {
                self.dialogue_id
            }

            async fn claim_pending_batch(limit: i64, db: &PgPool) -> Result<Vec<Self>> {
                Self::claim_pending(limit, db).await
            }

            async fn mark_status(id: Self::Id, status: NotificationStatus, db: &PgPool) -> Result<()> {
                Self::mark(id, status, db).await
            }
        }
    };
}

pub struct QualifiedNotificationMarker;
pub type QualifiedNotificationId = Id<QualifiedNotificationMarker>;

/// Unlike the rejected/inactive queues, qualified dossiers are keyed on
/// `candidate_id` rather than `dialogue_id` (§3, §4.2 step 9): a candidate
/// with more than one dialogue still gets a single pending dossier.
#[derive(Debug, Clone, FromRow)]
pub struct QualifiedNotificationRow {
    pub id: QualifiedNotificationId,
    pub candidate_id: CandidateId,
    pub dialogue_id: DialogueId,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl QualifiedNotificationRow {
    /// Inserts a pending row unless one already exists for this candidate.
    pub async fn enqueue_if_absent(candidate_id: CandidateId, dialogue_id: DialogueId, db: &PgPool) -> Result<()> {
        sqlx::query(
            "INSERT INTO qualified_notifications (id, candidate_id, dialogue_id, status, created_at) \
             VALUES ($1, $2, $3, 'pending', now()) \
             ON CONFLICT (candidate_id) DO NOTHING",
        )
        .bind(QualifiedNotificationId::new())
        .bind(candidate_id)
        .bind(dialogue_id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Transaction-bound counterpart, used by the processor turn.
    pub async fn enqueue_if_absent_tx(
        candidate_id: CandidateId,
        dialogue_id: DialogueId,
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO qualified_notifications (id, candidate_id, dialogue_id, status, created_at) \
             VALUES ($1, $2, $3, 'pending', now()) \
             ON CONFLICT (candidate_id) DO NOTHING",
        )
        .bind(QualifiedNotificationId::new())
        .bind(candidate_id)
        .bind(dialogue_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn claim_pending(limit: i64, db: &PgPool) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, Self>(
            "WITH claimable AS ( \
                SELECT id FROM qualified_notifications WHERE status = 'pending' \
                ORDER BY created_at LIMIT $1 FOR UPDATE SKIP LOCKED \
             ) \
             SELECT t.id, t.candidate_id, t.dialogue_id, t.status, t.created_at, t.processed_at \
             FROM qualified_notifications t JOIN claimable ON claimable.id = t.id",
        )
        .bind(limit)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn mark(id: QualifiedNotificationId, status: NotificationStatus, db: &PgPool) -> Result<()> {
        sqlx::query("UPDATE qualified_notifications SET status = $2, processed_at = now() WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(db)
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl OutboundQueueRow for QualifiedNotificationRow {
    type Id = QualifiedNotificationId;

    fn row_id(&self) -> Self::Id {
        self.id
    }

    fn dialogue_id(&self) -> DialogueId {
        self.dialogue_id
    }

    async fn claim_pending_batch(limit: i64, db: &PgPool) -> Result<Vec<Self>> {
        Self::claim_pending(limit, db).await
    }

    async fn mark_status(id: Self::Id, status: NotificationStatus, db: &PgPool) -> Result<()> {
        Self::mark(id, status, db).await
    }
}

notification_queue_row!(
    RejectedNotificationMarker,
    RejectedNotificationId,
    RejectedNotificationRow,
    "rejected_notifications"
);
notification_queue_row!(
    InactiveNotificationMarker,
    InactiveNotificationId,
    InactiveNotificationRow,
    "inactive_notifications"
);
