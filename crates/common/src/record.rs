//! `Record` trait for the small CRUD surface every entity in §3 needs.
//!
//! Kept deliberately thin: this is not an ORM. Joins and multi-row
//! operations (claims, reconciliation upserts, ledger debits) are
//! hand-written queries on the concrete type, not trait methods.

use async_trait::async_trait;
use sqlx::PgPool;

#[async_trait]
pub trait Record: Sized + Send + Sync {
    const TABLE: &'static str;
    type Id;

    async fn find_by_id(id: Self::Id, db: &PgPool) -> anyhow::Result<Option<Self>>;
    async fn insert(&self, db: &PgPool) -> anyhow::Result<Self>;
    async fn update(&self, db: &PgPool) -> anyhow::Result<Self>;
}
