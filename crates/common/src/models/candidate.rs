//! Candidate — a person conversing with the agent, identified by the job
//! board's resume identity. PII (full name, phone) is stored only after
//! masking has run over inbound text; see [`crate::pii`].

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use crate::id::CandidateId;
use crate::record::Record;

#[derive(Debug, Clone, FromRow)]
pub struct CandidateRow {
    pub id: CandidateId,
    pub external_resume_id: String,
    pub full_name: Option<String>,
    pub age: Option<i16>,
    pub citizenship: Option<String>,
    pub city: Option<String>,
    pub phone_number: Option<String>,
    pub readiness_to_start: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CandidateRow {
    /// Whether the required qualification fields (§4.2 step 8) are all on
    /// file.
    pub fn has_required_fields(&self) -> bool {
        self.phone_number.is_some()
            && self.citizenship.is_some()
            && self.age.is_some()
            && self.city.is_some()
            && self.readiness_to_start.is_some()
    }

    /// Programmatic eligibility gate: 18-58 inclusive and a citizenship
    /// value that matches an acceptable residency status.
    pub fn is_eligible(&self) -> bool {
        let age_ok = self.age.map(|a| (18..=58).contains(&a)).unwrap_or(false);
        let citizenship_ok = self
            .citizenship
            .as_deref()
            .map(is_acceptable_citizenship)
            .unwrap_or(false);
        age_ok && citizenship_ok
    }
}

fn is_acceptable_citizenship(value: &str) -> bool {
    let lower = value.to_lowercase();
    lower.contains("rf")
        || lower.contains("eaeu")
        || lower.contains("rvp")
        || lower.contains("vnzh")
        || lower.contains("residency")
}

#[async_trait::async_trait]
impl Record for CandidateRow {
    const TABLE: &'static str = "candidates";
    type Id = CandidateId;

    async fn find_by_id(id: Self::Id, db: &PgPool) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, external_resume_id, full_name, age, citizenship, city,
                   phone_number, readiness_to_start, created_at
            FROM candidates
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
            INSERT INTO candidates (
                id, external_resume_id, full_name, age, citizenship, city,
                phone_number, readiness_to_start, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, external_resume_id, full_name, age, citizenship, city,
                      phone_number, readiness_to_start, created_at
            "#,
        )
        .bind(self.id)
        .bind(&self.external_resume_id)
        .bind(&self.full_name)
        .bind(self.age)
        .bind(&self.citizenship)
        .bind(&self.city)
        .bind(&self.phone_number)
        .bind(&self.readiness_to_start)
        .bind(self.created_at)
        .fetch_one(db)
        .await?;
        Ok(row)
    }

    async fn update(&self, db: &PgPool) -> Result<Self> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            UPDATE candidates SET
                full_name = $2, age = $3, citizenship = $4, city = $5,
                phone_number = $6, readiness_to_start = $7
            WHERE id = $1
            RETURNING id, external_resume_id, full_name, age, citizenship, city,
                      phone_number, readiness_to_start, created_at
            "#,
        )
        .bind(self.id)
        .bind(&self.full_name)
        .bind(self.age)
        .bind(&self.citizenship)
        .bind(&self.city)
        .bind(&self.phone_number)
        .bind(&self.readiness_to_start)
        .fetch_one(db)
        .await?;
        Ok(row)
    }
}

impl CandidateRow {
    /// Transaction-bound counterpart to [`Record::update`], used by the
    /// processor turn so a candidate-field write commits or rolls back
    /// together with the dialogue write it accompanies.
    pub async fn update_tx(&self, tx: &mut Transaction<'_, Postgres>) -> Result<Self> {
        let row = sqlx::query_as::<_, Self>(
            r#"
            UPDATE candidates SET
                full_name = $2, age = $3, citizenship = $4, city = $5,
                phone_number = $6, readiness_to_start = $7
            WHERE id = $1
            RETURNING id, external_resume_id, full_name, age, citizenship, city,
                      phone_number, readiness_to_start, created_at
            "#,
        )
        .bind(self.id)
        .bind(&self.full_name)
        .bind(self.age)
        .bind(&self.citizenship)
        .bind(&self.city)
        .bind(&self.phone_number)
        .bind(&self.readiness_to_start)
        .fetch_one(&mut **tx)
        .await?;
        Ok(row)
    }

    pub async fn find_or_create_by_external_resume_id(
        external_resume_id: &str,
        db: &PgPool,
    ) -> Result<Self> {
        if let Some(existing) = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, external_resume_id, full_name, age, citizenship, city,
                   phone_number, readiness_to_start, created_at
            FROM candidates WHERE external_resume_id = $1
            "#,
        )
        .bind(external_resume_id)
        .fetch_optional(db)
        .await?
        {
            return Ok(existing);
        }

        let row = Self {
            id: CandidateId::new(),
            external_resume_id: external_resume_id.to_string(),
            full_name: None,
            age: None,
            citizenship: None,
            city: None,
            phone_number: None,
            readiness_to_start: None,
            created_at: Utc::now(),
        };
        match row.insert(db).await {
            Ok(inserted) => Ok(inserted),
            Err(_) => sqlx::query_as::<_, Self>(
                r#"
                SELECT id, external_resume_id, full_name, age, citizenship, city,
                       phone_number, readiness_to_start, created_at
                FROM candidates WHERE external_resume_id = $1
                "#,
            )
            .bind(external_resume_id)
            .fetch_one(db)
            .await
            .map_err(Into::into),
        }
    }

    /// Records a phone extracted by the PII masker, without overwriting one
    /// already on file.
    pub async fn record_phone_if_absent(id: CandidateId, phone: &str, db: &PgPool) -> Result<()> {
        sqlx::query("UPDATE candidates SET phone_number = COALESCE(phone_number, $2) WHERE id = $1")
            .bind(id)
            .bind(phone)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Records a full name extracted by the PII masker, same
    /// don't-overwrite-if-present rule as the phone capture.
    pub async fn record_full_name_if_absent(id: CandidateId, full_name: &str, db: &PgPool) -> Result<()> {
        sqlx::query("UPDATE candidates SET full_name = COALESCE(full_name, $2) WHERE id = $1")
            .bind(id)
            .bind(full_name)
            .execute(db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(age: Option<i16>, citizenship: Option<&str>) -> CandidateRow {
        CandidateRow {
            id: CandidateId::new(),
            external_resume_id: "r1".into(),
            full_name: None,
            age,
            citizenship: citizenship.map(|s| s.to_string()),
            city: None,
            phone_number: None,
            readiness_to_start: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn eligible_within_age_band_and_acceptable_citizenship() {
        assert!(candidate(Some(30), Some("RF")).is_eligible());
        assert!(candidate(Some(18), Some("EAEU")).is_eligible());
        assert!(candidate(Some(58), Some("RVP")).is_eligible());
    }

    #[test]
    fn ineligible_outside_age_band_or_bad_citizenship() {
        assert!(!candidate(Some(16), Some("RF")).is_eligible());
        assert!(!candidate(Some(59), Some("RF")).is_eligible());
        assert!(!candidate(Some(30), Some("other country")).is_eligible());
        assert!(!candidate(None, Some("RF")).is_eligible());
    }
}
