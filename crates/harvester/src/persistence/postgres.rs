//! PostgreSQL implementation of MarkingStore
//!
//! Production persistence using PostgreSQL with:
//! - Random selection of unfinished markings (`ORDER BY random()`)
//! - Flag columns addressed through the requirement dispatch table
//! - Result records appended as tagged JSONB payloads

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, error, instrument};

use super::records::ResultRecord;
use super::store::*;
use crate::requirement::{EntityScope, Requirement, SubjectKind};

/// PostgreSQL implementation of MarkingStore
///
/// Uses a connection pool; every worker of a pool shares one store.
///
/// # Example
///
/// ```ignore
/// use crawlmark_harvester::persistence::PostgresMarkingStore;
///
/// let store = PostgresMarkingStore::connect("postgres://localhost/crawlmark").await?;
/// store.migrate().await?;
/// ```
#[derive(Clone)]
pub struct PostgresMarkingStore {
    pool: PgPool,
}

impl PostgresMarkingStore {
    /// Create a new PostgreSQL store with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database at `database_url`
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn database_error(context: &str, e: sqlx::Error) -> StoreError {
    error!("{}: {}", context, e);
    StoreError::Database(e.to_string())
}

fn marking_from_row(row: &PgRow) -> MarkingRecord {
    MarkingRecord {
        person_id: row.get("person_id"),
        requirement_1: row.get("requirement_1"),
        requirement_2: row.get("requirement_2"),
        requirement_3: row.get("requirement_3"),
        requirement_4: row.get("requirement_4"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    }
}

fn subject_marking_from_row(row: &PgRow) -> Result<SubjectMarkingRecord, StoreError> {
    let kind: String = row.get("kind");
    Ok(SubjectMarkingRecord {
        subject_id: row.get("subject_id"),
        kind: kind
            .parse()
            .map_err(|e: crate::requirement::RequirementError| {
                StoreError::Serialization(e.to_string())
            })?,
        requirement_5: row.get("requirement_5"),
        requirement_6: row.get("requirement_6"),
        requirement_7: row.get("requirement_7"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}

#[async_trait]
impl MarkingStore for PostgresMarkingStore {
    #[instrument(skip(self), fields(requirement = %requirement))]
    async fn fetch_unfinished_markings(
        &self,
        requirement: Requirement,
        limit: usize,
    ) -> Result<Vec<MarkingRecord>, StoreError> {
        StoreError::check_scope(requirement, EntityScope::Person)?;

        // Column names come from the fixed dispatch table, never from input
        let query = format!(
            r#"
            SELECT person_id, requirement_1, requirement_2, requirement_3, requirement_4,
                   created_at, updated_at
            FROM marking
            WHERE {} = FALSE
            ORDER BY random()
            LIMIT $1
            "#,
            requirement.column()
        );

        let rows = sqlx::query(&query)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| database_error("Failed to fetch unfinished markings", e))?;

        debug!(count = rows.len(), "fetched unfinished markings");
        Ok(rows.iter().map(marking_from_row).collect())
    }

    #[instrument(skip(self), fields(requirement = %requirement))]
    async fn fetch_unfinished_subject_markings(
        &self,
        requirement: Requirement,
        limit: usize,
        kind: Option<SubjectKind>,
    ) -> Result<Vec<SubjectMarkingRecord>, StoreError> {
        StoreError::check_scope(requirement, EntityScope::Subject)?;

        let query = format!(
            r#"
            SELECT subject_id, kind, requirement_5, requirement_6, requirement_7,
                   created_at, updated_at
            FROM subject_marking
            WHERE {} = FALSE
              AND ($2::TEXT IS NULL OR kind = $2)
            ORDER BY random()
            LIMIT $1
            "#,
            requirement.column()
        );

        let rows = sqlx::query(&query)
            .bind(limit as i64)
            .bind(kind.map(|k| k.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| database_error("Failed to fetch unfinished subject markings", e))?;

        debug!(count = rows.len(), "fetched unfinished subject markings");
        rows.iter().map(subject_marking_from_row).collect()
    }

    #[instrument(skip(self), fields(requirement = %requirement))]
    async fn set_flag(
        &self,
        entity_id: &str,
        requirement: Requirement,
        value: bool,
    ) -> Result<(), StoreError> {
        let (table, key) = match requirement.scope() {
            EntityScope::Person => ("marking", "person_id"),
            EntityScope::Subject => ("subject_marking", "subject_id"),
        };
        let query = format!(
            "UPDATE {} SET {} = $2, updated_at = NOW() WHERE {} = $1",
            table,
            requirement.column(),
            key
        );

        let result = sqlx::query(&query)
            .bind(entity_id)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(|e| database_error("Failed to set flag", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(entity_id.to_string()));
        }

        debug!(%entity_id, value, "flag updated");
        Ok(())
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn bulk_insert(&self, records: Vec<ResultRecord>) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| database_error("Failed to begin transaction", e))?;

        for record in &records {
            let payload = serde_json::to_value(record)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;

            sqlx::query(
                r#"
                INSERT INTO result_records (requirement, entity_id, payload)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(record.requirement().number() as i16)
            .bind(record.entity_id())
            .bind(&payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| database_error("Failed to insert record", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| database_error("Failed to commit records", e))?;

        Ok(records.len())
    }

    #[instrument(skip(self))]
    async fn count_records(&self, requirement: Requirement) -> Result<usize, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM result_records WHERE requirement = $1")
            .bind(requirement.number() as i16)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| database_error("Failed to count records", e))?;

        Ok(row.get::<i64, _>("count") as usize)
    }

    #[instrument(skip(self, person_ids), fields(count = person_ids.len()))]
    async fn seed_markings(&self, person_ids: Vec<String>) -> Result<usize, StoreError> {
        let mut inserted = 0;
        for person_id in person_ids {
            let result = sqlx::query(
                "INSERT INTO marking (person_id) VALUES ($1) ON CONFLICT (person_id) DO NOTHING",
            )
            .bind(&person_id)
            .execute(&self.pool)
            .await
            .map_err(|e| database_error("Failed to seed marking", e))?;

            if result.rows_affected() == 0 {
                debug!(%person_id, "marking already exists");
            } else {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    #[instrument(skip(self, subjects), fields(count = subjects.len()))]
    async fn seed_subject_markings(
        &self,
        subjects: Vec<(String, SubjectKind)>,
    ) -> Result<usize, StoreError> {
        let mut inserted = 0;
        for (subject_id, kind) in subjects {
            let result = sqlx::query(
                r#"
                INSERT INTO subject_marking (subject_id, kind) VALUES ($1, $2)
                ON CONFLICT (subject_id) DO NOTHING
                "#,
            )
            .bind(&subject_id)
            .bind(kind.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| database_error("Failed to seed subject marking", e))?;

            if result.rows_affected() == 0 {
                debug!(%subject_id, "subject marking already exists");
            } else {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    #[instrument(skip(self))]
    async fn get_marking(&self, person_id: &str) -> Result<MarkingRecord, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT person_id, requirement_1, requirement_2, requirement_3, requirement_4,
                   created_at, updated_at
            FROM marking
            WHERE person_id = $1
            "#,
        )
        .bind(person_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| database_error("Failed to get marking", e))?
        .ok_or_else(|| StoreError::NotFound(person_id.to_string()))?;

        Ok(marking_from_row(&row))
    }

    #[instrument(skip(self))]
    async fn get_subject_marking(
        &self,
        subject_id: &str,
    ) -> Result<SubjectMarkingRecord, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT subject_id, kind, requirement_5, requirement_6, requirement_7,
                   created_at, updated_at
            FROM subject_marking
            WHERE subject_id = $1
            "#,
        )
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| database_error("Failed to get subject marking", e))?
        .ok_or_else(|| StoreError::NotFound(subject_id.to_string()))?;

        subject_marking_from_row(&row)
    }
}
