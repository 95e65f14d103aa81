//! Postgres-backed job store, story store and quota ledger.
//!
//! Jobs and stories are stored as JSONB documents next to the columns the
//! queries filter on. Quota fields live on the `users` row; open
//! reservations and counted jobs live in `quota_usage`, keyed by job id.
//!
//! ## Locking
//!
//! | Operation | Lock |
//! |-----------|------|
//! | job `transition` | `SELECT … FOR UPDATE` on the job row |
//! | ledger writes | `SELECT … FOR UPDATE` on the owner's `users` row |
//!
//! ## Error Mapping
//!
//! | SQLx Error | Store error |
//! |------------|-------------|
//! | unique violation (`23505`) on insert | `AlreadyExists` (jobs), idempotent lookup (stories) |
//! | anything else | `Storage` with the operation name |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use datastory_core::{JobId, StoryId, UserId};
use datastory_jobs::{Job, JobTransition, Story};
use datastory_quota::{QuotaSnapshot, Tier};

use super::job_store::{JobStore, JobStoreError, Transitioned};
use super::ledger::{LedgerError, QuotaLedger};
use super::story_store::{StoryStore, StoryStoreError};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        user_id UUID PRIMARY KEY,
        tier TEXT NOT NULL,
        stories_this_period BIGINT NOT NULL DEFAULT 0,
        total_stories_created BIGINT NOT NULL DEFAULT 0,
        period_reset_at TIMESTAMPTZ NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS quota_usage (
        job_id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users (user_id),
        state TEXT NOT NULL CHECK (state IN ('reserved', 'counted')),
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS quota_usage_user_state ON quota_usage (user_id, state)",
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        job_id UUID PRIMARY KEY,
        owner_id UUID NOT NULL,
        status TEXT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        body JSONB NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS jobs_status_updated_at ON jobs (status, updated_at)",
    r#"
    CREATE TABLE IF NOT EXISTS stories (
        story_id UUID PRIMARY KEY,
        job_id UUID NOT NULL UNIQUE,
        owner_id UUID NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        body JSONB NOT NULL
    )
    "#,
];

/// Postgres implementation of all three record stores over one pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for PostgresStore {
    #[instrument(skip(self, job), fields(job_id = %job.id), err)]
    async fn create(&self, job: Job) -> Result<Job, JobStoreError> {
        let body = encode("job", &job).map_err(JobStoreError::Storage)?;
        sqlx::query(
            "INSERT INTO jobs (job_id, owner_id, status, updated_at, body) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(job.id.as_uuid())
        .bind(job.owner_id.as_uuid())
        .bind(job.status.as_str())
        .bind(job.updated_at)
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                JobStoreError::AlreadyExists(job.id)
            } else {
                job_err("create_job")(e)
            }
        })?;
        Ok(job)
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let row = sqlx::query("SELECT body FROM jobs WHERE job_id = $1")
            .bind(job_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(job_err("get_job"))?;
        row.map(|r| decode_job(&r)).transpose()
    }

    #[instrument(skip(self, transition), fields(job_id = %job_id, transition = transition.name()), err)]
    async fn transition(
        &self,
        job_id: JobId,
        transition: JobTransition,
        now: DateTime<Utc>,
    ) -> Result<Transitioned, JobStoreError> {
        let mut tx = self.pool.begin().await.map_err(job_err("begin_transaction"))?;

        let row = sqlx::query("SELECT body FROM jobs WHERE job_id = $1 FOR UPDATE")
            .bind(job_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(job_err("lock_job"))?
            .ok_or(JobStoreError::NotFound(job_id))?;
        let mut job = decode_job(&row)?;

        let outcome = job.apply(transition, now)?;
        if outcome.is_applied() {
            let body = encode("job", &job).map_err(JobStoreError::Storage)?;
            sqlx::query("UPDATE jobs SET status = $2, updated_at = $3, body = $4 WHERE job_id = $1")
                .bind(job_id.as_uuid())
                .bind(job.status.as_str())
                .bind(job.updated_at)
                .bind(body)
                .execute(&mut *tx)
                .await
                .map_err(job_err("update_job"))?;
        }

        tx.commit().await.map_err(job_err("commit"))?;
        Ok(Transitioned { outcome, job })
    }

    async fn list_stale(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<JobId>, JobStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT job_id FROM jobs
            WHERE status = 'processing' AND updated_at < $1
            ORDER BY updated_at ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(job_err("list_stale"))?;

        rows.iter()
            .map(|r| {
                r.try_get::<Uuid, _>("job_id")
                    .map(JobId::from_uuid)
                    .map_err(job_err("list_stale"))
            })
            .collect()
    }
}

#[async_trait]
impl StoryStore for PostgresStore {
    #[instrument(skip(self, story), fields(job_id = %story.job_id, story_id = %story.id), err)]
    async fn insert_for_job(&self, story: Story) -> Result<(Story, bool), StoryStoreError> {
        let body = encode("story", &story).map_err(StoryStoreError::Storage)?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO stories (story_id, job_id, owner_id, created_at, body)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (job_id) DO NOTHING
            "#,
        )
        .bind(story.id.as_uuid())
        .bind(story.job_id.as_uuid())
        .bind(story.owner_id.as_uuid())
        .bind(story.created_at)
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(story_err("insert_story"))?
        .rows_affected()
            == 1;

        if inserted {
            return Ok((story, true));
        }
        let existing = self.find_by_job(story.job_id).await?.ok_or_else(|| {
            StoryStoreError::Storage(format!("story for job {} vanished after conflict", story.job_id))
        })?;
        Ok((existing, false))
    }

    async fn get(&self, story_id: StoryId) -> Result<Option<Story>, StoryStoreError> {
        let row = sqlx::query("SELECT body FROM stories WHERE story_id = $1")
            .bind(story_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(story_err("get_story"))?;
        row.map(|r| decode_story(&r)).transpose()
    }

    async fn find_by_job(&self, job_id: JobId) -> Result<Option<Story>, StoryStoreError> {
        let row = sqlx::query("SELECT body FROM stories WHERE job_id = $1")
            .bind(job_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(story_err("find_story_by_job"))?;
        row.map(|r| decode_story(&r)).transpose()
    }

    async fn remove(&self, story_id: StoryId) -> Result<(), StoryStoreError> {
        sqlx::query("DELETE FROM stories WHERE story_id = $1")
            .bind(story_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(story_err("remove_story"))?;
        Ok(())
    }
}

impl PostgresStore {
    /// Reserve under the owner lock. `rows: None` skips the row ceiling.
    #[instrument(skip(self), fields(user_id = %user_id, job_id = %job_id), err)]
    async fn reserve(
        &self,
        user_id: UserId,
        job_id: JobId,
        rows: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<QuotaSnapshot, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(ledger_err("begin_transaction"))?;
        let mut snapshot = lock_account(&mut tx, user_id, now).await?;

        let existing: Option<String> = sqlx::query_scalar("SELECT state FROM quota_usage WHERE job_id = $1")
            .bind(job_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(ledger_err("find_usage"))?;
        if existing.is_some() {
            tx.commit().await.map_err(ledger_err("commit"))?;
            return Ok(snapshot);
        }

        if let Some(rows) = rows {
            snapshot.check_rows(rows)?;
        }
        snapshot.check_story_slot()?;

        sqlx::query(
            "INSERT INTO quota_usage (job_id, user_id, state, updated_at) VALUES ($1, $2, 'reserved', $3)",
        )
        .bind(job_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(ledger_err("reserve"))?;

        tx.commit().await.map_err(ledger_err("commit"))?;
        snapshot.reserved += 1;
        Ok(snapshot)
    }
}

#[async_trait]
impl QuotaLedger for PostgresStore {
    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn ensure_account(
        &self,
        user_id: UserId,
        tier: Tier,
        now: DateTime<Utc>,
    ) -> Result<QuotaSnapshot, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(ledger_err("begin_transaction"))?;
        sqlx::query(
            r#"
            INSERT INTO users (user_id, tier, period_reset_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE SET tier = EXCLUDED.tier
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(tier.as_str())
        .bind(QuotaSnapshot::new(user_id, tier, now).period_reset_at)
        .execute(&mut *tx)
        .await
        .map_err(ledger_err("upsert_user"))?;

        let snapshot = lock_account(&mut tx, user_id, now).await?;
        tx.commit().await.map_err(ledger_err("commit"))?;
        Ok(snapshot)
    }

    async fn snapshot(&self, user_id: UserId, now: DateTime<Utc>) -> Result<QuotaSnapshot, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(ledger_err("begin_transaction"))?;
        let snapshot = lock_account(&mut tx, user_id, now).await?;
        tx.commit().await.map_err(ledger_err("commit"))?;
        Ok(snapshot)
    }

    async fn try_reserve(
        &self,
        user_id: UserId,
        job_id: JobId,
        rows: u64,
        now: DateTime<Utc>,
    ) -> Result<QuotaSnapshot, LedgerError> {
        self.reserve(user_id, job_id, Some(rows), now).await
    }

    async fn reserve_slot(
        &self,
        user_id: UserId,
        job_id: JobId,
        now: DateTime<Utc>,
    ) -> Result<QuotaSnapshot, LedgerError> {
        self.reserve(user_id, job_id, None, now).await
    }

    async fn release(&self, user_id: UserId, job_id: JobId) -> Result<bool, LedgerError> {
        let released = sqlx::query(
            "DELETE FROM quota_usage WHERE job_id = $1 AND user_id = $2 AND state = 'reserved'",
        )
        .bind(job_id.as_uuid())
        .bind(user_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(ledger_err("release"))?
        .rows_affected();
        Ok(released > 0)
    }

    #[instrument(skip(self), fields(user_id = %user_id, job_id = %job_id), err)]
    async fn record_completion(
        &self,
        user_id: UserId,
        job_id: JobId,
        now: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(ledger_err("begin_transaction"))?;
        lock_account(&mut tx, user_id, now).await?;

        let counted = sqlx::query(
            r#"
            INSERT INTO quota_usage (job_id, user_id, state, updated_at)
            VALUES ($1, $2, 'counted', $3)
            ON CONFLICT (job_id) DO UPDATE
                SET state = 'counted', updated_at = EXCLUDED.updated_at
                WHERE quota_usage.state = 'reserved'
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(ledger_err("count_usage"))?
        .rows_affected()
            == 1;

        if counted {
            sqlx::query(
                r#"
                UPDATE users
                SET stories_this_period = stories_this_period + 1,
                    total_stories_created = total_stories_created + 1
                WHERE user_id = $1
                "#,
            )
            .bind(user_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(ledger_err("increment_counters"))?;
        }

        tx.commit().await.map_err(ledger_err("commit"))?;
        Ok(counted)
    }
}

/// Lock the owner row, apply any due rollover, and return the snapshot.
async fn lock_account(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
    now: DateTime<Utc>,
) -> Result<QuotaSnapshot, LedgerError> {
    let row = sqlx::query(
        r#"
        SELECT tier, stories_this_period, total_stories_created, period_reset_at
        FROM users
        WHERE user_id = $1
        FOR UPDATE
        "#,
    )
    .bind(user_id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(ledger_err("lock_account"))?
    .ok_or(LedgerError::UnknownUser(user_id))?;

    let tier: String = row.try_get("tier").map_err(ledger_err("lock_account"))?;
    let stories: i64 = row.try_get("stories_this_period").map_err(ledger_err("lock_account"))?;
    let total: i64 = row.try_get("total_stories_created").map_err(ledger_err("lock_account"))?;
    let reset_at: DateTime<Utc> = row.try_get("period_reset_at").map_err(ledger_err("lock_account"))?;

    let reserved: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM quota_usage WHERE user_id = $1 AND state = 'reserved'")
            .bind(user_id.as_uuid())
            .fetch_one(&mut **tx)
            .await
            .map_err(ledger_err("count_reservations"))?;

    let mut snapshot = QuotaSnapshot::new(user_id, tier.parse::<Tier>()?, now);
    snapshot.stories_this_period = non_negative(stories);
    snapshot.total_stories_created = non_negative(total);
    snapshot.period_reset_at = reset_at;
    snapshot.reserved = non_negative(reserved);

    if snapshot.roll_over(now) {
        sqlx::query("UPDATE users SET stories_this_period = 0, period_reset_at = $2 WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .bind(snapshot.period_reset_at)
            .execute(&mut **tx)
            .await
            .map_err(ledger_err("roll_over"))?;
    }
    Ok(snapshot)
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

fn encode<T: serde::Serialize>(what: &str, value: &T) -> Result<serde_json::Value, String> {
    serde_json::to_value(value).map_err(|e| format!("failed to encode {what}: {e}"))
}

fn decode_job(row: &PgRow) -> Result<Job, JobStoreError> {
    let body: serde_json::Value = row.try_get("body").map_err(job_err("decode_job"))?;
    serde_json::from_value(body).map_err(|e| JobStoreError::Storage(format!("corrupt job record: {e}")))
}

fn decode_story(row: &PgRow) -> Result<Story, StoryStoreError> {
    let body: serde_json::Value = row.try_get("body").map_err(story_err("decode_story"))?;
    serde_json::from_value(body).map_err(|e| StoryStoreError::Storage(format!("corrupt story record: {e}")))
}

fn job_err(operation: &'static str) -> impl Fn(sqlx::Error) -> JobStoreError {
    move |e| JobStoreError::Storage(map_sqlx_error(operation, e))
}

fn story_err(operation: &'static str) -> impl Fn(sqlx::Error) -> StoryStoreError {
    move |e| StoryStoreError::Storage(map_sqlx_error(operation, e))
}

fn ledger_err(operation: &'static str) -> impl Fn(sqlx::Error) -> LedgerError {
    move |e| LedgerError::Storage(map_sqlx_error(operation, e))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => {
            format!("database error in {}: {}", operation, db_err.message())
        }
        sqlx::Error::PoolClosed => format!("connection pool closed in {}", operation),
        sqlx::Error::RowNotFound => format!("unexpected row not found in {}", operation),
        other => format!("sqlx error in {}: {}", operation, other),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

/// Runs only when `TEST_DATABASE_URL` points at a disposable database.
#[cfg(test)]
mod tests {
    use super::*;
    use datastory_jobs::{DatasetFormat, SourceHandle, Stage, TransitionOutcome};

    async fn store() -> Option<PostgresStore> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let store = PostgresStore::connect(&url).await.ok()?;
        store.migrate().await.ok()?;
        Some(store)
    }

    fn job(owner: UserId) -> Job {
        let source = SourceHandle {
            storage_key: "uploads/u/j/sales.csv".to_string(),
            file_name: "sales.csv".to_string(),
            format: DatasetFormat::Csv,
            size_bytes: 64,
            row_count: 10,
            column_count: 3,
        };
        Job::new(owner, source, serde_json::json!({}), Utc::now())
    }

    #[tokio::test]
    async fn job_transitions_persist() {
        let Some(store) = store().await else { return };
        let job = JobStore::create(&store, job(UserId::new())).await.unwrap();

        let t = store
            .apply_progress(job.id, Some(Stage::Analyzing), Some(40), None, Utc::now())
            .await
            .unwrap();
        assert_eq!(t.outcome, TransitionOutcome::Applied);

        let loaded = JobStore::get(&store, job.id).await.unwrap().unwrap();
        assert_eq!(loaded.progress, 40);
        assert_eq!(loaded.stage, Stage::Analyzing);
    }

    #[tokio::test]
    async fn ledger_counts_each_job_once() {
        let Some(store) = store().await else { return };
        let user = UserId::new();
        let now = Utc::now();
        store.ensure_account(user, Tier::Free, now).await.unwrap();

        let job_id = JobId::new();
        store.try_reserve(user, job_id, 10, now).await.unwrap();
        assert!(store.record_completion(user, job_id, now).await.unwrap());
        assert!(!store.record_completion(user, job_id, now).await.unwrap());

        let q = store.snapshot(user, now).await.unwrap();
        assert_eq!(q.stories_this_period, 1);
        assert_eq!(q.reserved, 0);
    }

    #[tokio::test]
    async fn slot_reservation_ignores_rows_after_a_downgrade() {
        let Some(store) = store().await else { return };
        let user = UserId::new();
        let now = Utc::now();
        store.ensure_account(user, Tier::Professional, now).await.unwrap();
        let job_id = JobId::new();
        store.try_reserve(user, job_id, 5_000, now).await.unwrap();
        assert!(store.release(user, job_id).await.unwrap());

        store.ensure_account(user, Tier::Free, now).await.unwrap();
        assert!(store.try_reserve(user, job_id, 5_000, now).await.is_err());
        let q = store.reserve_slot(user, job_id, now).await.unwrap();
        assert_eq!(q.reserved, 1);
    }
}
