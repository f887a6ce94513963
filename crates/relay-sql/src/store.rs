use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::str::FromStr;

use crate::error::StoreError;
use crate::model::{JobUpdate, NewJob, Outcome, RelayJob, Status, StatusCounts};

/// Store is the single-writer, crash-safe home for every [`RelayJob`]. It is
/// the only thing the intake API, the poller, and the submitter share;
/// components never call each other, they only read and write through here.
///
/// Backed by SQLite in WAL journal mode with full fsync durability: a write
/// that `Store::create`/`Store::update` reports as successful survives an OS
/// crash, not merely a process crash, which is what lets the submitter's
/// restart-recovery sweep (see `relay-daemon::submitter::recover`) trust the
/// `submitted` rows it finds on startup.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if absent) the database at `db_path` and applies
    /// pending migrations. Safe to call concurrently with another process
    /// only in the sense that SQLite's own file locking arbitrates it; this
    /// design assumes a single writer process, per the orchestrator's
    /// single-writer Non-goal.
    pub async fn connect(db_path: &str) -> Result<Self, StoreError> {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{db_path}"))
            .map_err(sqlx::Error::from)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Full);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!(db_path, "job store opened");
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn connect_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Inserts a new `pending` row. Fails with [`StoreError::Conflict`] and
    /// mutates nothing if `tx_hash` already exists; callers (intake) resolve
    /// idempotent replay themselves by calling [`Store::get`] first.
    pub async fn create(&self, job: NewJob) -> Result<RelayJob, StoreError> {
        let now = Utc::now();
        let tx_hash = job.tx_hash.to_lowercase();

        let result = sqlx::query(
            r#"
            INSERT INTO relay_jobs
                (tx_hash, source_domain, status, poll_attempts, retry_count, created_at, updated_at)
            VALUES
                (?, ?, 'pending', 0, 0, ?, ?)
            "#,
        )
        .bind(&tx_hash)
        .bind(job.source_domain)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => self.get(&tx_hash).await,
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::Conflict(tx_hash))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Fetches a job by its primary key, normalizing case first.
    pub async fn get(&self, tx_hash: &str) -> Result<RelayJob, StoreError> {
        let tx_hash = tx_hash.to_lowercase();
        sqlx::query_as::<_, RelayJob>("SELECT * FROM relay_jobs WHERE tx_hash = ?")
            .bind(&tx_hash)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(tx_hash))
    }

    /// Like [`Store::get`], but returns `None` instead of an error when the
    /// row doesn't exist. Used by intake to implement idempotent replay
    /// without treating "not found" as exceptional.
    pub async fn try_get(&self, tx_hash: &str) -> Result<Option<RelayJob>, StoreError> {
        let tx_hash = tx_hash.to_lowercase();
        Ok(
            sqlx::query_as::<_, RelayJob>("SELECT * FROM relay_jobs WHERE tx_hash = ?")
                .bind(&tx_hash)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Applies one state transition to `tx_hash` atomically, always
    /// refreshing `updated_at`, and returns the row as it now stands.
    pub async fn update(&self, tx_hash: &str, update: JobUpdate) -> Result<RelayJob, StoreError> {
        let tx_hash = tx_hash.to_lowercase();
        let now = Utc::now();

        match update {
            JobUpdate::MarkPolling => {
                sqlx::query(
                    "UPDATE relay_jobs SET status = 'polling', updated_at = ? WHERE tx_hash = ?",
                )
                .bind(now)
                .bind(&tx_hash)
                .execute(&self.pool)
                .await?;
            }
            JobUpdate::PollAttemptNoResult => {
                sqlx::query(
                    "UPDATE relay_jobs SET poll_attempts = poll_attempts + 1, updated_at = ? WHERE tx_hash = ?",
                )
                .bind(now)
                .bind(&tx_hash)
                .execute(&self.pool)
                .await?;
            }
            JobUpdate::Attested {
                attested_message,
                attestation,
                attestation_nonce,
                mint_recipient,
                destination_domain,
                amount,
            } => {
                sqlx::query(
                    r#"
                    UPDATE relay_jobs SET
                        status = 'attested',
                        attested_message = ?,
                        attestation = ?,
                        attestation_nonce = ?,
                        mint_recipient = ?,
                        destination_domain = ?,
                        amount = ?,
                        poll_attempts = poll_attempts + 1,
                        attested_at = ?,
                        updated_at = ?
                    WHERE tx_hash = ?
                    "#,
                )
                .bind(attested_message)
                .bind(attestation)
                .bind(attestation_nonce)
                .bind(mint_recipient)
                .bind(destination_domain)
                .bind(amount)
                .bind(now)
                .bind(now)
                .bind(&tx_hash)
                .execute(&self.pool)
                .await?;
            }
            JobUpdate::Submitted { dest_tx_hash } => {
                sqlx::query(
                    r#"
                    UPDATE relay_jobs SET
                        status = 'submitted',
                        dest_tx_hash = ?,
                        submitted_at = ?,
                        updated_at = ?
                    WHERE tx_hash = ?
                    "#,
                )
                .bind(dest_tx_hash)
                .bind(now)
                .bind(now)
                .bind(&tx_hash)
                .execute(&self.pool)
                .await?;
            }
            JobUpdate::Confirmed {
                outcome,
                dest_block_number,
            } => {
                sqlx::query(
                    r#"
                    UPDATE relay_jobs SET
                        status = 'confirmed',
                        outcome = ?,
                        dest_block_number = ?,
                        confirmed_at = ?,
                        updated_at = ?
                    WHERE tx_hash = ?
                    "#,
                )
                .bind(outcome)
                .bind(dest_block_number)
                .bind(now)
                .bind(now)
                .bind(&tx_hash)
                .execute(&self.pool)
                .await?;
            }
            JobUpdate::Failed { error_message } => {
                sqlx::query(
                    r#"
                    UPDATE relay_jobs SET
                        status = 'failed',
                        error_message = ?,
                        retry_count = retry_count + 1,
                        updated_at = ?
                    WHERE tx_hash = ?
                    "#,
                )
                .bind(error_message)
                .bind(now)
                .bind(&tx_hash)
                .execute(&self.pool)
                .await?;
            }
            JobUpdate::PollerFailed { error_message } => {
                sqlx::query(
                    r#"
                    UPDATE relay_jobs SET
                        status = 'failed',
                        error_message = ?,
                        updated_at = ?
                    WHERE tx_hash = ?
                    "#,
                )
                .bind(error_message)
                .bind(now)
                .bind(&tx_hash)
                .execute(&self.pool)
                .await?;
            }
            JobUpdate::TransientRetry { error_message } => {
                sqlx::query(
                    r#"
                    UPDATE relay_jobs SET
                        status = 'attested',
                        error_message = ?,
                        retry_count = retry_count + 1,
                        updated_at = ?
                    WHERE tx_hash = ?
                    "#,
                )
                .bind(error_message)
                .bind(now)
                .bind(&tx_hash)
                .execute(&self.pool)
                .await?;
            }
        }

        self.get(&tx_hash).await
    }

    /// Returns up to `limit` jobs whose status is one of `statuses`, oldest
    /// `created_at` first. Used by the poller to select its per-cycle batch.
    pub async fn list_by_status(
        &self,
        statuses: &[Status],
        limit: i64,
    ) -> Result<Vec<RelayJob>, StoreError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM relay_jobs WHERE status IN (");
        let mut separated = qb.separated(", ");
        for status in statuses {
            separated.push_bind(*status);
        }
        separated.push_unseparated(") ORDER BY created_at ASC LIMIT ");
        qb.push_bind(limit);

        Ok(qb.build_query_as::<RelayJob>().fetch_all(&self.pool).await?)
    }

    /// Returns the single oldest job in `status`, if any. Used by the
    /// submitter, which processes strictly one job at a time.
    pub async fn oldest_by_status(&self, status: Status) -> Result<Option<RelayJob>, StoreError> {
        Ok(sqlx::query_as::<_, RelayJob>(
            "SELECT * FROM relay_jobs WHERE status = ? ORDER BY created_at ASC LIMIT 1",
        )
        .bind(status)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Per-status row counts, backing the `/health` endpoint.
    pub async fn count_by_status(&self) -> Result<StatusCounts, StoreError> {
        let rows: Vec<(Status, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM relay_jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            match status {
                Status::Pending => counts.pending = count,
                Status::Polling => counts.polling = count,
                Status::Attested => counts.attested = count,
                Status::Submitted => counts.submitted = count,
                Status::Confirmed => counts.confirmed = count,
                Status::Failed => counts.failed = count,
            }
        }
        Ok(counts)
    }

    /// A trivial liveness probe for `/health`: the store answered at all.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Outcome needs no separate mapping; it derives `sqlx::Type` directly and
// binds/decodes like any other TEXT column.
#[allow(dead_code)]
fn _assert_outcome_is_sqlx_type(_: Outcome) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let store = Store::connect_in_memory().await.unwrap();
        let job = store
            .create(NewJob {
                tx_hash: "0xAAAA000000000000000000000000000000000000000000000000000000000000"
                    .to_string(),
                source_domain: 3,
            })
            .await
            .unwrap();

        assert_eq!(job.status, Status::Pending);
        assert_eq!(job.poll_attempts, 0);
        assert_eq!(job.retry_count, 0);
        assert!(job.outcome.is_none());

        // normalized to lowercase on insert
        assert!(job.tx_hash.chars().all(|c| !c.is_ascii_uppercase()));
    }

    #[tokio::test]
    async fn create_conflict_does_not_mutate() {
        let store = Store::connect_in_memory().await.unwrap();
        let tx_hash = "0xbbbb000000000000000000000000000000000000000000000000000000000000";
        store
            .create(NewJob {
                tx_hash: tx_hash.to_string(),
                source_domain: 3,
            })
            .await
            .unwrap();

        let before = store.get(tx_hash).await.unwrap();

        let err = store
            .create(NewJob {
                tx_hash: tx_hash.to_string(),
                source_domain: 9,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let after = store.get(tx_hash).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn transitions_refresh_updated_at_and_set_fields() {
        let store = Store::connect_in_memory().await.unwrap();
        let tx_hash = "0xcccc000000000000000000000000000000000000000000000000000000000000";
        let created = store
            .create(NewJob {
                tx_hash: tx_hash.to_string(),
                source_domain: 3,
            })
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let attested = store
            .update(
                tx_hash,
                JobUpdate::Attested {
                    attested_message: "0x00".into(),
                    attestation: "0x01".into(),
                    attestation_nonce: "0x02".into(),
                    mint_recipient: "0x03".into(),
                    destination_domain: 0,
                    amount: "1000".into(),
                },
            )
            .await
            .unwrap();

        assert_eq!(attested.status, Status::Attested);
        assert_eq!(attested.poll_attempts, 1);
        assert!(attested.attested_at.is_some());
        assert!(attested.updated_at >= created.updated_at);

        let failed = store
            .update(
                tx_hash,
                JobUpdate::Failed {
                    error_message: "transfer settled".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(failed.status, Status::Failed);
        assert_eq!(failed.retry_count, 1);
        assert_eq!(failed.error_message.as_deref(), Some("transfer settled"));
    }

    #[tokio::test]
    async fn poller_failed_leaves_retry_count_untouched() {
        let store = Store::connect_in_memory().await.unwrap();
        let tx_hash = "0xeeee000000000000000000000000000000000000000000000000000000000000";
        store
            .create(NewJob {
                tx_hash: tx_hash.to_string(),
                source_domain: 3,
            })
            .await
            .unwrap();

        let failed = store
            .update(
                tx_hash,
                JobUpdate::PollerFailed {
                    error_message: "attestation_timeout".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(failed.status, Status::Failed);
        assert_eq!(failed.retry_count, 0);
        assert_eq!(failed.error_message.as_deref(), Some("attestation_timeout"));
    }

    #[tokio::test]
    async fn list_by_status_is_oldest_first_and_bounded() {
        let store = Store::connect_in_memory().await.unwrap();
        for i in 0..5 {
            store
                .create(NewJob {
                    tx_hash: format!("0x{:064x}", i),
                    source_domain: 3,
                })
                .await
                .unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let page = store
            .list_by_status(&[Status::Pending], 3)
            .await
            .unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].tx_hash, format!("0x{:064x}", 0));
        assert_eq!(page[1].tx_hash, format!("0x{:064x}", 1));
    }

    #[tokio::test]
    async fn count_by_status_reflects_rows() {
        let store = Store::connect_in_memory().await.unwrap();
        store
            .create(NewJob {
                tx_hash: "0xdddd000000000000000000000000000000000000000000000000000000000000"
                    .to_string(),
                source_domain: 3,
            })
            .await
            .unwrap();

        let counts = store.count_by_status().await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.confirmed, 0);
    }
}
