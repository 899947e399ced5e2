//! Job record persistence.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::Db;
use crate::db::schema::{JobRecord, JobStatus, NimRun};
use crate::types::JobId;

/// Record store consumed by the orchestrator and the execution unit.
///
/// Every operation is atomic per job id.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, record: &JobRecord) -> Result<()>;

    async fn find_by_id(&self, id: &JobId) -> Result<Option<JobRecord>>;

    /// All jobs, newest first.
    async fn list(&self) -> Result<Vec<JobRecord>>;

    /// Move a job to `status`, but only while it is still PENDING or RUNNING.
    ///
    /// Returns `false` when the job is missing or already terminal; the
    /// record is then left untouched. `finished_at` is stamped for terminal
    /// target statuses.
    async fn update_status(
        &self,
        id: &JobId,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<bool>;

    /// Replace the per-model sub-results.
    async fn update_nims(&self, id: &JobId, nims: &[NimRun]) -> Result<()>;

    /// Add to the accumulated record count.
    async fn add_records(&self, id: &JobId, count: u64) -> Result<()>;

    /// Remove a job, returning what was deleted.
    async fn delete(&self, id: &JobId) -> Result<Option<JobRecord>>;
}

/// [`JobStore`] backed by SurrealDB, one `job` record per job id.
#[derive(Clone)]
pub struct SurrealJobStore {
    db: Db,
}

impl SurrealJobStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl JobStore for SurrealJobStore {
    async fn insert(&self, record: &JobRecord) -> Result<()> {
        let query = "CREATE type::thing('job', $job_id) CONTENT $record";

        let mut res = self
            .db
            .query(query)
            .bind(("job_id", record.id.to_string()))
            .bind(("record", record.clone()))
            .await?;

        let created: Vec<JobRecord> = res.take(0)?;
        if created.is_empty() {
            return Err(anyhow!("Failed to create job {}", record.id));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &JobId) -> Result<Option<JobRecord>> {
        let query = "SELECT * FROM type::thing('job', $job_id)";

        let mut res = self
            .db
            .query(query)
            .bind(("job_id", id.to_string()))
            .await?;

        let jobs: Vec<JobRecord> = res.take(0)?;
        Ok(jobs.into_iter().next())
    }

    async fn list(&self) -> Result<Vec<JobRecord>> {
        let query = "SELECT * FROM job ORDER BY started_at DESC";

        let mut res = self.db.query(query).await?;
        let jobs: Vec<JobRecord> = res.take(0)?;
        Ok(jobs)
    }

    async fn update_status(
        &self,
        id: &JobId,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<bool> {
        let finished_at: Option<DateTime<Utc>> = status.is_terminal().then(Utc::now);

        let query = r#"
            UPDATE type::thing('job', $job_id) SET
                status = $status,
                error = $error,
                finished_at = $finished_at
            WHERE status IN $active
            RETURN AFTER
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("job_id", id.to_string()))
            .bind(("status", status))
            .bind(("error", error))
            .bind(("finished_at", finished_at))
            .bind(("active", JobStatus::ACTIVE.to_vec()))
            .await?;

        let updated: Vec<JobRecord> = res.take(0)?;
        Ok(!updated.is_empty())
    }

    async fn update_nims(&self, id: &JobId, nims: &[NimRun]) -> Result<()> {
        let query = "UPDATE type::thing('job', $job_id) SET nims = $nims";

        self.db
            .query(query)
            .bind(("job_id", id.to_string()))
            .bind(("nims", nims.to_vec()))
            .await?
            .check()?;

        Ok(())
    }

    async fn add_records(&self, id: &JobId, count: u64) -> Result<()> {
        let query = "UPDATE type::thing('job', $job_id) SET num_records += $count";

        self.db
            .query(query)
            .bind(("job_id", id.to_string()))
            .bind(("count", count))
            .await?
            .check()?;

        Ok(())
    }

    async fn delete(&self, id: &JobId) -> Result<Option<JobRecord>> {
        let query = "DELETE type::thing('job', $job_id) RETURN BEFORE";

        let mut res = self
            .db
            .query(query)
            .bind(("job_id", id.to_string()))
            .await?;

        let deleted: Vec<JobRecord> = res.take(0)?;
        Ok(deleted.into_iter().next())
    }
}
