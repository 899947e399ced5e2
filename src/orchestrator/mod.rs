//! Job lifecycle operations: create, list, inspect, cancel and delete.
//!
//! The orchestrator owns the PENDING record and hands execution to a
//! [`JobDispatcher`]; every later transition is made by the execution unit.
//! Cancel only raises the cancellation flag, and the running unit turns it
//! into a CANCELLED record at its next checkpoint.

pub mod error;
pub mod model;

pub use error::{JobError, JobResult};
pub use model::{DatasetRef, JobAccepted, JobCancelled, JobDeleted, JobDetail, JobRequest};

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::{JobContext, JobDispatcher, run_job};
use crate::db::{JobRecord, JobStatus, NimRun};
use crate::types::JobId;

pub struct JobOrchestrator {
    ctx: JobContext,
    dispatcher: Arc<dyn JobDispatcher>,
}

impl JobOrchestrator {
    pub fn new(ctx: JobContext, dispatcher: Arc<dyn JobDispatcher>) -> Self {
        Self { ctx, dispatcher }
    }

    pub fn context(&self) -> &JobContext {
        &self.ctx
    }

    /// Persist a PENDING job and queue its execution. Does not wait for it.
    pub async fn create_job(&self, request: JobRequest) -> JobResult<JobAccepted> {
        request.validate().map_err(JobError::InvalidRequest)?;

        let id = JobId::generate();
        let record = JobRecord {
            id: id.clone(),
            workload_id: request.workload_id.clone(),
            client_id: request.client_id.clone(),
            status: JobStatus::Pending,
            started_at: Utc::now(),
            finished_at: None,
            num_records: 0,
            nims: request.models.iter().map(NimRun::pending).collect(),
            error: None,
        };
        self.ctx.store.insert(&record).await?;

        let work = Box::pin(run_job(self.ctx.clone(), id.clone(), request));
        if let Err(err) = self.dispatcher.submit(id.as_str(), work).await {
            warn!("Could not dispatch job {}: {}", id, err);
            self.ctx
                .store
                .update_status(&id, JobStatus::Failed, Some(err.to_string()))
                .await?;
            return Err(err.into());
        }

        info!(
            "Queued job {} for workload {} ({} model(s))",
            id,
            record.workload_id,
            record.nims.len()
        );
        Ok(JobAccepted {
            message: format!("Customization job {} queued", id),
            id,
            status: "queued".to_string(),
        })
    }

    pub async fn list_jobs(&self) -> JobResult<Vec<JobRecord>> {
        Ok(self.ctx.store.list().await?)
    }

    pub async fn get_job_detail(&self, id: &JobId) -> JobResult<JobDetail> {
        let job = self.find(id).await?;
        let cancellation_requested = self.ctx.cancellations.is_cancelled(id).await?;

        Ok(JobDetail {
            progress: job.progress(),
            cancellation_requested,
            job,
        })
    }

    /// Request cancellation of a PENDING or RUNNING job.
    pub async fn cancel_job(&self, id: &JobId) -> JobResult<JobCancelled> {
        let job = self.find(id).await?;
        if job.status.is_terminal() {
            return Err(JobError::Conflict(format!(
                "Job {} is already {} and cannot be cancelled",
                id, job.status
            )));
        }

        self.ctx.cancellations.set_cancelled(id).await?;
        info!("Cancellation requested for job {}", id);

        Ok(JobCancelled {
            id: id.clone(),
            message: "Cancellation requested; the job stops at its next checkpoint".to_string(),
        })
    }

    /// Delete a terminal job and, best effort, the models it produced.
    pub async fn delete_job(&self, id: &JobId) -> JobResult<JobDeleted> {
        let job = self.find(id).await?;
        if !job.status.is_terminal() {
            return Err(JobError::Conflict(format!(
                "Job {} is still {}; cancel it before deleting",
                id, job.status
            )));
        }

        let Some(deleted) = self.ctx.store.delete(id).await? else {
            return Err(JobError::NotFound(id.clone()));
        };

        let mut remote_cleanup_errors = Vec::new();
        for model in deleted.customized_models() {
            match self.ctx.service.delete_model(model).await {
                Ok(()) => info!("Deleted customized model {}", model),
                Err(e) => {
                    warn!("Failed to delete customized model {}: {}", model, e);
                    remote_cleanup_errors.push(format!("{}: {}", model, e));
                }
            }
        }

        let message = if remote_cleanup_errors.is_empty() {
            format!("Job {} deleted", id)
        } else {
            format!("Job {} deleted; some customized models could not be removed", id)
        };

        Ok(JobDeleted {
            id: id.clone(),
            message,
            remote_cleanup_errors,
        })
    }

    async fn find(&self, id: &JobId) -> JobResult<JobRecord> {
        self.ctx
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| JobError::NotFound(id.clone()))
    }
}
