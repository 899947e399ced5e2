// End-to-end execution of one job: start, wait, sync, record the outcome

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::cancellation::{CancellationGate, CancellationStore};
use crate::config::OrchestratorConfig;
use crate::customizer::{TrainingJobSpec, TrainingService};
use crate::db::{JobStatus, JobStore, NimRun, NimRunStatus};
use crate::orchestrator::JobRequest;
use crate::poll::{
    PollSettings, ProgressReporter, ProgressUpdate, WaitError, wait_for_customization,
    wait_for_model_sync,
};
use crate::types::JobId;

/// Collaborators shared by every job execution.
#[derive(Clone)]
pub struct JobContext {
    pub config: Arc<OrchestratorConfig>,
    pub customization: PollSettings,
    pub model_sync: PollSettings,
    pub service: Arc<dyn TrainingService>,
    pub store: Arc<dyn JobStore>,
    pub cancellations: Arc<dyn CancellationStore>,
}

impl JobContext {
    pub fn new(
        config: Arc<OrchestratorConfig>,
        service: Arc<dyn TrainingService>,
        store: Arc<dyn JobStore>,
        cancellations: Arc<dyn CancellationStore>,
    ) -> Self {
        Self {
            customization: config.customization_settings(),
            model_sync: config.model_sync_settings(),
            config,
            service,
            store,
            cancellations,
        }
    }
}

/// Remote resource names derived for one model of a job.
pub(crate) fn training_spec(
    config: &OrchestratorConfig,
    job_id: &JobId,
    request: &JobRequest,
    model_name: &str,
) -> TrainingJobSpec {
    let model_slug = model_name.replace('/', "-");
    TrainingJobSpec {
        name: format!("customization-{}-{}", request.workload_id, model_slug),
        base_model: model_name.to_string(),
        output_model_name: format!("customized-{}-{}", model_slug, job_id.short()),
        dataset_name: request.dataset.name.clone(),
        dataset_namespace: request
            .dataset
            .namespace
            .clone()
            .unwrap_or_else(|| config.namespace.clone()),
        hyperparameters: request
            .training
            .clone()
            .unwrap_or_else(|| config.training.clone()),
    }
}

/// Per-model results of a running job, written through to the store on
/// every change.
struct NimLedger {
    job_id: JobId,
    store: Arc<dyn JobStore>,
    nims: Mutex<Vec<NimRun>>,
}

impl NimLedger {
    async fn update(&self, index: usize, change: impl FnOnce(&mut NimRun)) -> Result<()> {
        let mut nims = self.nims.lock().await;
        let nim = nims
            .get_mut(index)
            .ok_or_else(|| anyhow!("Job {} has no model at index {}", self.job_id, index))?;
        change(nim);
        self.store.update_nims(&self.job_id, &nims).await
    }

    /// Finish `index` with `status` and every later model with `rest`.
    async fn finish_from(
        &self,
        index: usize,
        status: NimRunStatus,
        error: Option<String>,
        rest: NimRunStatus,
    ) -> Result<()> {
        let mut nims = self.nims.lock().await;
        for (i, nim) in nims.iter_mut().enumerate().skip(index) {
            if i == index {
                nim.finish(status, error.clone());
            } else if !nim.status.is_finished() {
                nim.finish(rest, None);
            }
        }
        self.store.update_nims(&self.job_id, &nims).await
    }
}

/// Progress sink that records updates on one model of the job.
struct StoreProgress<'a> {
    ledger: &'a NimLedger,
    index: usize,
}

#[async_trait]
impl ProgressReporter for StoreProgress<'_> {
    async fn report(&self, update: ProgressUpdate) {
        let result = self
            .ledger
            .update(self.index, |nim| match update.error {
                Some(message) => nim.error = Some(message),
                None => {
                    nim.progress = update.progress;
                    nim.epochs_completed = update.epochs_completed;
                    nim.steps_completed = update.steps_completed;
                }
            })
            .await;

        if let Err(e) = result {
            warn!("Failed to record progress for job {}: {}", self.ledger.job_id, e);
        }
    }
}

/// Run a job to a terminal status.
///
/// Never returns an error: every outcome is written to the job record.
pub async fn run_job(ctx: JobContext, job_id: JobId, request: JobRequest) {
    let record = match ctx.store.find_by_id(&job_id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            warn!("Job {} disappeared before it started", job_id);
            return;
        }
        Err(e) => {
            error!("Failed to load job {}: {}", job_id, e);
            return;
        }
    };

    let gate = CancellationGate::new(ctx.cancellations.clone(), job_id.clone());
    let ledger = NimLedger {
        job_id: job_id.clone(),
        store: ctx.store.clone(),
        nims: Mutex::new(record.nims),
    };
    let model_names: Vec<String> = ledger
        .nims
        .lock()
        .await
        .iter()
        .map(|nim| nim.model_name.clone())
        .collect();

    info!("Starting job {} for {} model(s)", job_id, model_names.len());

    for (index, model_name) in model_names.iter().enumerate() {
        let result = run_nim(&ctx, &job_id, &request, &gate, &ledger, index, model_name).await;
        let Err(err) = result else {
            continue;
        };

        let cancelled = err
            .downcast_ref::<WaitError>()
            .is_some_and(WaitError::is_cancellation);

        let (nim_status, rest, job_status, message) = if cancelled {
            info!("Job {} cancelled during {}", job_id, model_name);
            (
                NimRunStatus::Cancelled,
                NimRunStatus::Cancelled,
                JobStatus::Cancelled,
                None,
            )
        } else {
            error!("Job {} failed on {}: {}", job_id, model_name, err);
            let message = err.to_string();
            (
                NimRunStatus::Failed,
                NimRunStatus::Skipped,
                JobStatus::Failed,
                Some(message),
            )
        };

        if let Err(e) = ledger.finish_from(index, nim_status, message.clone(), rest).await {
            warn!("Failed to record model results for job {}: {}", job_id, e);
        }
        finish(&ctx, &job_id, job_status, message).await;
        return;
    }

    finish(&ctx, &job_id, JobStatus::Completed, None).await;
}

async fn finish(ctx: &JobContext, job_id: &JobId, status: JobStatus, message: Option<String>) {
    match ctx.store.update_status(job_id, status, message).await {
        Ok(true) => info!("Job {} finished as {}", job_id, status),
        Ok(false) => warn!("Job {} was already terminal; {} not recorded", job_id, status),
        Err(e) => error!("Failed to record {} for job {}: {}", status, job_id, e),
    }
}

async fn run_nim(
    ctx: &JobContext,
    job_id: &JobId,
    request: &JobRequest,
    gate: &CancellationGate,
    ledger: &NimLedger,
    index: usize,
    model_name: &str,
) -> Result<()> {
    gate.check().await?;

    let spec = training_spec(&ctx.config, job_id, request, model_name);
    let started = ctx
        .service
        .start_job(&spec)
        .await
        .map_err(WaitError::from)?;
    info!(
        "Job {}: started customization {} producing {}",
        job_id, started.job_id, started.output_model
    );

    ledger
        .update(index, |nim| {
            nim.status = NimRunStatus::Running;
            nim.customization_job_id = Some(started.job_id.clone());
            nim.customized_model = Some(started.output_model.clone());
            nim.started_at = Some(Utc::now());
        })
        .await?;

    if index == 0 {
        if !ctx.store.update_status(job_id, JobStatus::Running, None).await? {
            warn!("Job {} left the pending state before it could start", job_id);
        }
        ctx.store
            .add_records(job_id, request.dataset.num_records)
            .await?;
    }

    let reporter = StoreProgress { ledger, index };
    let waited = wait_for_customization(
        ctx.service.as_ref(),
        &started.job_id,
        gate,
        ctx.customization,
        &reporter,
    )
    .await;

    if let Err(err) = waited {
        if err.is_cancellation() {
            if let Err(e) = ctx.service.cancel_remote_job(&started.job_id).await {
                warn!("Failed to cancel customization {}: {}", started.job_id, e);
            }
        }
        return Err(err.into());
    }

    wait_for_model_sync(
        ctx.service.as_ref(),
        &started.output_model,
        gate,
        ctx.model_sync,
    )
    .await?;

    ledger
        .update(index, |nim| nim.finish(NimRunStatus::Completed, None))
        .await?;
    Ok(())
}
