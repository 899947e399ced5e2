// Core modules
mod cancellation;
mod config;
mod customizer;
mod db;
mod poll;
mod types;
pub mod api;

// Job lifecycle
mod core;
mod orchestrator;

#[cfg(test)]
mod testing;

// Re-export key types and functions
pub use cancellation::{CancellationGate, CancellationStore, InMemoryCancellationStore};
pub use config::{LoraConfig, OrchestratorConfig, PollConfig, TrainingConfig};
pub use crate::core::{DispatchError, JobContext, JobDispatcher, TokioDispatcher, WorkUnit, run_job};
pub use customizer::{
    CustomizerClient, CustomizerError, JobStatusSnapshot, ModelInfo, RemoteJobStatus, StartedJob,
    StatusLog, TrainingJobSpec, TrainingService,
};
pub use db::{
    DatabaseConfig, JobRecord, JobStatus, JobStore, NimRun, NimRunStatus,
    SurrealCancellationStore, SurrealJobStore, create_connection, ensure_schema,
};
pub use orchestrator::{
    DatasetRef, JobAccepted, JobCancelled, JobDeleted, JobDetail, JobError, JobOrchestrator,
    JobRequest, JobResult,
};
pub use poll::{
    NoProgress, PollSettings, PollState, ProgressReporter, ProgressUpdate, WaitError,
    wait_for_customization, wait_for_model_sync,
};
pub use types::{CustomizationJobId, JobId};

use anyhow::Result;
use std::sync::Arc;

/// Convenience function to build a fully wired orchestrator.
///
/// Connects to the database, ensures the schema, and wires the HTTP training
/// client, the SurrealDB stores and a tokio dispatcher together.
pub async fn create_orchestrator(
    config: OrchestratorConfig,
    db_config: DatabaseConfig,
) -> Result<Arc<JobOrchestrator>> {
    let db = create_connection(db_config).await?;
    ensure_schema(&db).await?;

    let service = CustomizerClient::new(&config)?;
    let ctx = JobContext::new(
        Arc::new(config),
        Arc::new(service),
        Arc::new(SurrealJobStore::new(db.clone())),
        Arc::new(SurrealCancellationStore::new(db)),
    );

    Ok(Arc::new(JobOrchestrator::new(
        ctx,
        Arc::new(TokioDispatcher::new()),
    )))
}
