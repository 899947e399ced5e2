//! Client for the remote model-customization service.
//!
//! [`TrainingService`] is the seam the rest of the crate depends on;
//! [`CustomizerClient`] implements it over HTTP. Every operation is a single
//! request with no retry, and every non-success response becomes a
//! [`CustomizerError`].

pub mod client;
pub mod error;
pub mod model;

pub use client::CustomizerClient;
pub use error::CustomizerError;
pub use model::{
    JobStatusSnapshot, ModelInfo, NO_ERROR_DETAILS, NOT_ENOUGH_RESOURCES, RemoteJobStatus,
    StartedJob, StatusLog, TrainingJobSpec,
};

use async_trait::async_trait;
use std::collections::HashSet;

use crate::types::CustomizationJobId;

#[async_trait]
pub trait TrainingService: Send + Sync {
    /// Launch a customization job.
    async fn start_job(&self, spec: &TrainingJobSpec) -> Result<StartedJob, CustomizerError>;

    /// Fetch the current status of a customization job.
    async fn get_status(
        &self,
        job_id: &CustomizationJobId,
    ) -> Result<JobStatusSnapshot, CustomizerError>;

    /// Fetch metadata for a (customized) model.
    async fn get_model_info(&self, model_name: &str) -> Result<ModelInfo, CustomizerError>;

    /// Ids of every model the deployment registry currently serves.
    async fn list_deployed_models(&self) -> Result<HashSet<String>, CustomizerError>;

    /// Delete a customized model after verifying it exists.
    async fn delete_model(&self, model_name: &str) -> Result<(), CustomizerError>;

    /// Ask the service to stop a customization job.
    async fn cancel_remote_job(&self, job_id: &CustomizationJobId) -> Result<(), CustomizerError>;
}
