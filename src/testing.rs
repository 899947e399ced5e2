//! Scripted collaborators shared by the unit tests.

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::cancellation::CancellationStore;
use crate::customizer::{
    CustomizerError, JobStatusSnapshot, ModelInfo, RemoteJobStatus, StartedJob, StatusLog,
    TrainingJobSpec, TrainingService,
};
use crate::poll::{ProgressReporter, ProgressUpdate};
use crate::types::{CustomizationJobId, JobId};

pub(crate) const STUB_NAMESPACE: &str = "test-ns";

pub(crate) fn snapshot(status: RemoteJobStatus, percentage_done: f64) -> JobStatusSnapshot {
    JobStatusSnapshot {
        percentage_done,
        ..JobStatusSnapshot::new(status)
    }
}

pub(crate) fn running(percentage_done: f64) -> JobStatusSnapshot {
    JobStatusSnapshot {
        epochs_completed: (percentage_done / 50.0) as u64,
        steps_completed: (percentage_done * 10.0) as u64,
        ..snapshot(RemoteJobStatus::Running, percentage_done)
    }
}

pub(crate) fn completed() -> JobStatusSnapshot {
    JobStatusSnapshot {
        epochs_completed: 2,
        steps_completed: 1000,
        ..snapshot(RemoteJobStatus::Completed, 100.0)
    }
}

pub(crate) fn with_logs(
    mut snapshot: JobStatusSnapshot,
    logs: &[(Option<&str>, Option<&str>)],
) -> JobStatusSnapshot {
    snapshot.status_logs = logs
        .iter()
        .map(|(message, detail)| StatusLog {
            message: message.map(str::to_string),
            detail: detail.map(str::to_string),
        })
        .collect();
    snapshot
}

/// In-process stand-in for the customization service.
///
/// Status polls pop scripted responses in order and repeat the last snapshot
/// once the script runs out. Started jobs show up in the deployment listing
/// after `sync_after` listing calls.
pub(crate) struct StubTrainingService {
    statuses: Mutex<VecDeque<Result<JobStatusSnapshot, CustomizerError>>>,
    last_status: Mutex<Option<JobStatusSnapshot>>,
    sync_after: usize,
    fail_start: bool,
    fail_delete: bool,
    cancel_on_list: Option<(Arc<dyn CancellationStore>, JobId)>,
    pub status_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub started: Mutex<Vec<TrainingJobSpec>>,
    pub deployed: Mutex<HashSet<String>>,
    pub cancelled: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
}

impl StubTrainingService {
    pub(crate) fn new() -> Self {
        Self {
            statuses: Mutex::new(VecDeque::new()),
            last_status: Mutex::new(None),
            sync_after: 0,
            fail_start: false,
            fail_delete: false,
            cancel_on_list: None,
            status_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
            deployed: Mutex::new(HashSet::new()),
            cancelled: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_statuses(self, statuses: Vec<JobStatusSnapshot>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into_iter().map(Ok).collect();
        self
    }

    pub(crate) fn with_status_error(self, status: u16) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .push_back(Err(CustomizerError::RemoteService {
                operation: "get job status",
                status,
                body: "stub failure".to_string(),
            }));
        self
    }

    pub(crate) fn syncing_after(mut self, list_calls: usize) -> Self {
        self.sync_after = list_calls;
        self
    }

    pub(crate) fn never_syncing(self) -> Self {
        self.syncing_after(usize::MAX)
    }

    pub(crate) fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub(crate) fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    /// Flags `run_id` as cancelled from inside every deployment listing.
    pub(crate) fn cancelling_on_list(
        mut self,
        store: Arc<dyn CancellationStore>,
        run_id: JobId,
    ) -> Self {
        self.cancel_on_list = Some((store, run_id));
        self
    }

    pub(crate) fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrainingService for StubTrainingService {
    async fn start_job(&self, spec: &TrainingJobSpec) -> Result<StartedJob, CustomizerError> {
        if self.fail_start {
            return Err(CustomizerError::RemoteService {
                operation: "start training job",
                status: 422,
                body: "invalid dataset".to_string(),
            });
        }

        let mut started = self.started.lock().unwrap();
        started.push(spec.clone());
        let output_model = format!("{}/{}", STUB_NAMESPACE, spec.output_model_name);
        self.deployed.lock().unwrap().insert(output_model.clone());

        Ok(StartedJob {
            job_id: CustomizationJobId::new(format!("cust-{}", started.len())),
            output_model,
        })
    }

    async fn get_status(
        &self,
        _job_id: &CustomizationJobId,
    ) -> Result<JobStatusSnapshot, CustomizerError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        let next = self.statuses.lock().unwrap().pop_front();
        match next {
            Some(Ok(snapshot)) => {
                *self.last_status.lock().unwrap() = Some(snapshot.clone());
                Ok(snapshot)
            }
            Some(Err(err)) => Err(err),
            None => Ok(self
                .last_status
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| running(0.0))),
        }
    }

    async fn get_model_info(&self, model_name: &str) -> Result<ModelInfo, CustomizerError> {
        Ok(ModelInfo {
            name: Some(model_name.to_string()),
            ..Default::default()
        })
    }

    async fn list_deployed_models(&self) -> Result<HashSet<String>, CustomizerError> {
        let calls = self.list_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((store, run_id)) = &self.cancel_on_list {
            store.set_cancelled(run_id).await.unwrap();
        }
        if calls <= self.sync_after {
            return Ok(HashSet::from(["meta/llama-base".to_string()]));
        }
        Ok(self.deployed.lock().unwrap().clone())
    }

    async fn delete_model(&self, model_name: &str) -> Result<(), CustomizerError> {
        if self.fail_delete {
            return Err(CustomizerError::ModelUnavailable {
                model: model_name.to_string(),
                source: Box::new(CustomizerError::RemoteService {
                    operation: "get model info",
                    status: 404,
                    body: "not found".to_string(),
                }),
            });
        }
        self.deleted.lock().unwrap().push(model_name.to_string());
        Ok(())
    }

    async fn cancel_remote_job(&self, job_id: &CustomizationJobId) -> Result<(), CustomizerError> {
        self.cancelled.lock().unwrap().push(job_id.to_string());
        Ok(())
    }
}

/// Reporter that keeps every update for later assertions.
#[derive(Default)]
pub(crate) struct RecordingProgress {
    pub updates: Mutex<Vec<ProgressUpdate>>,
}

impl RecordingProgress {
    pub(crate) fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressReporter for RecordingProgress {
    async fn report(&self, update: ProgressUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}
