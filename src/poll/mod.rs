//! Poll-wait loops for remote customization jobs.
//!
//! [`wait_for_customization`] follows one remote job until it finishes,
//! declaring it stalled when the reported percentage stops strictly
//! increasing for longer than the configured timeout.
//! [`wait_for_model_sync`] waits for the customized model to show up in the
//! deployment registry. Both loops consult a [`CancellationGate`] at the head
//! of every iteration and while sleeping.

pub mod error;
pub mod progress;

pub use error::WaitError;
pub use progress::{NoProgress, ProgressReporter, ProgressUpdate};

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cancellation::CancellationGate;
use crate::customizer::{JobStatusSnapshot, RemoteJobStatus, TrainingService};
use crate::types::CustomizationJobId;

/// Timing of one wait loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Pause between two remote calls.
    pub interval: Duration,
    /// Stall window for customization, total budget for model sync.
    pub timeout: Duration,
    /// Granularity at which the cancellation flag is re-read during a pause.
    pub cancel_check_slice: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(3600),
            cancel_check_slice: Duration::from_secs(1),
        }
    }
}

/// Where the customization loop believes the remote job is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Pending,
    Created,
    Running,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
    UnknownFatal,
}

impl PollState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Created | Self::Running)
    }

    fn from_remote(status: &RemoteJobStatus) -> Self {
        match status {
            RemoteJobStatus::Pending => Self::Pending,
            RemoteJobStatus::Created => Self::Created,
            RemoteJobStatus::Running => Self::Running,
            RemoteJobStatus::Completed => Self::Completed,
            RemoteJobStatus::Failed => Self::Failed,
            RemoteJobStatus::Unknown(_) => Self::UnknownFatal,
        }
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Created => "created",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
            Self::UnknownFatal => "unknown",
        };
        f.write_str(name)
    }
}

/// Tracks state transitions so each one is logged once.
struct Transitions<'a> {
    job_id: &'a CustomizationJobId,
    current: Option<PollState>,
}

impl<'a> Transitions<'a> {
    fn new(job_id: &'a CustomizationJobId) -> Self {
        Self {
            job_id,
            current: None,
        }
    }

    fn enter(&mut self, next: PollState) {
        if self.current == Some(next) {
            return;
        }
        match self.current {
            Some(prev) => info!(
                "Customization job {} moved from {} to {}",
                self.job_id, prev, next
            ),
            None => info!("Customization job {} is {}", self.job_id, next),
        }
        self.current = Some(next);
    }
}

/// Poll a customization job until it completes.
///
/// Returns the final snapshot on success. Every other outcome, including
/// cancellation, is a [`WaitError`]. A single failed remote call ends the
/// wait; nothing is retried.
pub async fn wait_for_customization(
    service: &dyn TrainingService,
    job_id: &CustomizationJobId,
    gate: &CancellationGate,
    settings: PollSettings,
    reporter: &dyn ProgressReporter,
) -> Result<JobStatusSnapshot, WaitError> {
    let mut transitions = Transitions::new(job_id);
    let mut last_progress_time = Instant::now();
    let mut last_progress_value = 0.0_f64;

    loop {
        if let Err(err) = gate.check().await {
            if err.is_cancellation() {
                transitions.enter(PollState::Cancelled);
            }
            return Err(err);
        }

        let snapshot = service.get_status(job_id).await?;
        let state = PollState::from_remote(&snapshot.status);
        transitions.enter(state);
        debug!(
            "Customization job {}: status={} progress={:.1}% epochs={} steps={}",
            job_id,
            snapshot.status,
            snapshot.percentage_done,
            snapshot.epochs_completed,
            snapshot.steps_completed
        );

        match &snapshot.status {
            RemoteJobStatus::Completed => {
                reporter
                    .report(ProgressUpdate::completed(
                        snapshot.epochs_completed,
                        snapshot.steps_completed,
                    ))
                    .await;
                gate.check().await?;
                return Ok(snapshot);
            }
            RemoteJobStatus::Failed => {
                let err = WaitError::Failed {
                    job_id: job_id.to_string(),
                    detail: snapshot.failure_detail().to_string(),
                };
                reporter.report(ProgressUpdate::error(err.to_string())).await;
                return Err(err);
            }
            RemoteJobStatus::Running => {
                if snapshot.lacks_resources() {
                    transitions.enter(PollState::Failed);
                    let err = WaitError::ResourceExhausted {
                        job_id: job_id.to_string(),
                    };
                    reporter.report(ProgressUpdate::error(err.to_string())).await;
                    return Err(err);
                }

                reporter
                    .report(ProgressUpdate::running(
                        snapshot.percentage_done,
                        snapshot.epochs_completed,
                        snapshot.steps_completed,
                    ))
                    .await;

                if snapshot.percentage_done > last_progress_value {
                    last_progress_time = Instant::now();
                    last_progress_value = snapshot.percentage_done;
                }
            }
            RemoteJobStatus::Pending | RemoteJobStatus::Created => {}
            RemoteJobStatus::Unknown(raw) => {
                let err = WaitError::UnknownStatus {
                    job_id: job_id.to_string(),
                    status: raw.clone(),
                };
                reporter.report(ProgressUpdate::error(err.to_string())).await;
                return Err(err);
            }
        }

        let stalled_for = last_progress_time.elapsed();
        if stalled_for > settings.timeout {
            transitions.enter(PollState::TimedOut);
            let err = WaitError::StallTimeout {
                job_id: job_id.to_string(),
                timeout: settings.timeout,
                elapsed: stalled_for,
            };
            warn!("{}", err);
            reporter.report(ProgressUpdate::error(err.to_string())).await;
            return Err(err);
        }

        gate.sleep(settings.interval, settings.cancel_check_slice).await?;
    }
}

/// Wait until `model_name` is served by the deployment registry.
///
/// The timeout runs from the first iteration; presence is binary so there is
/// no progress to reset it.
pub async fn wait_for_model_sync(
    service: &dyn TrainingService,
    model_name: &str,
    gate: &CancellationGate,
    settings: PollSettings,
) -> Result<(), WaitError> {
    let started = Instant::now();

    loop {
        gate.check().await?;

        let deployed = service.list_deployed_models().await?;
        if deployed.contains(model_name) {
            gate.check().await?;
            info!("Model {} is available for inference", model_name);
            return Ok(());
        }

        let elapsed = started.elapsed();
        if elapsed > settings.timeout {
            let err = WaitError::SyncTimeout {
                model: model_name.to_string(),
                timeout: settings.timeout,
            };
            warn!("{}", err);
            return Err(err);
        }

        debug!(
            "Model {} not synced yet after {:.0}s",
            model_name,
            elapsed.as_secs_f64()
        );
        gate.sleep(settings.interval, settings.cancel_check_slice).await?;
    }
}
