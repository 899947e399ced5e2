//! Cooperative cancellation.
//!
//! A cancel request only sets a flag in a shared [`CancellationStore`]. The
//! running job observes it through a [`CancellationGate`] at the head of each
//! poll iteration and between the slices of every interval sleep.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::info;

use crate::poll::WaitError;
use crate::types::JobId;

/// Shared per-job cancellation flags. A flag is set once and never unset.
#[async_trait]
pub trait CancellationStore: Send + Sync {
    async fn is_cancelled(&self, run_id: &JobId) -> anyhow::Result<bool>;

    async fn set_cancelled(&self, run_id: &JobId) -> anyhow::Result<()>;
}

/// Process-local flag store, for single-node runs and tests.
#[derive(Default)]
pub struct InMemoryCancellationStore {
    cancelled: RwLock<HashSet<JobId>>,
}

impl InMemoryCancellationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CancellationStore for InMemoryCancellationStore {
    async fn is_cancelled(&self, run_id: &JobId) -> anyhow::Result<bool> {
        Ok(self.cancelled.read().await.contains(run_id))
    }

    async fn set_cancelled(&self, run_id: &JobId) -> anyhow::Result<()> {
        self.cancelled.write().await.insert(run_id.clone());
        Ok(())
    }
}

/// Read-only view of one job's cancellation flag, threaded through the wait loops.
#[derive(Clone)]
pub struct CancellationGate {
    store: Arc<dyn CancellationStore>,
    run_id: JobId,
}

impl CancellationGate {
    pub fn new(store: Arc<dyn CancellationStore>, run_id: JobId) -> Self {
        Self { store, run_id }
    }

    pub fn run_id(&self) -> &JobId {
        &self.run_id
    }

    /// Whether cancellation has been requested. An unreachable store is an
    /// error, not a "no".
    pub async fn is_cancelled(&self) -> Result<bool, WaitError> {
        self.store
            .is_cancelled(&self.run_id)
            .await
            .map_err(|e| WaitError::Gate(e.to_string()))
    }

    /// Fail with [`WaitError::Cancelled`] if the flag is set.
    pub async fn check(&self) -> Result<(), WaitError> {
        if self.is_cancelled().await? {
            info!("Cancellation observed for job {}", self.run_id);
            return Err(WaitError::Cancelled {
                run_id: self.run_id.clone(),
            });
        }
        Ok(())
    }

    /// Sleep for `duration`, re-checking the flag every `slice`.
    ///
    /// The flag is not checked after the final slice; callers check it at the
    /// head of their next iteration.
    pub async fn sleep(&self, duration: Duration, slice: Duration) -> Result<(), WaitError> {
        let deadline = Instant::now() + duration;
        let slice = if slice.is_zero() { duration } else { slice };

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }

            tokio::time::sleep((deadline - now).min(slice)).await;

            if Instant::now() >= deadline {
                return Ok(());
            }
            self.check().await?;
        }
    }
}
