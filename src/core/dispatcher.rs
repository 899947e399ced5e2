// Background dispatch of job executions, at most one active unit per key

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// A boxed unit of work run off the request path.
pub type WorkUnit = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// A unit submitted under the same key is still running.
    AlreadyActive { key: String },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyActive { key } => {
                write!(f, "An execution for '{}' is already active", key)
            }
        }
    }
}

impl std::error::Error for DispatchError {}

#[async_trait]
pub trait JobDispatcher: Send + Sync {
    /// Run `work` in the background under `key`.
    ///
    /// Fails without running anything while an earlier unit with the same key
    /// has not finished.
    async fn submit(&self, key: &str, work: WorkUnit) -> Result<(), DispatchError>;
}

struct ActiveUnit {
    generation: u64,
    handle: JoinHandle<()>,
}

/// [`JobDispatcher`] that spawns each unit as a tokio task.
#[derive(Clone, Default)]
pub struct TokioDispatcher {
    active: Arc<Mutex<HashMap<String, ActiveUnit>>>,
    generation: Arc<AtomicU64>,
}

impl TokioDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_active(&self, key: &str) -> bool {
        self.active
            .lock()
            .await
            .get(key)
            .is_some_and(|unit| !unit.handle.is_finished())
    }

    pub async fn active_count(&self) -> usize {
        self.active
            .lock()
            .await
            .values()
            .filter(|unit| !unit.handle.is_finished())
            .count()
    }
}

#[async_trait]
impl JobDispatcher for TokioDispatcher {
    async fn submit(&self, key: &str, work: WorkUnit) -> Result<(), DispatchError> {
        let mut active = self.active.lock().await;

        if active
            .get(key)
            .is_some_and(|unit| !unit.handle.is_finished())
        {
            tracing::warn!("Rejected duplicate execution for {}", key);
            return Err(DispatchError::AlreadyActive {
                key: key.to_string(),
            });
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let registry = self.active.clone();
        let owned_key = key.to_string();

        // The lock is held until the handle is registered, so the release
        // below always finds its own entry. The unit runs in its own task so
        // a panic still reaches the release.
        let handle = tokio::spawn(async move {
            if let Err(err) = tokio::spawn(work).await {
                tracing::error!("Execution for {} aborted: {}", owned_key, err);
            }

            let mut active = registry.lock().await;
            if active
                .get(&owned_key)
                .is_some_and(|unit| unit.generation == generation)
            {
                active.remove(&owned_key);
            }
            tracing::debug!("Execution for {} finished", owned_key);
        });

        active.insert(key.to_string(), ActiveUnit { generation, handle });
        tracing::debug!("Dispatched execution for {}", key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    async fn wait_until_idle(dispatcher: &TokioDispatcher, key: &str) {
        for _ in 0..100 {
            if !dispatcher.is_active(key).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("execution for {key} never finished");
    }

    #[tokio::test]
    async fn test_duplicate_key_is_rejected_while_active() {
        let dispatcher = TokioDispatcher::new();
        let (release, wait) = oneshot::channel::<()>();

        dispatcher
            .submit("job-1", Box::pin(async move {
                let _ = wait.await;
            }))
            .await
            .unwrap();

        let err = dispatcher
            .submit("job-1", Box::pin(async {}))
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::AlreadyActive { key: "job-1".to_string() });
        assert!(dispatcher.is_active("job-1").await);

        release.send(()).unwrap();
        wait_until_idle(&dispatcher, "job-1").await;
        assert_eq!(dispatcher.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_key_is_released_after_completion() {
        let dispatcher = TokioDispatcher::new();
        let (done_tx, done_rx) = oneshot::channel::<u32>();

        dispatcher
            .submit("job-1", Box::pin(async move {
                let _ = done_tx.send(1);
            }))
            .await
            .unwrap();
        assert_eq!(done_rx.await.unwrap(), 1);
        wait_until_idle(&dispatcher, "job-1").await;

        let (again_tx, again_rx) = oneshot::channel::<u32>();
        dispatcher
            .submit("job-1", Box::pin(async move {
                let _ = again_tx.send(2);
            }))
            .await
            .unwrap();
        assert_eq!(again_rx.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_panicking_unit_releases_its_key() {
        let dispatcher = TokioDispatcher::new();

        dispatcher
            .submit("job-1", Box::pin(async {
                let fail = true;
                if fail {
                    panic!("unit blew up");
                }
            }))
            .await
            .unwrap();

        for _ in 0..100 {
            if dispatcher.active.lock().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(dispatcher.active.lock().await.is_empty());

        let (done_tx, done_rx) = oneshot::channel::<u32>();
        dispatcher
            .submit("job-1", Box::pin(async move {
                let _ = done_tx.send(1);
            }))
            .await
            .unwrap();
        assert_eq!(done_rx.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_concurrently() {
        let dispatcher = TokioDispatcher::new();
        let (release_a, wait_a) = oneshot::channel::<()>();
        let (release_b, wait_b) = oneshot::channel::<()>();

        dispatcher
            .submit("a", Box::pin(async move {
                let _ = wait_a.await;
            }))
            .await
            .unwrap();
        dispatcher
            .submit("b", Box::pin(async move {
                let _ = wait_b.await;
            }))
            .await
            .unwrap();
        assert_eq!(dispatcher.active_count().await, 2);

        release_b.send(()).unwrap();
        wait_until_idle(&dispatcher, "b").await;
        assert!(dispatcher.is_active("a").await);

        release_a.send(()).unwrap();
        wait_until_idle(&dispatcher, "a").await;
    }
}
