//! Training lifecycle control.
//!
//! The store trains asynchronously and is the sole source of truth for
//! training progress; it exposes no event stream, so completion is detected
//! by polling. A fixed interval bounds load on the backend while keeping
//! completion-detection latency bounded by one interval. There is no
//! cancellation primitive other than process termination: training is an
//! infrequent, operator-initiated action, not a per-request path.

use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::store::{RecommendStore, StoreError};

/// Fatal training outcomes, surfaced to the operator.
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("training start rejected by store: {0}")]
    Start(StoreError),
    #[error("training run failed: {payload}")]
    Failed { payload: String },
    #[error("training status unavailable after consecutive poll failures: {0}")]
    StatusUnavailable(StoreError),
}

/// Where a training run currently stands. `Succeeded` and `Failed` are
/// terminal; transitions are driven only by [`TrainingLifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

/// Drives one training run from start to a terminal state.
pub struct TrainingLifecycle<'a> {
    store: &'a dyn RecommendStore,
    state: TrainingState,
    last_status: Option<crate::models::TrainStatus>,
}

impl<'a> TrainingLifecycle<'a> {
    /// A lifecycle that has not issued a train request yet.
    pub fn new(store: &'a dyn RecommendStore) -> Self {
        Self {
            store,
            state: TrainingState::NotStarted,
            last_status: None,
        }
    }

    /// Adopt a run started elsewhere and poll it to completion. Used by
    /// `seer status --watch`.
    pub fn attached(store: &'a dyn RecommendStore) -> Self {
        Self {
            store,
            state: TrainingState::Running,
            last_status: None,
        }
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    /// Issue the train request with the overwrite flag, discarding any
    /// previous trained state. The store rejects the call while a run is
    /// already in progress; that rejection surfaces as
    /// [`TrainingError::Start`] and the state stays `NotStarted`.
    pub async fn start(&mut self) -> Result<(), TrainingError> {
        match self.store.start_training(true).await {
            Ok(()) => {
                info!("training started");
                self.state = TrainingState::Running;
                Ok(())
            }
            Err(e) => Err(TrainingError::Start(e)),
        }
    }

    /// Poll until the run reaches a terminal state.
    ///
    /// Sleeps `poll_interval` between status queries. A failed query is
    /// retried at most once in a row; a second consecutive failure aborts
    /// the wait with [`TrainingError::StatusUnavailable`] rather than poll an
    /// unreachable backend forever. A terminal failure reported by the store
    /// raises [`TrainingError::Failed`] carrying the last status payload.
    pub async fn await_completion(&mut self, poll_interval: Duration) -> Result<(), TrainingError> {
        let mut consecutive_failures = 0u32;

        while self.state == TrainingState::Running {
            tokio::time::sleep(poll_interval).await;

            match self.poll_once().await {
                Ok(()) => consecutive_failures = 0,
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(error = %e, "training status query failed");
                    if consecutive_failures >= 2 {
                        self.state = TrainingState::Failed;
                        return Err(TrainingError::StatusUnavailable(e));
                    }
                }
            }
        }

        match self.state {
            TrainingState::Failed => Err(TrainingError::Failed {
                payload: self.last_payload(),
            }),
            _ => Ok(()),
        }
    }

    /// One status query pair. An `"error"` status is terminal even while the
    /// store still reports the run as in progress.
    async fn poll_once(&mut self) -> Result<(), StoreError> {
        let running = self.store.is_training().await?;
        let status = self.store.train_status().await?;
        info!(status = %status.status, "training status");
        self.last_status = Some(status.clone());

        if status.status == "error" {
            self.state = TrainingState::Failed;
        } else if !running {
            self.state = TrainingState::Succeeded;
        }
        Ok(())
    }

    fn last_payload(&self) -> String {
        self.last_status
            .as_ref()
            .and_then(|s| serde_json::to_string(s).ok())
            .unwrap_or_else(|| "no status available".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{FakeStore, Poll};
    use std::sync::atomic::Ordering;

    const TICK: Duration = Duration::from_millis(1);

    #[tokio::test]
    async fn runs_to_success() {
        let store = FakeStore::new();
        store.script_polls([Poll::Running, Poll::Running, Poll::Trained]);

        let mut lifecycle = TrainingLifecycle::new(&store);
        lifecycle.start().await.unwrap();
        assert_eq!(lifecycle.state(), TrainingState::Running);

        lifecycle.await_completion(TICK).await.unwrap();
        assert_eq!(lifecycle.state(), TrainingState::Succeeded);
        assert_eq!(store.train_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn error_status_fails_with_payload() {
        let store = FakeStore::new();
        store.script_polls([Poll::Running, Poll::ErrorStatus("out of memory")]);

        let mut lifecycle = TrainingLifecycle::new(&store);
        lifecycle.start().await.unwrap();
        let err = lifecycle.await_completion(TICK).await.unwrap_err();

        match err {
            TrainingError::Failed { payload } => {
                assert!(payload.contains("out of memory"), "payload: {payload}")
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(lifecycle.state(), TrainingState::Failed);
    }

    #[tokio::test]
    async fn rejected_start_leaves_not_started() {
        let store = FakeStore::new();
        store.fail_start_training.store(true, Ordering::SeqCst);

        let mut lifecycle = TrainingLifecycle::new(&store);
        let err = lifecycle.start().await.unwrap_err();
        assert!(matches!(err, TrainingError::Start(_)));
        assert_eq!(lifecycle.state(), TrainingState::NotStarted);
    }

    #[tokio::test]
    async fn single_poll_failure_recovers() {
        let store = FakeStore::new();
        store.script_polls([Poll::Running, Poll::Unreachable, Poll::Running, Poll::Trained]);

        let mut lifecycle = TrainingLifecycle::new(&store);
        lifecycle.start().await.unwrap();
        lifecycle.await_completion(TICK).await.unwrap();
        assert_eq!(lifecycle.state(), TrainingState::Succeeded);
    }

    #[tokio::test]
    async fn two_consecutive_poll_failures_abort() {
        let store = FakeStore::new();
        store.script_polls([Poll::Running, Poll::Unreachable, Poll::Unreachable]);

        let mut lifecycle = TrainingLifecycle::new(&store);
        lifecycle.start().await.unwrap();
        let err = lifecycle.await_completion(TICK).await.unwrap_err();
        assert!(matches!(err, TrainingError::StatusUnavailable(_)));
        assert_eq!(lifecycle.state(), TrainingState::Failed);
    }

    #[tokio::test]
    async fn attached_lifecycle_polls_existing_run() {
        let store = FakeStore::new();
        store.script_polls([Poll::Running, Poll::Trained]);

        let mut lifecycle = TrainingLifecycle::attached(&store);
        assert_eq!(lifecycle.state(), TrainingState::Running);
        lifecycle.await_completion(TICK).await.unwrap();
        assert_eq!(lifecycle.state(), TrainingState::Succeeded);
        // No train request was issued by this process.
        assert_eq!(store.train_calls.load(Ordering::SeqCst), 0);
    }
}
