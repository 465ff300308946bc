use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Bounded worker pool for per-candidate work.
pub struct CatalogExecutor {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl CatalogExecutor {
    pub fn new(concurrency_limit: usize) -> Self {
        let limit = concurrency_limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Waits for a free worker slot. Returns `None` once `cancel` fires,
    /// including when it fires while the slot was being granted.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                permit.ok().filter(|_| !cancel.is_cancelled())
            }
        }
    }

    /// Spawns `task(item)` for each item in order, at most `limit` running at
    /// once. Stops handing out work at cancellation and returns how many
    /// items were started.
    #[instrument(skip_all, fields(limit = self.limit))]
    pub async fn dispatch<I, F, Fut>(&self, items: I, cancel: &CancellationToken, mut task: F) -> usize
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut started = 0;
        for item in items {
            let Some(permit) = self.acquire(cancel).await else {
                debug!(started, "Cancelled, no further work dispatched");
                break;
            };
            let work = task(item);
            tokio::spawn(async move {
                work.await;
                drop(permit);
            });
            started += 1;
        }

        info!(started, "Dispatch finished");
        started
    }
}
