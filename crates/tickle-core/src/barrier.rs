//! Counter-based completion barrier.
//!
//! Each participant holds a [`CompletionGuard`] for as long as it runs.
//! [`CompletionBarrier::wait`] resolves once every guard has been dropped,
//! whichever way the participant exited.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone)]
pub struct CompletionBarrier {
    semaphore: Arc<Semaphore>,
    parties: u32,
}

/// Proof of registration. Dropping it reports completion.
#[derive(Debug)]
pub struct CompletionGuard {
    _permit: OwnedSemaphorePermit,
}

impl CompletionBarrier {
    pub fn new(parties: usize) -> Self {
        let parties = u32::try_from(parties).unwrap_or(u32::MAX);
        Self {
            semaphore: Arc::new(Semaphore::new(parties as usize)),
            parties,
        }
    }

    /// Register one participant. `None` once all parties are registered.
    ///
    /// Register before starting the participant so `wait` cannot slip
    /// through early.
    pub fn register(&self) -> Option<CompletionGuard> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| CompletionGuard { _permit: permit })
    }

    /// Participants still holding their guard.
    pub fn outstanding(&self) -> usize {
        self.parties as usize - self.semaphore.available_permits()
    }

    /// Block until every registered participant has completed.
    pub async fn wait(&self) {
        // The semaphore is never closed, so this only returns once all
        // permits are back.
        let _all = self.semaphore.acquire_many(self.parties).await;
    }
}
