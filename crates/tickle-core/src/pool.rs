//! Fixed-size worker pool.
//!
//! Every worker pulls URLs from the shared work queue, performs one GET per
//! URL and hands the classified outcome to the collector. Workers only leave
//! the pool when the work queue is closed and empty, when the collector is
//! gone, or when a request cannot even be built. In the last case the worker
//! is not replaced, so the pool shrinks for the rest of the run.

use crate::barrier::{CompletionBarrier, CompletionGuard};
use crate::config::HeaderSpec;
use crate::error::FetchError;
use crate::fetcher::Fetcher;
use crate::handoff::{HandoffReceiver, HandoffSender};
use crate::outcome::{RequestOutcome, WorkItem};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Why a worker stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Work queue closed and drained.
    Drained,
    /// Outcome queue closed under it.
    CollectorGone,
    /// A request could not be constructed.
    BuildFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub processed: u64,
    pub exit: WorkerExit,
}

pub struct Worker {
    id: usize,
    fetcher: Arc<dyn Fetcher>,
    header: Option<HeaderSpec>,
    work: HandoffReceiver<WorkItem>,
    outcomes: HandoffSender<RequestOutcome>,
}

impl Worker {
    pub fn new(
        id: usize,
        fetcher: Arc<dyn Fetcher>,
        header: Option<HeaderSpec>,
        work: HandoffReceiver<WorkItem>,
        outcomes: HandoffSender<RequestOutcome>,
    ) -> Self {
        Self {
            id,
            fetcher,
            header,
            work,
            outcomes,
        }
    }

    /// Run until the work queue is exhausted. `guard` is released on return.
    pub async fn run(self, guard: CompletionGuard) -> WorkerReport {
        let _guard = guard;
        let mut processed = 0u64;

        debug!(worker_id = self.id, "Worker started");

        let exit = loop {
            let Some(url) = self.work.recv().await else {
                break WorkerExit::Drained;
            };

            let start = Instant::now();
            let fetched = self.fetcher.fetch(&url, self.header.as_ref()).await;
            let build_failure = match &fetched {
                Err(FetchError::Build(message)) => Some(message.clone()),
                _ => None,
            };

            let outcome = RequestOutcome::new(url, start.elapsed(), fetched);
            if let Some(message) = build_failure {
                error!(
                    worker_id = self.id,
                    url = %outcome.url,
                    error = %message,
                    "Error creating request, worker leaving pool"
                );
                // Still report it so the failure shows up as an `e`.
                if self.outcomes.send(outcome).await.is_ok() {
                    processed += 1;
                } else {
                    debug!(
                        worker_id = self.id,
                        "Outcome queue closed, build failure not reported"
                    );
                }
                break WorkerExit::BuildFailed(message);
            }

            if self.outcomes.send(outcome).await.is_err() {
                debug!(worker_id = self.id, "Outcome queue closed, worker stopping");
                break WorkerExit::CollectorGone;
            }
            processed += 1;
        };

        debug!(worker_id = self.id, processed, ?exit, "Worker finished");

        WorkerReport {
            worker_id: self.id,
            processed,
            exit,
        }
    }
}

/// Handles to the running workers.
pub struct WorkerPool {
    handles: Vec<JoinHandle<WorkerReport>>,
}

impl WorkerPool {
    /// Start `size` workers, each registered with `barrier` before it is
    /// spawned.
    pub fn spawn(
        size: usize,
        barrier: &CompletionBarrier,
        fetcher: Arc<dyn Fetcher>,
        header: Option<HeaderSpec>,
        work: &HandoffReceiver<WorkItem>,
        outcomes: &HandoffSender<RequestOutcome>,
    ) -> Self {
        let mut handles = Vec::with_capacity(size);
        for id in 0..size {
            let Some(guard) = barrier.register() else {
                break;
            };
            let worker = Worker::new(
                id,
                fetcher.clone(),
                header.clone(),
                work.clone(),
                outcomes.clone(),
            );
            handles.push(tokio::spawn(worker.run(guard)));
        }
        Self { handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Collect every worker's report. Call after the barrier has released.
    pub async fn join(self) -> Result<Vec<WorkerReport>, tokio::task::JoinError> {
        let mut reports = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            reports.push(handle.await?);
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{MockFetcher, MockReply};
    use crate::handoff::handoff;
    use crate::outcome::Symbol;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_worker_processes_until_drained() {
        let (work_tx, work_rx) = handoff();
        let (out_tx, out_rx) = handoff();
        let barrier = CompletionBarrier::new(1);
        let fetcher = Arc::new(
            MockFetcher::new(Duration::ZERO).reply("http://a/missing", MockReply::Status(404)),
        );

        let worker = Worker::new(0, fetcher, None, work_rx, out_tx);
        let task = tokio::spawn(worker.run(barrier.register().unwrap()));

        tokio::spawn(async move {
            work_tx.send("http://a/ok".to_string()).await.unwrap();
            work_tx.send("http://a/missing".to_string()).await.unwrap();
            work_tx.close();
        });

        assert_eq!(out_rx.recv().await.unwrap().symbol(), Symbol::Ok);
        assert_eq!(out_rx.recv().await.unwrap().symbol(), Symbol::Status('4'));

        let report = task.await.unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.exit, WorkerExit::Drained);
        timeout(Duration::from_secs(1), barrier.wait()).await.unwrap();
    }

    #[tokio::test]
    async fn test_transport_error_keeps_worker_alive() {
        let (work_tx, work_rx) = handoff();
        let (out_tx, out_rx) = handoff();
        let barrier = CompletionBarrier::new(1);
        let fetcher = Arc::new(
            MockFetcher::new(Duration::ZERO)
                .reply("http://down/", MockReply::Transport("refused".into())),
        );

        let worker = Worker::new(0, fetcher, None, work_rx, out_tx);
        let task = tokio::spawn(worker.run(barrier.register().unwrap()));

        tokio::spawn(async move {
            work_tx.send("http://down/".to_string()).await.unwrap();
            work_tx.send("http://a/ok".to_string()).await.unwrap();
        });

        assert_eq!(out_rx.recv().await.unwrap().symbol(), Symbol::Error);
        assert_eq!(out_rx.recv().await.unwrap().symbol(), Symbol::Ok);

        let report = task.await.unwrap();
        assert_eq!(report.exit, WorkerExit::Drained);
    }

    #[tokio::test]
    async fn test_build_failure_removes_worker() {
        let (work_tx, work_rx) = handoff();
        let (out_tx, out_rx) = handoff();
        let barrier = CompletionBarrier::new(1);
        let fetcher = Arc::new(
            MockFetcher::new(Duration::ZERO)
                .reply("::bad::", MockReply::Build("relative URL without a base".into())),
        );

        let worker = Worker::new(0, fetcher, None, work_rx, out_tx);
        let task = tokio::spawn(worker.run(barrier.register().unwrap()));

        let sender = tokio::spawn(async move {
            work_tx.send("::bad::".to_string()).await.unwrap();
            // Nobody is left to take this one.
            work_tx.send("http://a/ok".to_string()).await
        });

        let outcome = out_rx.recv().await.unwrap();
        assert_eq!(outcome.symbol(), Symbol::Error);

        let report = task.await.unwrap();
        assert!(matches!(report.exit, WorkerExit::BuildFailed(_)));
        assert_eq!(report.processed, 1);
        timeout(Duration::from_secs(1), barrier.wait()).await.unwrap();

        // The worker's receiver is gone, so the pending send fails.
        assert!(sender.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_header_attached_to_every_request() {
        let (work_tx, work_rx) = handoff();
        let (out_tx, out_rx) = handoff::<RequestOutcome>();
        let barrier = CompletionBarrier::new(3);
        let fetcher = Arc::new(MockFetcher::new(Duration::from_millis(1)));
        let header = HeaderSpec::parse("X-Test custom").unwrap();

        let pool = WorkerPool::spawn(
            3,
            &barrier,
            fetcher.clone(),
            Some(header),
            &work_rx,
            &out_tx,
        );
        assert_eq!(pool.size(), 3);
        drop(work_rx);
        drop(out_tx);

        tokio::spawn(async move {
            for i in 0..20 {
                work_tx.send(format!("http://a/{i}")).await.unwrap();
            }
            work_tx.close();
        });

        let mut outcomes = 0;
        while outcomes < 20 {
            out_rx.recv().await.unwrap();
            outcomes += 1;
        }
        barrier.wait().await;

        let reports = pool.join().await.unwrap();
        assert_eq!(reports.iter().map(|r| r.processed).sum::<u64>(), 20);

        let seen = fetcher.seen();
        assert_eq!(seen.len(), 20);
        for request in seen {
            assert_eq!(
                request.header,
                Some(("x-test".to_string(), "custom".to_string()))
            );
        }
    }

    #[tokio::test]
    async fn test_worker_stops_when_collector_gone() {
        let (work_tx, work_rx) = handoff();
        let (out_tx, out_rx) = handoff::<RequestOutcome>();
        drop(out_rx);
        let barrier = CompletionBarrier::new(1);
        let fetcher = Arc::new(MockFetcher::new(Duration::ZERO));

        let worker = Worker::new(0, fetcher, None, work_rx, out_tx);
        let task = tokio::spawn(worker.run(barrier.register().unwrap()));
        tokio::spawn(async move { work_tx.send("http://a/ok".to_string()).await });

        let report = task.await.unwrap();
        assert_eq!(report.exit, WorkerExit::CollectorGone);
        assert_eq!(report.processed, 0);
    }

    #[tokio::test]
    async fn test_unreported_build_failure_not_counted() {
        let (work_tx, work_rx) = handoff();
        let (out_tx, out_rx) = handoff::<RequestOutcome>();
        drop(out_rx);
        let barrier = CompletionBarrier::new(1);
        let fetcher = Arc::new(
            MockFetcher::new(Duration::ZERO)
                .reply("::bad::", MockReply::Build("relative URL without a base".into())),
        );

        let worker = Worker::new(0, fetcher, None, work_rx, out_tx);
        let task = tokio::spawn(worker.run(barrier.register().unwrap()));
        tokio::spawn(async move { work_tx.send("::bad::".to_string()).await });

        let report = task.await.unwrap();
        assert!(matches!(report.exit, WorkerExit::BuildFailed(_)));
        assert_eq!(report.processed, 0);
    }
}
