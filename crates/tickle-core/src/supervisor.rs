//! Run supervisor.
//!
//! Owns both handoff queues and enforces the shutdown order:
//!
//! 1. the work queue closes (duration expired or external stop),
//! 2. every worker drains and leaves, releasing the completion barrier,
//! 3. only then is the outcome queue closed, so no worker can send into a
//!    closed queue,
//! 4. the collector finishes, the log is flushed and the trailing newline
//!    is written.

use crate::barrier::CompletionBarrier;
use crate::collector::ResultCollector;
use crate::config::RunConfig;
use crate::error::{ConfigError, Result};
use crate::fetcher::Fetcher;
use crate::generator::{StopReason, WorkGenerator};
use crate::handoff::handoff;
use crate::outcome::{RequestOutcome, WorkItem};
use crate::pool::{WorkerExit, WorkerPool, WorkerReport};
use crate::stats::RunSummary;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Process-level lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Starting,
    Running,
    Draining,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: RunSummary,
    pub generated: u64,
    pub stop_reason: StopReason,
    /// Workers that left early because a request could not be built.
    pub workers_lost: usize,
    pub workers: Vec<WorkerReport>,
}

pub struct Supervisor {
    config: RunConfig,
    fetcher: Arc<dyn Fetcher>,
    state: Arc<watch::Sender<RunState>>,
}

impl Supervisor {
    pub fn new(config: RunConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let (state, _) = watch::channel(RunState::Starting);
        Self {
            config,
            fetcher,
            state: Arc::new(state),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Dispatch requests against `urls` until the run ends.
    ///
    /// `shutdown` is an external stop request; pass
    /// `std::future::pending()` to rely on the configured duration alone.
    /// With neither, this never returns while workers remain.
    pub async fn run<P, L, F>(
        self,
        urls: Vec<String>,
        progress: P,
        log: Option<L>,
        shutdown: F,
    ) -> Result<RunReport>
    where
        P: Write + Send + 'static,
        L: Write + Send + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        let concurrency = self.config.concurrency;
        if concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency.into());
        }
        let generator = WorkGenerator::new(urls, self.config.duration, self.config.seed)?;

        info!(
            concurrency,
            duration = ?self.config.duration,
            header = self.config.header.as_ref().map(|h| h.to_string()),
            fetcher = self.fetcher.name(),
            "Starting run"
        );

        let (work_tx, work_rx) = handoff::<WorkItem>();
        let (outcome_tx, outcome_rx) = handoff::<RequestOutcome>();
        let barrier = CompletionBarrier::new(concurrency);

        let pool = WorkerPool::spawn(
            concurrency,
            &barrier,
            self.fetcher.clone(),
            self.config.header.clone(),
            &work_rx,
            &outcome_tx,
        );
        drop(work_rx);

        let collector = ResultCollector::new(progress, log).spawn(outcome_rx);

        self.transition(RunState::Running);
        let generator = {
            let work = work_tx.clone();
            let state = self.state.clone();
            tokio::spawn(async move {
                let report = generator.run(work, shutdown).await;
                state.send_if_modified(|current| advance(current, RunState::Draining));
                report
            })
        };

        barrier.wait().await;
        debug!("All workers finished");

        // Safe only now: no worker is left to send an outcome.
        outcome_tx.close();
        // Stops the generator if the pool emptied out before it finished.
        work_tx.close();
        self.transition(RunState::Draining);

        let collected = collector.await??;
        let generator_report = generator.await?;
        let workers = pool.join().await?;

        let mut progress = collected.progress;
        writeln!(progress)?;
        progress.flush()?;
        if let Some(mut log) = collected.log {
            log.flush()?;
        }

        let workers_lost = workers
            .iter()
            .filter(|w| matches!(w.exit, WorkerExit::BuildFailed(_)))
            .count();
        if workers_lost > 0 {
            warn!(
                workers_lost,
                concurrency, "Workers left the pool after request construction failures"
            );
        }

        let summary = collected.stats.summary();
        self.transition(RunState::Terminated);
        info!(
            total = summary.total,
            generated = generator_report.generated,
            stop_reason = ?generator_report.stop_reason,
            "Run finished"
        );

        Ok(RunReport {
            summary,
            generated: generator_report.generated,
            stop_reason: generator_report.stop_reason,
            workers_lost,
            workers,
        })
    }

    fn transition(&self, next: RunState) {
        if self
            .state
            .send_if_modified(|current| advance(current, next))
        {
            debug!(state = ?next, "Run state changed");
        }
    }
}

fn advance(current: &mut RunState, next: RunState) -> bool {
    if next > *current {
        *current = next;
        true
    } else {
        false
    }
}
