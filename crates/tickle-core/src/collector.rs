use crate::handoff::HandoffReceiver;
use crate::outcome::RequestOutcome;
use crate::stats::StatsCollector;
use std::io::{self, Write};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

/// Sole consumer of the outcome queue.
///
/// Writes one progress character per outcome, flushed immediately, and
/// appends a detail record to the log sink when there is one.
pub struct ResultCollector<P, L> {
    progress: P,
    log: Option<L>,
    stats: StatsCollector,
}

/// Everything the collector owned, handed back once the queue is drained.
pub struct Collected<P, L> {
    pub progress: P,
    pub log: Option<L>,
    pub stats: StatsCollector,
}

impl<P: Write, L: Write> ResultCollector<P, L> {
    pub fn new(progress: P, log: Option<L>) -> Self {
        Self {
            progress,
            log,
            stats: StatsCollector::new(),
        }
    }

    /// Drain `outcomes` on the blocking pool.
    ///
    /// The sinks are plain `Write`s (stdout, a file), so a stalled pipe
    /// parks a blocking thread rather than a runtime worker.
    pub fn spawn(
        self,
        outcomes: HandoffReceiver<RequestOutcome>,
    ) -> JoinHandle<io::Result<Collected<P, L>>>
    where
        P: Send + 'static,
        L: Send + 'static,
    {
        let handle = Handle::current();
        tokio::task::spawn_blocking(move || handle.block_on(self.run(outcomes)))
    }

    /// Drain `outcomes` until it is closed.
    pub async fn run(
        mut self,
        outcomes: HandoffReceiver<RequestOutcome>,
    ) -> io::Result<Collected<P, L>> {
        while let Some(outcome) = outcomes.recv().await {
            self.record(&outcome)?;
        }
        Ok(Collected {
            progress: self.progress,
            log: self.log,
            stats: self.stats,
        })
    }

    fn record(&mut self, outcome: &RequestOutcome) -> io::Result<()> {
        let symbol = outcome.symbol();
        trace!(url = %outcome.url, %symbol, "Outcome");

        write!(self.progress, "{symbol}")?;
        self.progress.flush()?;

        if let Some(log) = self.log.as_mut() {
            outcome.write_record(log)?;
        }

        self.stats.record(outcome);
        Ok(())
    }
}
