use crate::error::ConfigError;
use crate::handoff::HandoffSender;
use crate::outcome::WorkItem;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

/// Why the generator stopped feeding the work queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The configured duration ran out.
    Expired,
    /// An external stop request arrived.
    Interrupted,
    /// Nobody is left to take work.
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorReport {
    pub generated: u64,
    pub stop_reason: StopReason,
}

/// Endless stream of URLs picked uniformly at random, with replacement.
pub struct WorkGenerator {
    urls: Arc<[String]>,
    duration: Option<Duration>,
    rng: StdRng,
}

impl WorkGenerator {
    pub fn new(
        urls: Vec<String>,
        duration: Option<Duration>,
        seed: Option<u64>,
    ) -> Result<Self, ConfigError> {
        if urls.is_empty() {
            return Err(ConfigError::NoUrls);
        }
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            urls: urls.into(),
            duration,
            rng,
        })
    }

    pub fn next_url(&mut self) -> WorkItem {
        let idx = self.rng.gen_range(0..self.urls.len());
        self.urls[idx].clone()
    }

    /// Feed `work` until the duration expires, `shutdown` resolves, or all
    /// receivers are gone; then close the queue.
    ///
    /// Without a duration and with a `shutdown` that never resolves this
    /// only returns once every worker has left.
    pub async fn run<F>(mut self, work: HandoffSender<WorkItem>, shutdown: F) -> GeneratorReport
    where
        F: Future<Output = ()> + Send,
    {
        let deadline = self.duration.map(|d| Instant::now() + d);
        let expiry = async move {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(expiry);
        tokio::pin!(shutdown);

        let mut generated = 0u64;
        let stop_reason = loop {
            let url = self.next_url();
            tokio::select! {
                biased;

                _ = &mut expiry => break StopReason::Expired,

                _ = &mut shutdown => break StopReason::Interrupted,

                sent = work.send(url) => {
                    if sent.is_err() {
                        break StopReason::Abandoned;
                    }
                    generated += 1;
                }
            }
        };

        work.close();
        debug!(?stop_reason, "Work queue closed");
        info!(generated, ?stop_reason, "Generator finished");

        GeneratorReport {
            generated,
            stop_reason,
        }
    }
}
