//! Core of the tickle load generator.
//!
//! A [`WorkGenerator`] feeds random URLs through an unbuffered handoff
//! queue to a fixed [`WorkerPool`]; workers hand classified outcomes to a
//! single [`ResultCollector`]; the [`Supervisor`] wires them together and
//! owns the shutdown order.

pub mod barrier;
pub mod collector;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod generator;
pub mod handoff;
pub mod outcome;
pub mod pool;
pub mod stats;
pub mod supervisor;

#[cfg(test)]
mod testutil;

pub use barrier::*;
pub use collector::*;
pub use config::*;
pub use error::*;
pub use fetcher::*;
pub use generator::*;
pub use handoff::*;
pub use outcome::*;
pub use pool::*;
pub use stats::*;
pub use supervisor::*;
