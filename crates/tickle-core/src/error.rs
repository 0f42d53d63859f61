//! Error types for tickle-core

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal configuration problems. Any of these stops the run before a
/// single request is dispatched.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("bad header {0:?}, expected \"<name> <value>\"")]
    BadHeader(String),

    #[error("bad duration {raw:?}")]
    BadDuration {
        raw: String,
        source: humantime::DurationError,
    },

    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("no URLs found")]
    NoUrls,

    #[error("error reading URL list")]
    Input(#[source] io::Error),

    #[error("error creating log file {}", .path.display())]
    LogFile { path: PathBuf, source: io::Error },

    #[error("failed to read config {}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    // toml renders its own error as a multi-line snippet, so only the
    // message is kept and the error is not chained.
    #[error("failed to parse config {}: {}", .path.display(), one_line(.error.message()))]
    Parse {
        path: PathBuf,
        error: toml::de::Error,
    },
}

fn one_line(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Per-request failures reported by a [`crate::Fetcher`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request object could not be built (malformed URL and the like).
    #[error("error creating request: {0}")]
    Build(String),

    /// The request was sent but no response came back.
    #[error("{0}")]
    Transport(String),
}

/// Returned by [`crate::handoff::HandoffSender::send`] when nobody will
/// ever receive the item. The item is handed back.
#[derive(Debug, PartialEq, Eq)]
pub struct SendError<T>(pub T);

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("handoff queue closed")
    }
}

impl<T: fmt::Debug> std::error::Error for SendError<T> {}

/// Failures of the run as a whole.
///
/// Messages never repeat their source; render the chain with `{:#}` on
/// an `anyhow::Error` to get a single line.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("output failed")]
    Io(#[from] io::Error),

    #[error("pipeline task failed")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T, E = RunError> = std::result::Result<T, E>;
