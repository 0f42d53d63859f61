use crate::error::ConfigError;
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONCURRENCY: usize = 10;

/// Optional settings file. Only the `[run]` table is read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub run: ConfigSource,
}

impl ConfigFile {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }
}

/// One layer of raw, unvalidated settings (command line or config file).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigSource {
    /// Number of parallel workers
    pub concurrency: Option<usize>,
    /// Extra request header, `"<name> <value>"`
    pub header: Option<String>,
    /// Duration such as `30s` or `1m 30s`; `0` runs forever
    #[serde(default, with = "humantime_serde")]
    pub duration: Option<Duration>,
    /// File to write per-request detail to
    pub log: Option<PathBuf>,
    /// Client request timeout in milliseconds; `0` disables it
    pub timeout_ms: Option<u64>,
    /// Seed for URL selection
    pub seed: Option<u64>,
}

impl ConfigSource {
    /// Fill every unset field from `fallback`.
    pub fn or(self, fallback: ConfigSource) -> ConfigSource {
        ConfigSource {
            concurrency: self.concurrency.or(fallback.concurrency),
            header: self.header.or(fallback.header),
            duration: self.duration.or(fallback.duration),
            log: self.log.or(fallback.log),
            timeout_ms: self.timeout_ms.or(fallback.timeout_ms),
            seed: self.seed.or(fallback.seed),
        }
    }

    /// Validate and apply defaults.
    pub fn resolve(self) -> Result<Settings, ConfigError> {
        let header = match self.header.as_deref() {
            Some("") | None => None,
            Some(raw) => Some(HeaderSpec::parse(raw)?),
        };

        let duration = self.duration.filter(|d| !d.is_zero());

        let concurrency = self.concurrency.unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }

        let timeout = self
            .timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        Ok(Settings {
            run: RunConfig {
                concurrency,
                header,
                duration,
                timeout,
                seed: self.seed,
            },
            log_path: self.log.filter(|p| !p.as_os_str().is_empty()),
        })
    }
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub run: RunConfig,
    pub log_path: Option<PathBuf>,
}

/// Immutable parameters of one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub concurrency: usize,
    pub header: Option<HeaderSpec>,
    /// `None` means the generator never stops on its own.
    pub duration: Option<Duration>,
    pub timeout: Option<Duration>,
    pub seed: Option<u64>,
}

impl RunConfig {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            header: None,
            duration: None,
            timeout: None,
            seed: None,
        }
    }

    pub fn with_header(mut self, header: HeaderSpec) -> Self {
        self.header = Some(header);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// A single extra header attached to every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSpec {
    name: HeaderName,
    value: HeaderValue,
}

impl HeaderSpec {
    /// Parse `"<name> <value>"`, splitting on the first space.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let bad = || ConfigError::BadHeader(raw.to_string());
        let (name, value) = raw.split_once(' ').ok_or_else(bad)?;
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| bad())?;
        let value = HeaderValue::from_str(value).map_err(|_| bad())?;
        Ok(Self { name, value })
    }

    pub fn name(&self) -> &HeaderName {
        &self.name
    }

    pub fn value(&self) -> &HeaderValue {
        &self.value
    }
}

impl fmt::Display for HeaderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.name,
            String::from_utf8_lossy(self.value.as_bytes())
        )
    }
}

/// Parse a duration such as `300ms`, `10s` or `1h 30m`.
///
/// A zero duration is valid and later resolves to "run forever".
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw.trim()).map_err(|source| ConfigError::BadDuration {
        raw: raw.to_string(),
        source,
    })
}

/// Read the URL list, one per line. Blank lines are skipped.
pub fn read_targets(reader: impl BufRead) -> Result<Vec<String>, ConfigError> {
    let mut urls = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(ConfigError::Input)?;
        let line = line.trim();
        if !line.is_empty() {
            urls.push(line.to_string());
        }
    }
    if urls.is_empty() {
        return Err(ConfigError::NoUrls);
    }
    Ok(urls)
}

/// Create (or truncate) the detail log.
pub fn open_log(path: impl AsRef<Path>) -> Result<File, ConfigError> {
    let path = path.as_ref();
    File::create(path).map_err(|source| ConfigError::LogFile {
        path: path.to_path_buf(),
        source,
    })
}
