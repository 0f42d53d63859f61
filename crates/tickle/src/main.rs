use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tickle_core::{
    open_log, parse_duration, read_targets, ConfigError, ConfigFile, ConfigSource, HttpFetcher,
    RunReport, RunSummary, StopReason, Supervisor,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "tickle")]
#[command(
    about = "Reads URLs from stdin and GETs them at random with bounded concurrency",
    long_about = "Reads a list of URLs (one per line) from stdin, then repeatedly GETs \
                  randomly chosen ones with N parallel workers until --duration expires \
                  (or forever). Prints one character per request: '.' for 200, 'e' for \
                  a local or network error, otherwise the first digit of the status code."
)]
struct Args {
    /// Number of parallel requests
    #[arg(long = "par", short = 'c', alias = "concurrency")]
    par: Option<usize>,

    /// Optional HTTP header to insert, as "<name> <value>"
    #[arg(long)]
    header: Option<String>,

    /// Optional duration such as 30s or "1m 30s"; 0 = forever
    #[arg(long)]
    duration: Option<String>,

    /// Log file to write detailed output to
    #[arg(long)]
    log: Option<PathBuf>,

    /// Per-request client timeout in milliseconds; 0 = none
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Seed for URL selection (random if unset)
    #[arg(long)]
    seed: Option<u64>,

    /// TOML file with a [run] table; flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write a JSON run summary here when the run ends
    #[arg(long)]
    summary_json: Option<PathBuf>,
}

impl Args {
    fn source(&self) -> Result<ConfigSource, ConfigError> {
        let duration = self.duration.as_deref().map(parse_duration).transpose()?;
        Ok(ConfigSource {
            concurrency: self.par,
            header: self.header.clone(),
            duration,
            log: self.log.clone(),
            timeout_ms: self.timeout_ms,
            seed: self.seed,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RunResult {
    timestamp: String,
    concurrency: usize,
    duration_ms: Option<u64>,
    generated: u64,
    stop_reason: StopReason,
    workers_lost: usize,
    #[serde(flatten)]
    summary: RunSummary,
}

#[tokio::main]
async fn main() -> ExitCode {
    // stdout carries the progress stream, so diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", render_error(&e));
            ExitCode::FAILURE
        }
    }
}

/// Fatal errors are reported as a single `Error: ...` line, causes
/// joined with `: `.
fn render_error(e: &anyhow::Error) -> String {
    format!("Error: {e:#}")
}

async fn run(args: Args) -> Result<()> {
    let mut source = args.source()?;
    if let Some(path) = &args.config {
        let file = ConfigFile::from_file(path)?;
        source = source.or(file.run);
    }
    let settings = source.resolve()?;

    let log = match &settings.log_path {
        Some(path) => Some(open_log(path)?),
        None => None,
    };

    let urls = read_targets(io::stdin().lock())?;
    info!("Loaded {} URLs", urls.len());

    let fetcher = HttpFetcher::new(settings.run.timeout).context("Failed to build HTTP client")?;
    let supervisor = Supervisor::new(settings.run.clone(), Arc::new(fetcher));

    let report = supervisor
        .run::<_, File, _>(urls, io::stdout(), log, shutdown_signal())
        .await?;

    if let Some(path) = &args.summary_json {
        let result = RunResult {
            timestamp: chrono::Utc::now().to_rfc3339(),
            concurrency: settings.run.concurrency,
            duration_ms: settings.run.duration.map(millis),
            generated: report.generated,
            stop_reason: report.stop_reason,
            workers_lost: report.workers_lost,
            summary: report.summary.clone(),
        };
        let result_json = serde_json::to_string_pretty(&result)?;
        std::fs::write(path, result_json)
            .with_context(|| format!("Failed to write summary to {:?}", path))?;
        info!("Summary written to {:?}", path);
    }

    print_summary(&report);
    Ok(())
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Resolves on the first Ctrl-C; a second one exits immediately. If the
/// handler cannot be installed the run simply has no external stop.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Interrupted, draining in-flight requests (Ctrl-C again to force exit)");

    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nForced exit!");
            std::process::exit(130);
        }
    });
}

fn print_summary(report: &RunReport) {
    let s = &report.summary;
    info!(
        "Summary: total={} ok={} 1xx={} 2xx={} 3xx={} 4xx={} 5xx={} errors={} rps={} p50={}ms p95={}ms p99={}ms elapsed={}ms",
        s.total,
        s.ok,
        s.informational,
        s.other_2xx,
        s.redirects,
        s.client_errors,
        s.server_errors,
        s.transport_errors,
        s.requests_per_sec,
        s.latency_p50_ms,
        s.latency_p95_ms,
        s.latency_p99_ms,
        s.elapsed_ms
    );
    if report.workers_lost > 0 {
        warn!(
            "{} worker(s) left the pool after failing to build a request",
            report.workers_lost
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwritable_log_is_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("run.log");
        let err = anyhow::Error::from(open_log(&path).unwrap_err());

        let rendered = render_error(&err);
        assert_eq!(rendered.lines().count(), 1, "{rendered}");
        assert!(rendered.starts_with("Error: error creating log file "));
    }

    #[test]
    fn test_config_errors_are_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[run\nconcurrency = \"x\"\n").unwrap();

        let errors = [
            ConfigFile::from_file(&bad).unwrap_err(),
            ConfigFile::from_file(dir.path().join("absent.toml")).unwrap_err(),
            parse_duration("5x").unwrap_err(),
            ConfigError::NoUrls,
        ];
        for err in errors {
            let rendered = render_error(&anyhow::Error::from(err));
            assert_eq!(rendered.lines().count(), 1, "{rendered}");
        }
    }

    #[test]
    fn test_context_stays_on_one_line() {
        let err = anyhow::Error::from(ConfigError::NoUrls).context("Failed to start");
        assert_eq!(render_error(&err), "Error: Failed to start: no URLs found");
    }

    #[test]
    fn test_bad_duration_flag() {
        let args = Args::parse_from(["tickle", "--duration", "5x"]);
        assert!(matches!(
            args.source(),
            Err(ConfigError::BadDuration { .. })
        ));

        let args = Args::parse_from(["tickle", "--duration", "1m 30s", "-c", "3"]);
        let source = args.source().unwrap();
        assert_eq!(source.duration, Some(Duration::from_secs(90)));
        assert_eq!(source.concurrency, Some(3));
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}
