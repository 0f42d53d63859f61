use crate::config::HeaderSpec;
use crate::error::FetchError;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;

pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<FetchResponse, FetchError>> + Send + 'a>>;

/// What a worker keeps of a response once the body has been released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    /// e.g. `"404 Not Found"`
    pub status_line: String,
    /// One entry per header name; repeated values are joined with `", "`.
    pub headers: Vec<(String, String)>,
    /// Human readable dump of the whole response head.
    pub summary: String,
}

impl FetchResponse {
    /// Build a response from a bare status code.
    pub fn from_status(status: u16) -> Self {
        let status_line = status_line(status);
        Self {
            status,
            summary: format!("Response {{ status: {status_line} }}"),
            status_line,
            headers: Vec::new(),
        }
    }
}

/// Transport seam: performs one GET.
///
/// Implementations are shared by every worker and must not need `&mut`.
pub trait Fetcher: Send + Sync {
    fn name(&self) -> &'static str;

    fn fetch<'a>(&'a self, url: &'a str, header: Option<&'a HeaderSpec>) -> FetchFuture<'a>;
}

/// reqwest-backed fetcher. The client is built once and never mutated.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

impl Fetcher for HttpFetcher {
    fn name(&self) -> &'static str {
        "http"
    }

    fn fetch<'a>(&'a self, url: &'a str, header: Option<&'a HeaderSpec>) -> FetchFuture<'a> {
        Box::pin(async move {
            let mut request = self.client.get(url);
            if let Some(header) = header {
                request = request.header(header.name().clone(), header.value().clone());
            }
            let request = request
                .build()
                .map_err(|e| FetchError::Build(e.to_string()))?;

            let response = self
                .client
                .execute(request)
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))?;

            let status = response.status();
            let fetched = FetchResponse {
                status: status.as_u16(),
                status_line: status.to_string(),
                headers: collect_headers(response.headers()),
                summary: format!("{response:?}"),
            };

            // Drain so the connection can go back to the pool.
            if let Err(e) = response.bytes().await {
                tracing::debug!(url, error = %e, "Failed to drain response body");
            }

            Ok(fetched)
        })
    }
}

fn status_line(status: u16) -> String {
    match StatusCode::from_u16(status) {
        Ok(code) => code.to_string(),
        Err(_) => status.to_string(),
    }
}

fn collect_headers(map: &HeaderMap) -> Vec<(String, String)> {
    map.keys()
        .map(|name| {
            let values: Vec<String> = map
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect();
            (name.as_str().to_string(), values.join(", "))
        })
        .collect()
}

/// Scripted reply for [`MockFetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    Status(u16),
    Headers(Vec<(String, String)>),
    Transport(String),
    Build(String),
}

/// A request seen by [`MockFetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRequest {
    pub url: String,
    pub header: Option<(String, String)>,
}

/// In-memory fetcher for tests (replies 200 unless told otherwise).
pub struct MockFetcher {
    delay: Duration,
    replies: HashMap<String, MockReply>,
    seen: Mutex<Vec<SeenRequest>>,
}

impl MockFetcher {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            replies: HashMap::new(),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(mut self, url: impl Into<String>, reply: MockReply) -> Self {
        self.replies.insert(url.into(), reply);
        self
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Fetcher for MockFetcher {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn fetch<'a>(&'a self, url: &'a str, header: Option<&'a HeaderSpec>) -> FetchFuture<'a> {
        Box::pin(async move {
            self.seen
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(SeenRequest {
                    url: url.to_string(),
                    header: header.map(|h| {
                        (
                            h.name().as_str().to_string(),
                            String::from_utf8_lossy(h.value().as_bytes()).into_owned(),
                        )
                    }),
                });

            let reply = self.replies.get(url).cloned().unwrap_or(MockReply::Status(200));
            // A request that cannot be built never reaches the wire.
            if !matches!(reply, MockReply::Build(_)) && !self.delay.is_zero() {
                sleep(self.delay).await;
            }

            match reply {
                MockReply::Status(code) => Ok(FetchResponse::from_status(code)),
                MockReply::Headers(headers) => Ok(FetchResponse {
                    headers,
                    ..FetchResponse::from_status(200)
                }),
                MockReply::Transport(message) => Err(FetchError::Transport(message)),
                MockReply::Build(message) => Err(FetchError::Build(message)),
            }
        })
    }
}
