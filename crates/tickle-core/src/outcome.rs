use crate::error::FetchError;
use crate::fetcher::FetchResponse;
use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

/// One URL handed from the generator to a worker.
pub type WorkItem = String;

/// Classified result of one dispatched request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    pub url: String,
    pub elapsed: Duration,
    pub kind: OutcomeKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeKind {
    /// HTTP 200.
    Success {
        status_line: String,
        headers: Vec<(String, String)>,
    },
    /// Any other status.
    HttpStatus {
        status_line: String,
        status_class: char,
        summary: String,
    },
    /// No response at all.
    TransportError { message: String },
}

/// Progress character for one outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    Ok,
    Error,
    /// Leading digit of the status code.
    Status(char),
}

impl Symbol {
    pub fn as_char(self) -> char {
        match self {
            Symbol::Ok => '.',
            Symbol::Error => 'e',
            Symbol::Status(digit) => digit,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl RequestOutcome {
    pub fn new(url: String, elapsed: Duration, fetched: Result<FetchResponse, FetchError>) -> Self {
        let kind = match fetched {
            Ok(response) if response.status == 200 => OutcomeKind::Success {
                status_line: response.status_line,
                headers: response.headers,
            },
            Ok(response) => OutcomeKind::HttpStatus {
                status_class: status_class(response.status),
                status_line: response.status_line,
                summary: response.summary,
            },
            Err(e) => OutcomeKind::TransportError {
                message: e.to_string(),
            },
        };
        Self { url, elapsed, kind }
    }

    pub fn symbol(&self) -> Symbol {
        match &self.kind {
            OutcomeKind::Success { .. } => Symbol::Ok,
            OutcomeKind::HttpStatus { status_class, .. } => Symbol::Status(*status_class),
            OutcomeKind::TransportError { .. } => Symbol::Error,
        }
    }

    /// Append this outcome's record to the detail log.
    ///
    /// URL, one summary line, `name: value` lines for a 200, then two
    /// empty lines' worth of terminator.
    pub fn write_record<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        let mut lines = vec![self.url.clone()];
        match &self.kind {
            OutcomeKind::Success {
                status_line,
                headers,
            } => {
                lines.push(status_line.clone());
                lines.extend(headers.iter().map(|(k, v)| format!("{k}: {v}")));
            }
            OutcomeKind::HttpStatus { summary, .. } => lines.push(summary.clone()),
            OutcomeKind::TransportError { message } => lines.push(format!("Error {message}")),
        }
        lines.push(String::new());
        lines.push(String::new());
        out.write_all(lines.join("\n").as_bytes())
    }
}

fn status_class(status: u16) -> char {
    char::from_digit(u32::from(status / 100) % 10, 10).unwrap_or('?')
}
