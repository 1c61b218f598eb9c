use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    /// The device answered but a required field was absent.
    #[error("missing field {field} in response from {url}")]
    MissingField { field: &'static str, url: String },

    #[error("could not determine protocol variant for device at {host}")]
    UnknownVariant { host: String },

    #[error("invalid override level: {0} (expected 0-100 or 255)")]
    InvalidOverride(u8),

    #[error("failed to set up coordinator: {0}")]
    Setup(#[source] Box<Error>),

    #[error("update failed: {0}")]
    UpdateFailed(#[source] Box<Error>),

    #[error("{parameter} value {value} is outside {min}..={max}")]
    OutOfRange {
        parameter: &'static str,
        value: i64,
        min: f64,
        max: f64,
    },

    #[error("failed to set {command} to {value}")]
    CommandRejected { command: &'static str, value: String },

    #[error("failed to set {command} to {value}: {source}")]
    CommandFailed {
        command: &'static str,
        value: String,
        #[source]
        source: Box<Error>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for requests that ran out of time, including wrapped ones.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout { .. } => true,
            Error::Http(e) => e.is_timeout(),
            Error::Setup(inner) | Error::UpdateFailed(inner) => inner.is_timeout(),
            Error::CommandFailed { source, .. } => source.is_timeout(),
            _ => false,
        }
    }

    /// Network-level failures that may clear up on their own.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Timeout { .. } => true,
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            Error::UpdateFailed(inner) => inner.is_transient(),
            _ => false,
        }
    }

    pub(crate) fn from_request(url: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout {
                url: url.to_string(),
            }
        } else {
            Error::Http(e)
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
