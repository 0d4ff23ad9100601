use chrono::NaiveDate;
use thiserror::Error;

pub type Result<T, E = RateError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RateError {
    #[error("Failed to fetch exchange rate archive from {url}: {reason}")]
    FetchFailed {
        url: String,
        reason: String,
        /// HTTP status of the response, absent for transport failures.
        status: Option<u16>,
    },

    #[error("Invalid exchange rate archive: {0}")]
    InvalidArchive(String),

    #[error("Malformed row at line {line}: {reason}")]
    MalformedRow { line: u64, reason: String },

    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("No exchange rates available on or before {date}")]
    NoDataAvailable { date: NaiveDate },

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
}

impl RateError {
    pub(crate) fn fetch_failed(url: &str, reason: impl ToString) -> Self {
        RateError::FetchFailed {
            url: url.to_string(),
            reason: reason.to_string(),
            status: None,
        }
    }

    pub(crate) fn http_status(url: &str, status: u16, reason: impl ToString) -> Self {
        RateError::FetchFailed {
            url: url.to_string(),
            reason: reason.to_string(),
            status: Some(status),
        }
    }

    /// True for fetch failures that may succeed on another attempt: transport
    /// errors, `429 Too Many Requests` and server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            RateError::FetchFailed { status: None, .. } => true,
            RateError::FetchFailed {
                status: Some(code), ..
            } => *code == 429 || *code >= 500,
            _ => false,
        }
    }

    pub(crate) fn malformed(line: u64, reason: impl Into<String>) -> Self {
        RateError::MalformedRow {
            line,
            reason: reason.into(),
        }
    }
}
