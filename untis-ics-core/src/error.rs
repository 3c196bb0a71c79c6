use chrono::{DateTime, FixedOffset};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date/time parsing failed: {0}")]
    DateTime(#[from] chrono::ParseError),

    #[error("Provider error: {provider} - {message}")]
    Provider { provider: String, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unknown timezone: {0}")]
    Timezone(String),

    #[error("Authentication failed for provider: {0}")]
    Authentication(String),

    #[error("Network timeout")]
    Timeout,

    #[error("ICS parsing failed: {0}")]
    IcsParse(String),

    #[error("Internal contract violated: {0}")]
    ContractViolation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Reason a single raw lesson record was dropped during normalization.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing remote identifier")]
    MissingRemoteId,

    #[error("missing start time")]
    MissingStart,

    #[error("missing end time")]
    MissingEnd,

    #[error("non-positive duration: {start} .. {end}")]
    NonPositiveDuration {
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    },

    #[error("unrecognised status tag: {0:?}")]
    UnknownStatus(String),
}
