//! Error kinds raised by the feed pipeline.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    /// A field could not be parsed. Fatal to the feed's ingestion.
    #[error("malformed {context}: {value:?} ({reason})")]
    MalformedValue {
        context: String,
        value: String,
        reason: String,
    },
    /// Rows that other rows depend on are absent from the source feed.
    #[error("missing dependency: {0}")]
    MissingDependency(String),
    /// The caller asked for an operation the feed is not ready for.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    /// Network or remote storage failure. Safe for the caller to retry.
    #[error("transport failure: {0}")]
    TransientTransportFailure(String),
    #[error("corrupt archive {path}: {source}")]
    CorruptArchive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, FeedError>;

impl FeedError {
    pub fn malformed(
        context: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        FeedError::MalformedValue {
            context: context.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Re-labels a [`FeedError::MalformedValue`] with the table column it came from.
    pub fn in_column(self, table: &str, column: &str) -> Self {
        match self {
            FeedError::MalformedValue { value, reason, .. } => FeedError::MalformedValue {
                context: format!("{table}.{column}"),
                value,
                reason,
            },
            other => other,
        }
    }

    pub fn transport(err: impl std::fmt::Display) -> Self {
        FeedError::TransientTransportFailure(err.to_string())
    }

    /// Only transport failures are worth retrying; everything else is a property of the data.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FeedError::TransientTransportFailure(_))
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        FeedError::transport(err)
    }
}
