use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Everything that can stop or interrupt a collection run.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("request for startIndex={start_index} failed: {source}")]
    Request {
        start_index: u64,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to decode page at startIndex={start_index}: {source}")]
    Decode {
        start_index: u64,
        #[source]
        source: serde_json::Error,
    },
    #[error("giving up after {failures} consecutive failures, last: {last}")]
    TooManyFailures {
        failures: u32,
        last: Box<CollectError>,
    },
    #[error("cursor stalled at {cursor}: server reported startIndex={start_index} resultsPerPage={results_per_page} of {total_results}")]
    CursorStalled {
        cursor: u64,
        start_index: u64,
        results_per_page: u64,
        total_results: u64,
    },
    #[error("record has no string `id` field")]
    MissingId,
    #[error("record id {0:?} is too short to carry a year")]
    MalformedId(String),
    #[error("record id {0:?} does not carry a four digit year")]
    InvalidYear(String),
    #[error("{operation} {path:?}: {source}")]
    Io {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("deadline reached while waiting for a request slot")]
    DeadlineExceeded,
    #[error("configuration error: {0}")]
    Config(String),
}

impl CollectError {
    /// Remote failures that may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Request { .. } | Self::Decode { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, operation: &'static str, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            operation,
            source,
        }
    }
}

pub type Result<T, E = CollectError> = std::result::Result<T, E>;
