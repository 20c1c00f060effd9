use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure of a single page request
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Connection, timeout or body read failure
    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream returned HTTP {status}")]
    Status { status: u16 },

    #[error("response has no `keywords` array")]
    MissingRecords,

    /// 2xx response whose body could not be decoded
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Coarse classification used in failure reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    Upstream,
    MalformedResponse,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Upstream => "upstream",
            ErrorKind::MalformedResponse => "malformed_response",
        };
        f.write_str(name)
    }
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Transport(_) => ErrorKind::Transport,
            FetchError::Status { .. } | FetchError::MissingRecords => ErrorKind::Upstream,
            FetchError::Malformed(_) => ErrorKind::MalformedResponse,
        }
    }

    /// Whether repeating the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport(_) => true,
            FetchError::Status { status } => *status == 429 || *status >= 500,
            FetchError::MissingRecords | FetchError::Malformed(_) => false,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::Status { status } => Some(*status),
            _ => None,
        }
    }
}
