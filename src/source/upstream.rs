use crate::source::record::Record;
use crate::source::spec::{PageQuery, StreamRequest};
use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use thiserror::Error;

/// Disconnect codes after which reconnecting cannot help: malformed request,
/// duplicate stream, stall, and exceeded connection limit.
pub const FATAL_DISCONNECT_CODES: [i64; 4] = [2, 5, 6, 7];

pub fn is_fatal_disconnect(code: i64) -> bool {
    FATAL_DISCONNECT_CODES.contains(&code)
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("stream closed by upstream")]
    StreamClosed,

    #[error("disconnected by upstream (code {code}): {reason}")]
    Disconnect { code: i64, reason: String },

    #[error("pagination cannot advance: page carried no record ids")]
    CursorStalled,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout
        } else if e.is_builder() {
            UpstreamError::InvalidRequest(e.to_string())
        } else if e.is_decode() {
            UpstreamError::Malformed(e.to_string())
        } else {
            UpstreamError::Transport(e)
        }
    }
}

impl UpstreamError {
    /// Whether retrying the same request later can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::Transport(_)
            | UpstreamError::Timeout
            | UpstreamError::Malformed(_)
            | UpstreamError::StreamClosed => true,
            UpstreamError::Status { status, .. } => {
                matches!(*status, 420 | 429) || (500..600).contains(status)
            }
            UpstreamError::Disconnect { code, .. } => !is_fatal_disconnect(*code),
            UpstreamError::CursorStalled | UpstreamError::InvalidRequest(_) => false,
        }
    }
}

/// Raw items of a streaming response, one JSON document per item.
pub type ItemStream = Pin<Box<dyn Stream<Item = Result<Value, UpstreamError>> + Send>>;

/// The remote feed the collector reads from.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Open a long-lived streaming response.
    async fn open_stream(&self, request: &StreamRequest) -> Result<ItemStream, UpstreamError>;

    /// Fetch one page of search results, newest first.
    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<Record>, UpstreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disconnect(code: i64) -> UpstreamError {
        UpstreamError::Disconnect {
            code,
            reason: "test".to_string(),
        }
    }

    #[test]
    fn test_fatal_disconnect_codes_are_not_transient() {
        for code in FATAL_DISCONNECT_CODES {
            assert!(!disconnect(code).is_transient(), "code {} should be fatal", code);
        }
    }

    #[test]
    fn test_other_disconnect_codes_are_transient() {
        for code in [1, 3, 4, 8, 9, 10, 11, 12] {
            assert!(disconnect(code).is_transient(), "code {} should retry", code);
        }
    }

    #[test]
    fn test_status_classification() {
        let status = |status| UpstreamError::Status {
            status,
            body: String::new(),
        };
        assert!(status(420).is_transient());
        assert!(status(429).is_transient());
        assert!(status(503).is_transient());
        assert!(!status(401).is_transient());
        assert!(!status(404).is_transient());
    }

    #[test]
    fn test_network_and_malformed_are_transient() {
        assert!(UpstreamError::Timeout.is_transient());
        assert!(UpstreamError::StreamClosed.is_transient());
        assert!(UpstreamError::Malformed("bad json".to_string()).is_transient());
        assert!(!UpstreamError::CursorStalled.is_transient());
        assert!(!UpstreamError::InvalidRequest("bad url".to_string()).is_transient());
    }
}
