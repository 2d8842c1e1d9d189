use crate::config::types::SourceMode;
use std::fmt;

/// The upstream feed for one run, with exactly the parameters its mode needs.
///
/// Built once by config validation and never mutated afterwards; the
/// collector keeps its own pagination cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    ContinuousStream {
        keywords: Vec<String>,
    },
    PaginatedPoll {
        keywords: Vec<String>,
        since_id: u64,
        max_id: Option<u64>,
        per_page: u32,
    },
    PartitionedStream {
        partition: u32,
    },
}

impl SourceSpec {
    pub fn mode(&self) -> SourceMode {
        match self {
            SourceSpec::ContinuousStream { .. } => SourceMode::ContinuousStream,
            SourceSpec::PaginatedPoll { .. } => SourceMode::PaginatedPoll,
            SourceSpec::PartitionedStream { .. } => SourceMode::PartitionedStream,
        }
    }

    /// The long-lived request for streaming modes, `None` for polling.
    pub fn stream_request(&self) -> Option<StreamRequest> {
        match self {
            SourceSpec::ContinuousStream { keywords } => Some(StreamRequest::Filter {
                keywords: keywords.clone(),
            }),
            SourceSpec::PartitionedStream { partition } => Some(StreamRequest::Partition {
                partition: *partition,
            }),
            SourceSpec::PaginatedPoll { .. } => None,
        }
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::ContinuousStream { keywords } => {
                let shown: Vec<&str> = keywords.iter().take(10).map(String::as_str).collect();
                write!(f, "continuous-stream [{}]", shown.join(", "))
            }
            SourceSpec::PaginatedPoll {
                keywords, since_id, ..
            } => write!(
                f,
                "paginated-poll ({} keywords, since_id {})",
                keywords.len(),
                since_id
            ),
            SourceSpec::PartitionedStream { partition } => {
                write!(f, "partitioned-stream (partition {})", partition)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamRequest {
    Filter { keywords: Vec<String> },
    Partition { partition: u32 },
}

/// One page of a search query. `max_id` moves down as pages are consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub keywords: Vec<String>,
    pub since_id: u64,
    pub max_id: Option<u64>,
    pub count: u32,
}

impl PageQuery {
    /// Keywords OR-ed together, each one parenthesised.
    pub fn query_string(&self) -> String {
        format!("({})", self.keywords.join(") OR ("))
    }
}
