pub mod http;
pub mod record;
pub mod spec;
pub mod timestamp;
pub mod upstream;

pub use http::{HttpUpstream, UpstreamSettings};
pub use record::{Record, StallWarning, StreamItem};
pub use spec::{PageQuery, SourceSpec, StreamRequest};
pub use timestamp::{TimestampError, TimestampFormat};
pub use upstream::{ItemStream, Upstream, UpstreamError};
