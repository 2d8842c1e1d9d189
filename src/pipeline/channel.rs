use crate::source::record::{Record, StallWarning};
use tokio::sync::{mpsc, watch};

pub type Sender<T> = mpsc::Sender<T>;
pub type Receiver<T> = mpsc::Receiver<T>;

/// Create a bounded channel with the specified buffer size
pub fn create_channel<T>(buffer_size: usize) -> (Sender<T>, Receiver<T>) {
    mpsc::channel(buffer_size)
}

/// What travels from the collector to the sink.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Record(Record),
    /// Logged by the sink; has no effect on flow control.
    StallWarning(StallWarning),
    /// Last message of a run. Nothing follows it.
    End(EndReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The source has no more records (an empty search page).
    Exhausted,
    /// A stop was requested.
    Stopped,
    /// The collector hit a fatal error.
    Failed,
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndReason::Exhausted => write!(f, "exhausted"),
            EndReason::Stopped => write!(f, "stopped"),
            EndReason::Failed => write!(f, "failed"),
        }
    }
}

/// Resolves once a stop is requested. Never resolves if the sender is gone.
pub async fn stop_signal(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
