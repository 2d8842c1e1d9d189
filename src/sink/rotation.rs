use crate::source::record::Record;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// When the current batch becomes a file. Exactly one mode per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPolicy {
    /// Flush once the batch holds this many records.
    Count(usize),
    /// Flush once this long has passed since the previous flush.
    Interval(Duration),
}

impl RotationPolicy {
    pub fn is_ready(&self, batch: &Batch, last_flush: Instant, now: Instant) -> bool {
        if batch.is_empty() {
            return false;
        }
        match self {
            RotationPolicy::Count(threshold) => batch.len() >= *threshold,
            RotationPolicy::Interval(interval) => last_flush
                .checked_add(*interval)
                .is_some_and(|due| now >= due),
        }
    }

    /// Instant at which a non-empty batch must be flushed even if no further
    /// record arrives. Count rotation has no deadline, and neither does an
    /// interval too long to land on the clock.
    pub fn deadline(&self, batch: &Batch, last_flush: Instant) -> Option<Instant> {
        match self {
            RotationPolicy::Interval(interval) if !batch.is_empty() => {
                last_flush.checked_add(*interval)
            }
            _ => None,
        }
    }
}

impl fmt::Display for RotationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationPolicy::Count(n) => write!(f, "every {} records", n),
            RotationPolicy::Interval(d) => write!(
                f,
                "every {}",
                humantime_serde::re::humantime::format_duration(*d)
            ),
        }
    }
}

/// Records received since the last rotation, in arrival order.
#[derive(Debug, Default)]
pub struct Batch {
    records: Vec<Record>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn last(&self) -> Option<&Record> {
        self.records.last()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
