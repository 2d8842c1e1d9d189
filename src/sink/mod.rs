pub mod rotation;
pub mod runner;
pub mod writer;

pub use rotation::{Batch, RotationPolicy};
pub use runner::{Sink, SinkError, SinkReport, SinkSettings};
pub use writer::{BatchWriter, WriteError};
