pub mod channel;
pub mod runner;

pub use channel::{create_channel, EndReason, Message, Receiver, Sender};
pub use runner::{run_pipeline, PipelineError, PipelineReport};
