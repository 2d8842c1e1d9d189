pub mod archive;
pub mod cli;
pub mod collector;
pub mod config;
pub mod pipeline;
pub mod sink;
pub mod source;
