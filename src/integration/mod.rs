//! Wiring of client, audio and session into complete turns

pub mod config;
pub mod pipeline;

pub use config::ClientConfig;
pub use pipeline::{SuggestionDebouncer, TurnOutcome, TurnPipeline};
