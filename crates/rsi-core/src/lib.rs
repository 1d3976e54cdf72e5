//! RSI Core Library
//!
//! Model gateway, artifact generators, rankers and the stage sequencer for
//! the self-play code improvement loop.

pub mod candidate;
pub mod config;
pub mod error;
pub mod gateway;
pub mod generator;
pub mod meta;
pub mod parse;
pub mod ranking;
pub mod sequencer;
pub mod trajectory;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use candidate::{Candidate, CandidateId, CandidateSet, Stage};
pub use config::Config;
pub use error::StageError;
pub use gateway::{ChatModel, GatewayError, ModelGateway, OpenAiChat, RetryPolicy};
pub use sequencer::{PipelineConfig, PipelineState, Sequencer};
pub use trajectory::{ChallengeOutcome, IterationReport};
