//! RSI Prompts - prompt templates for the self-play pipeline
//!
//! Templates are organized by task family:
//! - coding: challenge, evaluation function and solution prompts
//! - schema: JSON wire schemas embedded in structured prompts

pub mod coding;
pub mod schema;

pub use coding::SYSTEM_PROMPT;
pub use schema::{
    schema_text, Challenge, EvaluationFunctionVerdict, RankingVerdict, SelectedChallenge,
    SolutionRankingEntry,
};
