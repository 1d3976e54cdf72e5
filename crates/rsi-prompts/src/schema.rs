//! JSON wire schemas for structured model responses
//!
//! Every structured prompt embeds one of these schemas verbatim. The same
//! structs are used to parse the model's answer, so the contract the model
//! sees and the contract the parser enforces cannot drift apart.

use schemars::{generate::SchemaSettings, JsonSchema};
use serde::{Deserialize, Serialize};

/// A programming challenge proposed by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Challenge {
    /// Short unique identifier for the challenge, e.g. "reverse-words"
    pub id: String,
    /// Full problem statement, precise enough to write tests against
    pub description: String,
    /// Optional subject area, e.g. "strings" or "graphs"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// One entry of a top-N challenge selection, best first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SelectedChallenge {
    /// Identifier of a challenge from the given list
    pub id: String,
    /// Why this challenge is worth pursuing
    pub rationale: String,
}

/// A judge's single best pick among evaluation functions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EvaluationFunctionVerdict {
    /// Identifier of the best evaluation function
    pub best_evaluation_function_id: usize,
    /// Why this evaluation function is the most thorough and correct
    pub rationale: String,
}

/// One entry of a judge's solution ranking, best first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SolutionRankingEntry {
    /// Identifier of a sample solution
    pub sample_solution_id: usize,
    /// Why the solution is placed at this position
    pub rationale: String,
}

/// A selection of the most trustworthy ranking among several judges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RankingVerdict {
    /// Identifier of the most trustworthy ranking
    pub best_ranking_id: usize,
    /// Why this ranking is more trustworthy than the others
    pub rationale: String,
}

/// Render the draft-07 JSON Schema for `T` as pretty-printed text.
pub fn schema_text<T: JsonSchema>() -> String {
    let schema = SchemaSettings::draft07()
        .into_generator()
        .into_root_schema_for::<T>();
    format!("{:#}", schema.as_value())
}
