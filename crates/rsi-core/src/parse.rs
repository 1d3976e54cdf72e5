//! Parsing of untrusted model responses
//!
//! Structured responses are validated against their wire schema before any
//! typed domain object is built from them. Code responses stay opaque.

use rsi_prompts::{
    Challenge, EvaluationFunctionVerdict, RankingVerdict, SelectedChallenge, SolutionRankingEntry,
};
use serde::de::DeserializeOwned;

use crate::candidate::{CandidateId, Stage};
use crate::error::StageError;
use crate::ranking::{Judgment, RankedEntry};

/// Strip a Markdown fence the model wrapped around a JSON answer despite instructions
pub fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(body) = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    {
        // The opening line may carry an info string such as "json"
        return match body.find('\n') {
            Some(newline) => body[newline + 1..].trim(),
            None => body.trim(),
        };
    }
    trimmed
}

/// Parse a JSON response into its wire type
pub fn parse_json<T: DeserializeOwned>(stage: Stage, text: &str) -> Result<T, StageError> {
    serde_json::from_str(strip_fence(text)).map_err(|e| StageError::schema(stage, e.to_string()))
}

/// Body of the first fenced code block, if there is one
pub fn extract_code_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    let body_start = after_open.find('\n')? + 1;
    let body = &after_open[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim_end())
}

/// Generated challenge list
pub fn challenges(text: &str) -> Result<Vec<Challenge>, StageError> {
    let challenges: Vec<Challenge> = parse_json(Stage::Challenge, text)?;
    if challenges.is_empty() {
        return Err(StageError::EmptyCandidateSet {
            stage: Stage::Challenge,
        });
    }

    for (index, challenge) in challenges.iter().enumerate() {
        if challenge.id.trim().is_empty() {
            return Err(StageError::schema(
                Stage::Challenge,
                format!("challenge {} has an empty id", index),
            ));
        }
        if challenge.description.trim().is_empty() {
            return Err(StageError::schema(
                Stage::Challenge,
                format!("challenge {:?} has an empty description", challenge.id),
            ));
        }
    }

    Ok(challenges)
}

/// Top-N challenge selection, best first
pub fn challenge_selection(text: &str) -> Result<Judgment, StageError> {
    let selected: Vec<SelectedChallenge> = parse_json(Stage::Challenge, text)?;
    if selected.is_empty() {
        return Err(StageError::schema(Stage::Challenge, "selection is empty"));
    }

    Ok(Judgment::Ordered(
        selected
            .into_iter()
            .map(|s| RankedEntry {
                id: CandidateId::new(s.id),
                rationale: s.rationale,
            })
            .collect(),
    ))
}

/// A judge's best pick among evaluation functions
pub fn evaluation_function_verdict(text: &str) -> Result<Judgment, StageError> {
    let verdict: EvaluationFunctionVerdict = parse_json(Stage::EvaluationFunction, text)?;
    Ok(Judgment::BestPick(RankedEntry {
        id: CandidateId::from(verdict.best_evaluation_function_id),
        rationale: verdict.rationale,
    }))
}

/// A judge's full solution ranking, best first
pub fn solution_ranking(text: &str) -> Result<Judgment, StageError> {
    let entries: Vec<SolutionRankingEntry> = parse_json(Stage::Solution, text)?;
    if entries.is_empty() {
        return Err(StageError::schema(Stage::Solution, "ranking is empty"));
    }

    Ok(Judgment::Ordered(
        entries
            .into_iter()
            .map(|e| RankedEntry {
                id: CandidateId::from(e.sample_solution_id),
                rationale: e.rationale,
            })
            .collect(),
    ))
}

/// Selection of one ranking among several
pub fn ranking_verdict(stage: Stage, text: &str) -> Result<RankingVerdict, StageError> {
    parse_json(stage, text)
}
