//! Candidates and candidate sets
//!
//! A candidate is one generated artifact plus an identifier that is unique
//! within its set. Identifiers are the only way rankings refer to candidates,
//! so every winner is found by lookup, never by position.

use std::fmt;

use rsi_prompts::Challenge;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StageError;

/// Pipeline stage a candidate set belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Challenge,
    EvaluationFunction,
    Solution,
}

impl Stage {
    /// What the judges of this stage were asked to do, phrased for prompts
    pub fn judging_task(self) -> &'static str {
        match self {
            Self::Challenge => "select the programming challenges most worth pursuing",
            Self::EvaluationFunction => {
                "pick the best evaluation function for a programming challenge"
            }
            Self::Solution => "rank sample solutions to a programming challenge",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Challenge => "challenge",
            Self::EvaluationFunction => "evaluation function",
            Self::Solution => "solution",
        };
        f.write_str(name)
    }
}

/// Stage-local candidate identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(String);

impl CandidateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Generation slot this identifier was assigned from, if it is numeric
    pub fn index(&self) -> Option<usize> {
        self.0.parse().ok()
    }
}

impl From<usize> for CandidateId {
    fn from(index: usize) -> Self {
        Self(index.to_string())
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate<T> {
    pub id: CandidateId,
    pub payload: T,
}

/// Ordered candidates of one stage
#[derive(Debug, Clone, Serialize)]
pub struct CandidateSet<T> {
    stage: Stage,
    candidates: Vec<Candidate<T>>,
}

impl<T> CandidateSet<T> {
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate<T>> {
        self.candidates.iter()
    }

    pub fn ids(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.id.to_string()).collect()
    }

    /// Find a candidate by identifier.
    ///
    /// Model-chosen identifiers may repeat; the first candidate carrying the
    /// identifier wins, so repeated lookups always return the same candidate.
    pub fn resolve(&self, id: &CandidateId) -> Result<&Candidate<T>, StageError> {
        self.candidates
            .iter()
            .find(|c| &c.id == id)
            .ok_or_else(|| StageError::UnresolvableIdentifier {
                stage: self.stage,
                id: id.to_string(),
            })
    }

    pub fn into_candidates(self) -> Vec<Candidate<T>> {
        self.candidates
    }
}

impl CandidateSet<String> {
    /// Wrap generated artifacts, numbering them by generation order.
    ///
    /// Blank responses are dropped; the remaining artifacts keep the id of
    /// their generation slot. Fails when nothing usable came back.
    pub fn from_generated(stage: Stage, artifacts: Vec<String>) -> Result<Self, StageError> {
        let candidates: Vec<Candidate<String>> = artifacts
            .into_iter()
            .enumerate()
            .filter_map(|(index, payload)| {
                if payload.trim().is_empty() {
                    warn!("Dropping blank {} artifact {}", stage, index);
                    return None;
                }
                Some(Candidate {
                    id: CandidateId::from(index),
                    payload,
                })
            })
            .collect();

        if candidates.is_empty() {
            return Err(StageError::EmptyCandidateSet { stage });
        }

        Ok(Self { stage, candidates })
    }

    /// Artifact bodies under their generation slot, as shown to judges
    pub fn numbered_bodies(&self) -> Vec<(usize, String)> {
        self.candidates
            .iter()
            .filter_map(|c| c.id.index().map(|index| (index, c.payload.clone())))
            .collect()
    }
}

impl CandidateSet<Challenge> {
    /// Wrap model-proposed challenges under their own identifiers
    pub fn from_challenges(challenges: Vec<Challenge>) -> Result<Self, StageError> {
        if challenges.is_empty() {
            return Err(StageError::EmptyCandidateSet {
                stage: Stage::Challenge,
            });
        }

        let candidates = challenges
            .into_iter()
            .map(|challenge| Candidate {
                id: CandidateId::new(challenge.id.clone()),
                payload: challenge,
            })
            .collect();

        Ok(Self {
            stage: Stage::Challenge,
            candidates,
        })
    }

    pub fn challenges(&self) -> Vec<Challenge> {
        self.candidates.iter().map(|c| c.payload.clone()).collect()
    }
}
