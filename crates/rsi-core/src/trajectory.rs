//! Iteration trajectories
//!
//! Everything the sequencer produced during one iteration, in a shape that
//! can later be emitted as fine-tuning data. Nothing here is persisted.

use chrono::{DateTime, Utc};
use rsi_prompts::{Challenge, SelectedChallenge};
use serde::Serialize;
use uuid::Uuid;

use crate::candidate::Candidate;
use crate::error::StageError;
use crate::parse::extract_code_block;
use crate::ranking::{MetaDecision, Ranking};
use crate::sequencer::PipelineState;

/// Generate → rank → meta-rank → select record of one stage
#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub candidates: Vec<Candidate<String>>,
    pub rankings: Vec<Ranking>,
    pub decision: MetaDecision,
    pub selected: Candidate<String>,
}

impl StageRecord {
    /// Source code of the selected artifact, when it came in a fenced block
    pub fn selected_code(&self) -> Option<&str> {
        extract_code_block(&self.selected.payload)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChallengeTrajectory {
    pub challenge: Challenge,
    pub evaluation_function: StageRecord,
    pub solution: StageRecord,
    /// Review of the evaluation function rankings once the solution was known
    pub ranking_review: Option<MetaDecision>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChallengeFailure {
    pub challenge_id: String,
    pub state: PipelineState,
    pub kind: &'static str,
    pub error: String,
}

impl ChallengeFailure {
    pub fn new(challenge_id: impl Into<String>, state: PipelineState, error: &StageError) -> Self {
        Self {
            challenge_id: challenge_id.into(),
            state,
            kind: error.kind(),
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChallengeOutcome {
    Completed(ChallengeTrajectory),
    Failed(ChallengeFailure),
}

impl ChallengeOutcome {
    pub fn challenge_id(&self) -> &str {
        match self {
            Self::Completed(trajectory) => &trajectory.challenge.id,
            Self::Failed(failure) => &failure.challenge_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IterationReport {
    pub iteration_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub challenges: Vec<Challenge>,
    pub selection: Vec<SelectedChallenge>,
    pub outcomes: Vec<ChallengeOutcome>,
}

impl IterationReport {
    pub fn completed(&self) -> impl Iterator<Item = &ChallengeTrajectory> {
        self.outcomes.iter().filter_map(|o| match o {
            ChallengeOutcome::Completed(trajectory) => Some(trajectory),
            ChallengeOutcome::Failed(_) => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &ChallengeFailure> {
        self.outcomes.iter().filter_map(|o| match o {
            ChallengeOutcome::Failed(failure) => Some(failure),
            ChallengeOutcome::Completed(_) => None,
        })
    }
}
