//! Stage Sequencer
//!
//! Drives one self-play iteration:
//!
//! 1. Generate challenges and select the top N worth pursuing
//! 2. For each selected challenge:
//!    - generate evaluation functions, rank them with independent judges,
//!      meta-rank the rankings and select the winner
//!    - generate solutions against the winning evaluation function and select
//!      the best one the same way
//!    - review the evaluation function rankings in light of the chosen solution
//!
//! A failure inside one challenge's pipeline is logged and recorded; the
//! iteration moves on to the next challenge.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use rsi_prompts::{coding, Challenge, SelectedChallenge};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::candidate::{Candidate, CandidateId, CandidateSet, Stage};
use crate::error::StageError;
use crate::gateway::ModelGateway;
use crate::generator::ArtifactGenerator;
use crate::meta::{decide, MetaRanker};
use crate::parse;
use crate::ranking::{Judgment, MetaDecision, Ranking, RankingGenerator};
use crate::trajectory::{
    ChallengeFailure, ChallengeOutcome, ChallengeTrajectory, IterationReport, StageRecord,
};

/// Fan-out sizes and hardening knobs for one iteration
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Challenges generated per iteration
    pub challenges: usize,
    /// Challenges selected for the rest of the pipeline
    pub top_challenges: usize,
    /// Independent challenge selections; more than one goes through the meta-ranker
    pub challenge_judges: usize,
    pub evaluation_functions: usize,
    pub evaluation_function_judges: usize,
    pub solutions: usize,
    pub solution_judges: usize,
    /// Correction re-asks after a schema violation
    pub schema_retries: usize,
    /// Requests of one fan-out allowed in flight at once
    pub max_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            challenges: 10,
            top_challenges: 5,
            challenge_judges: 1,
            evaluation_functions: 5,
            evaluation_function_judges: 2,
            solutions: 5,
            solution_judges: 2,
            schema_retries: 1,
            max_concurrency: 1,
        }
    }
}

impl PipelineConfig {
    /// Small fan-outs for trying out prompts cheaply
    pub fn development() -> Self {
        Self {
            challenges: 4,
            top_challenges: 1,
            evaluation_functions: 2,
            solutions: 2,
            ..Default::default()
        }
    }

    /// Use `judges` independent rankings for evaluation functions and solutions
    pub fn with_judges(mut self, judges: usize) -> Self {
        self.evaluation_function_judges = judges;
        self.solution_judges = judges;
        self
    }
}

/// Position in the per-iteration state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    GenerateChallenges,
    SelectChallenges,
    GenerateEvalFns,
    RankEvalFns,
    MetaRankEvalFns,
    SelectEvalFn,
    GenerateSolutions,
    RankSolutions,
    MetaRankSolutions,
    SelectSolution,
    ReviewEvalFnRankings,
    Done,
}

impl PipelineState {
    /// Rank, meta-rank and select states of a stage
    fn selection_states(stage: Stage) -> (Self, Self, Self) {
        match stage {
            Stage::Challenge => (
                Self::SelectChallenges,
                Self::SelectChallenges,
                Self::SelectChallenges,
            ),
            Stage::EvaluationFunction => {
                (Self::RankEvalFns, Self::MetaRankEvalFns, Self::SelectEvalFn)
            }
            Stage::Solution => (
                Self::RankSolutions,
                Self::MetaRankSolutions,
                Self::SelectSolution,
            ),
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GenerateChallenges => "GENERATE_CHALLENGES",
            Self::SelectChallenges => "SELECT_CHALLENGES",
            Self::GenerateEvalFns => "GENERATE_EVAL_FNS",
            Self::RankEvalFns => "RANK_EVAL_FNS",
            Self::MetaRankEvalFns => "META_RANK_EVAL_FNS",
            Self::SelectEvalFn => "SELECT_EVAL_FN",
            Self::GenerateSolutions => "GENERATE_SOLUTIONS",
            Self::RankSolutions => "RANK_SOLUTIONS",
            Self::MetaRankSolutions => "META_RANK_SOLUTIONS",
            Self::SelectSolution => "SELECT_SOLUTION",
            Self::ReviewEvalFnRankings => "REVIEW_EVAL_FN_RANKINGS",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// A stage error together with the state it happened in
#[derive(Debug, thiserror::Error)]
#[error("{state}: {error}")]
pub struct StateFailure {
    pub state: PipelineState,
    pub error: StageError,
}

trait InState<T> {
    fn in_state(self, state: PipelineState) -> Result<T, StateFailure>;
}

impl<T> InState<T> for Result<T, StageError> {
    fn in_state(self, state: PipelineState) -> Result<T, StateFailure> {
        self.map_err(|error| StateFailure { state, error })
    }
}

/// Resolve the winner of the ranking the meta-ranker chose.
///
/// The winner is looked up by identifier; an identifier missing from the set
/// fails the stage instead of falling back to any default candidate.
pub fn select_winner<'a, T>(
    candidates: &'a CandidateSet<T>,
    rankings: &[Ranking],
    decision: &MetaDecision,
) -> Result<&'a Candidate<T>, StageError> {
    let stage = candidates.stage();
    let ranking = rankings
        .get(decision.ranking_index)
        .ok_or_else(|| StageError::UnresolvableIdentifier {
            stage,
            id: format!("ranking {}", decision.ranking_index),
        })?;
    let winner = ranking
        .judgment
        .winner()
        .ok_or(StageError::EmptyCandidateSet { stage })?;
    candidates.resolve(winner)
}

pub struct Sequencer {
    generator: ArtifactGenerator,
    rankings: RankingGenerator,
    meta: MetaRanker,
    config: PipelineConfig,
}

impl Sequencer {
    pub fn new(gateway: Arc<ModelGateway>, config: PipelineConfig) -> Self {
        let generator = ArtifactGenerator::new(gateway)
            .with_max_concurrency(config.max_concurrency)
            .with_schema_retries(config.schema_retries);

        Self {
            rankings: RankingGenerator::new(generator.clone()),
            meta: MetaRanker::new(generator.clone()),
            generator,
            config,
        }
    }

    /// Run one iteration over the top challenges.
    ///
    /// Fails only when no challenges could be generated or selected; failures
    /// of individual challenges are recorded in the report.
    pub async fn run_iteration(&self) -> Result<IterationReport, StageError> {
        let iteration_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!("Starting iteration {}", iteration_id);

        let challenges = match self.generate_challenges().await {
            Ok(challenges) => challenges,
            Err(e) => {
                error!("{} failed: {}", PipelineState::GenerateChallenges, e);
                return Err(e);
            }
        };

        let selection = match self.select_challenges(&challenges).await {
            Ok(selection) => selection,
            Err(e) => {
                error!("{} failed: {}", PipelineState::SelectChallenges, e);
                return Err(e);
            }
        };

        let mut outcomes = Vec::with_capacity(selection.len());

        for selected in &selection {
            let challenge = match challenges.resolve(&CandidateId::new(selected.id.as_str())) {
                Ok(candidate) => candidate.payload.clone(),
                Err(e) => {
                    error!("Selected challenge {} cannot be processed: {}", selected.id, e);
                    outcomes.push(ChallengeOutcome::Failed(ChallengeFailure::new(
                        selected.id.as_str(),
                        PipelineState::SelectChallenges,
                        &e,
                    )));
                    continue;
                }
            };

            match self.run_challenge(&challenge).await {
                Ok(trajectory) => {
                    info!("Challenge {} completed", challenge.id);
                    outcomes.push(ChallengeOutcome::Completed(trajectory));
                }
                Err(failure) => {
                    error!(
                        "Challenge {} failed during {}: {}",
                        challenge.id, failure.state, failure.error
                    );
                    outcomes.push(ChallengeOutcome::Failed(ChallengeFailure::new(
                        challenge.id.as_str(),
                        failure.state,
                        &failure.error,
                    )));
                }
            }
        }

        let report = IterationReport {
            iteration_id,
            started_at,
            finished_at: Utc::now(),
            challenges: challenges.challenges(),
            selection,
            outcomes,
        };
        info!(
            "{}: iteration {} completed {} and failed {} challenges",
            PipelineState::Done,
            iteration_id,
            report.completed().count(),
            report.failures().count()
        );
        Ok(report)
    }

    async fn generate_challenges(&self) -> Result<CandidateSet<Challenge>, StageError> {
        info!(
            "{}: generating {} challenges",
            PipelineState::GenerateChallenges,
            self.config.challenges
        );

        let prompt = coding::generate_challenges(self.config.challenges);
        let challenges = self
            .generator
            .generate_structured(&prompt, parse::challenges)
            .await?;
        info!("Challenges: {:?}", challenges.iter().map(|c| &c.id).collect::<Vec<_>>());

        CandidateSet::from_challenges(challenges)
    }

    /// Pick the top challenges, best first.
    ///
    /// Unlike later stages this selects a subset rather than a single winner.
    /// Repeated ids are dropped before truncating to the top N, so lower
    /// ranked challenges fill the slots a repeat would have taken.
    async fn select_challenges(
        &self,
        challenges: &CandidateSet<Challenge>,
    ) -> Result<Vec<SelectedChallenge>, StageError> {
        let top_n = self.config.top_challenges;
        info!(
            "{}: selecting the best {} of {} challenges",
            PipelineState::SelectChallenges,
            top_n,
            challenges.len()
        );

        let prompt = coding::evaluate_challenges(&challenges.challenges(), top_n);
        let rankings = self
            .rankings
            .rank(
                Stage::Challenge,
                &prompt,
                self.config.challenge_judges,
                parse::challenge_selection,
            )
            .await?;
        let decision = self.meta.select_best_ranking(challenges, &rankings).await?;

        let chosen = rankings
            .get(decision.ranking_index)
            .map(|r| r.judgment.entries())
            .unwrap_or_default();
        let mut seen = HashSet::new();
        let selection: Vec<SelectedChallenge> = chosen
            .iter()
            .filter(|entry| {
                let first = seen.insert(entry.id.clone());
                if !first {
                    warn!("Challenge {} selected more than once, dropping repeat", entry.id);
                }
                first
            })
            .take(top_n)
            .map(|entry| SelectedChallenge {
                id: entry.id.to_string(),
                rationale: entry.rationale.clone(),
            })
            .collect();

        if selection.is_empty() {
            return Err(StageError::EmptyCandidateSet {
                stage: Stage::Challenge,
            });
        }

        info!(
            "Best n challenge ids: {:?}",
            selection.iter().map(|s| &s.id).collect::<Vec<_>>()
        );
        Ok(selection)
    }

    /// Push one challenge through the evaluation function and solution stages
    pub async fn run_challenge(
        &self,
        challenge: &Challenge,
    ) -> Result<ChallengeTrajectory, StateFailure> {
        info!(
            "{}: generating {} evaluation functions for challenge {}",
            PipelineState::GenerateEvalFns,
            self.config.evaluation_functions,
            challenge.id
        );
        let prompt = coding::generate_evaluation_function(challenge);
        let evaluation_functions = self
            .generate_candidates(
                Stage::EvaluationFunction,
                &prompt,
                self.config.evaluation_functions,
            )
            .await
            .in_state(PipelineState::GenerateEvalFns)?;

        let prompt = coding::evaluate_evaluation_functions(
            &challenge.description,
            &evaluation_functions.numbered_bodies(),
        );
        let evaluation_function = self
            .select_one(
                evaluation_functions,
                &prompt,
                self.config.evaluation_function_judges,
                parse::evaluation_function_verdict,
            )
            .await?;
        info!(
            "Best evaluation function for challenge {}: {}",
            challenge.id, evaluation_function.selected.id
        );

        info!(
            "{}: generating {} solutions for challenge {}",
            PipelineState::GenerateSolutions,
            self.config.solutions,
            challenge.id
        );
        let best_evaluation_function = &evaluation_function.selected.payload;
        let prompt = coding::generate_solutions(challenge, best_evaluation_function);
        let solutions = self
            .generate_candidates(Stage::Solution, &prompt, self.config.solutions)
            .await
            .in_state(PipelineState::GenerateSolutions)?;

        let prompt = coding::evaluate_solutions(
            challenge,
            best_evaluation_function,
            &solutions.numbered_bodies(),
        );
        let solution = self
            .select_one(
                solutions,
                &prompt,
                self.config.solution_judges,
                parse::solution_ranking,
            )
            .await?;
        info!("Best solution for challenge {}: {}", challenge.id, solution.selected.id);

        let ranking_review = self
            .review_evaluation_function_rankings(challenge, &evaluation_function, &solution)
            .await;

        Ok(ChallengeTrajectory {
            challenge: challenge.clone(),
            evaluation_function,
            solution,
            ranking_review,
        })
    }

    async fn generate_candidates(
        &self,
        stage: Stage,
        prompt: &str,
        count: usize,
    ) -> Result<CandidateSet<String>, StageError> {
        let artifacts = self.generator.generate(prompt, count).await?;
        debug!("Generated {} {} candidates", artifacts.len(), stage);
        CandidateSet::from_generated(stage, artifacts)
    }

    /// Rank → meta-rank → select for a stage that has exactly one winner
    async fn select_one<F>(
        &self,
        candidates: CandidateSet<String>,
        prompt: &str,
        judges: usize,
        parse: F,
    ) -> Result<StageRecord, StateFailure>
    where
        F: Fn(&str) -> Result<Judgment, StageError>,
    {
        let stage = candidates.stage();
        let (rank_state, meta_state, select_state) = PipelineState::selection_states(stage);

        info!("{}: asking {} judges", rank_state, judges);
        let rankings = self
            .rankings
            .rank(stage, prompt, judges, parse)
            .await
            .in_state(rank_state)?;

        info!("{}: choosing among {} rankings", meta_state, rankings.len());
        let decision = self
            .meta
            .select_best_ranking(&candidates, &rankings)
            .await
            .in_state(meta_state)?;

        let selected = select_winner(&candidates, &rankings, &decision)
            .in_state(select_state)?
            .clone();

        Ok(StageRecord {
            candidates: candidates.into_candidates(),
            rankings,
            decision,
            selected,
        })
    }

    /// Judge which evaluation function ranking held up once the solution was chosen.
    ///
    /// The review is recorded but never feeds back into the pipeline, so a
    /// failure here is logged and leaves the review empty.
    async fn review_evaluation_function_rankings(
        &self,
        challenge: &Challenge,
        evaluation_function: &StageRecord,
        solution: &StageRecord,
    ) -> Option<MetaDecision> {
        let rankings = &evaluation_function.rankings;
        if rankings.len() < 2 {
            debug!("Fewer than two evaluation function rankings, skipping review");
            return None;
        }

        info!("{}: challenge {}", PipelineState::ReviewEvalFnRankings, challenge.id);
        let rendered: Vec<String> = rankings.iter().map(|r| r.judgment.render()).collect();
        let prompt = coding::review_evaluation_function_rankings(
            challenge,
            &solution.selected.payload,
            &rendered,
        );

        let review = self
            .generator
            .generate_structured(&prompt, |text| {
                parse::ranking_verdict(Stage::EvaluationFunction, text)
            })
            .await
            .and_then(|verdict| {
                decide(
                    Stage::EvaluationFunction,
                    rankings.len(),
                    verdict.best_ranking_id,
                    verdict.rationale,
                )
            });

        match review {
            Ok(decision) => Some(decision),
            Err(e) => {
                warn!(
                    "{} failed for challenge {}: {}",
                    PipelineState::ReviewEvalFnRankings,
                    challenge.id,
                    e
                );
                None
            }
        }
    }
}
