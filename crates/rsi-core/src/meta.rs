//! Meta-Ranker
//!
//! Second-order judgment: picks the most trustworthy of several rankings of
//! the same candidate set. Only candidate identifiers and the rankings'
//! orderings and rationales are shown, never the candidate payloads.

use rsi_prompts::coding;
use tracing::{debug, info};

use crate::candidate::{CandidateSet, Stage};
use crate::error::StageError;
use crate::generator::ArtifactGenerator;
use crate::parse;
use crate::ranking::{MetaDecision, Ranking};

pub struct MetaRanker {
    generator: ArtifactGenerator,
}

impl MetaRanker {
    pub fn new(generator: ArtifactGenerator) -> Self {
        Self { generator }
    }

    /// Select the most trustworthy ranking; the returned index is always `< rankings.len()`
    pub async fn select_best_ranking<T>(
        &self,
        candidates: &CandidateSet<T>,
        rankings: &[Ranking],
    ) -> Result<MetaDecision, StageError> {
        let stage = candidates.stage();

        match rankings.len() {
            0 => return Err(StageError::EmptyCandidateSet { stage }),
            1 => {
                debug!("Single {} ranking, nothing to meta-rank", stage);
                return Ok(MetaDecision {
                    ranking_index: 0,
                    rationale: "only one ranking was produced".to_string(),
                });
            }
            _ => {}
        }

        let rendered: Vec<String> = rankings.iter().map(|r| r.judgment.render()).collect();
        let prompt = coding::evaluate_rankings(stage.judging_task(), &candidates.ids(), &rendered);

        let verdict = self
            .generator
            .generate_structured(&prompt, |text| parse::ranking_verdict(stage, text))
            .await?;

        let decision = decide(stage, rankings.len(), verdict.best_ranking_id, verdict.rationale)?;
        info!(
            "Meta-ranker chose {} ranking {} of {}",
            stage,
            decision.ranking_index,
            rankings.len()
        );
        Ok(decision)
    }
}

/// Validate a ranking index chosen by the model against the number of rankings
pub(crate) fn decide(
    stage: Stage,
    ranking_count: usize,
    ranking_index: usize,
    rationale: String,
) -> Result<MetaDecision, StageError> {
    if ranking_index >= ranking_count {
        return Err(StageError::UnresolvableIdentifier {
            stage,
            id: format!("ranking {}", ranking_index),
        });
    }
    Ok(MetaDecision {
        ranking_index,
        rationale,
    })
}
