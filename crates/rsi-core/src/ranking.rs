//! Rankings and the Ranking Generator
//!
//! Each ranking is produced by an independent judge: a fresh request that
//! sees the candidate set but never another judge's output.

use serde::Serialize;
use tracing::info;

use crate::candidate::{CandidateId, Stage};
use crate::error::StageError;
use crate::generator::ArtifactGenerator;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedEntry {
    pub id: CandidateId,
    pub rationale: String,
}

/// A judge's verdict over one candidate set
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "entries", rename_all = "snake_case")]
pub enum Judgment {
    /// Full ordering, best first
    Ordered(Vec<RankedEntry>),
    /// Single best candidate
    BestPick(RankedEntry),
}

impl Judgment {
    /// Identifier of the top candidate
    pub fn winner(&self) -> Option<&CandidateId> {
        match self {
            Self::Ordered(entries) => entries.first().map(|e| &e.id),
            Self::BestPick(entry) => Some(&entry.id),
        }
    }

    pub fn entries(&self) -> &[RankedEntry] {
        match self {
            Self::Ordered(entries) => entries,
            Self::BestPick(entry) => std::slice::from_ref(entry),
        }
    }

    /// Plain-text rendering shown to the meta-ranker
    pub fn render(&self) -> String {
        match self {
            Self::Ordered(entries) => entries
                .iter()
                .enumerate()
                .map(|(position, e)| format!("{}. {}: {}", position + 1, e.id, e.rationale))
                .collect::<Vec<_>>()
                .join("\n"),
            Self::BestPick(entry) => format!("Best: {}: {}", entry.id, entry.rationale),
        }
    }
}

/// One judge's ranking; its id is the judge's position in the fan-out
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranking {
    pub id: usize,
    pub judgment: Judgment,
}

/// The meta-ranker's choice of the most trustworthy ranking
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetaDecision {
    pub ranking_index: usize,
    pub rationale: String,
}

pub struct RankingGenerator {
    generator: ArtifactGenerator,
}

impl RankingGenerator {
    pub fn new(generator: ArtifactGenerator) -> Self {
        Self { generator }
    }

    /// Ask `count` independent judges to rank the candidates described in `prompt`
    pub async fn rank<F>(
        &self,
        stage: Stage,
        prompt: &str,
        count: usize,
        parse: F,
    ) -> Result<Vec<Ranking>, StageError>
    where
        F: Fn(&str) -> Result<Judgment, StageError>,
    {
        let judgments = self
            .generator
            .generate_structured_many(prompt, count, parse)
            .await?;

        if judgments.is_empty() {
            return Err(StageError::EmptyCandidateSet { stage });
        }

        info!("Collected {} {} rankings", judgments.len(), stage);

        Ok(judgments
            .into_iter()
            .enumerate()
            .map(|(id, judgment)| Ranking { id, judgment })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::RetryPolicy;
    use crate::parse;
    use crate::testing::{gateway_with, ScriptedModel};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_rankings_are_numbered_by_judge() {
        let model = Arc::new(ScriptedModel::responding(&[
            r#"[{"sample_solution_id": 1, "rationale": "a"},
                {"sample_solution_id": 0, "rationale": "b"}]"#,
            r#"[{"sample_solution_id": 0, "rationale": "c"},
                {"sample_solution_id": 1, "rationale": "d"}]"#,
        ]));
        let (gateway, _) = gateway_with(model.clone(), RetryPolicy::immediate(5));
        let rankings = RankingGenerator::new(ArtifactGenerator::new(gateway))
            .rank(Stage::Solution, "rank these", 2, parse::solution_ranking)
            .await
            .unwrap();

        assert_eq!(rankings.len(), 2);
        assert_eq!(rankings[0].id, 0);
        assert_eq!(rankings[0].judgment.winner().unwrap().as_str(), "1");
        assert_eq!(rankings[1].id, 1);
        assert_eq!(rankings[1].judgment.winner().unwrap().as_str(), "0");

        // Judges never see each other's output
        for session in model.requests() {
            assert_eq!(session.len(), 2);
            assert_eq!(session[1].content, "rank these");
        }
    }

    #[tokio::test]
    async fn test_zero_judges_is_empty_set() {
        let model = Arc::new(ScriptedModel::responding(&[]));
        let (gateway, _) = gateway_with(model, RetryPolicy::immediate(5));
        let result = RankingGenerator::new(ArtifactGenerator::new(gateway))
            .rank(Stage::Solution, "rank", 0, parse::solution_ranking)
            .await;
        assert!(matches!(result, Err(StageError::EmptyCandidateSet { .. })));
    }

    #[test]
    fn test_render_ordered() {
        let judgment = Judgment::Ordered(vec![
            RankedEntry {
                id: CandidateId::from(2),
                rationale: "clean".to_string(),
            },
            RankedEntry {
                id: CandidateId::from(0),
                rationale: "buggy".to_string(),
            },
        ]);
        assert_eq!(judgment.render(), "1. 2: clean\n2. 0: buggy");
        assert_eq!(judgment.entries().len(), 2);
    }

    #[test]
    fn test_best_pick_winner() {
        let judgment = Judgment::BestPick(RankedEntry {
            id: CandidateId::from(4),
            rationale: "thorough".to_string(),
        });
        assert_eq!(judgment.winner(), Some(&CandidateId::from(4)));
        assert_eq!(judgment.render(), "Best: 4: thorough");
    }
}
