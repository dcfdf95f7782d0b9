//! Multi-metric confidence scoring
//!
//! Combines retrieval statistics with two secondary model judgements into a
//! weighted composite. Judge failures degrade to a neutral 0.5 and set a
//! flag instead of failing the whole answer.

use ddq_common::errors::Result;
use ddq_common::llm::ChatModel;
use tracing::warn;

use crate::retriever::RetrievedChunk;

/// Fixed composite weights
pub const WEIGHT_FAITHFULNESS: f64 = 0.35;
pub const WEIGHT_RETRIEVAL: f64 = 0.25;
pub const WEIGHT_RELEVANCY: f64 = 0.25;
pub const WEIGHT_COVERAGE: f64 = 0.15;

const FAITHFULNESS_SYSTEM: &str = "Score answer faithfulness from 0.0 to 1.0.\n\
    1.0 = Fully supported by context\n\
    0.5 = Partially supported\n\
    0.0 = Unsupported claims\n\
    Return only the numeric score.";

const RELEVANCY_SYSTEM: &str = "Score answer relevancy from 0.0 to 1.0.\n\
    1.0 = Directly answers question\n\
    0.5 = Partially relevant\n\
    0.0 = Not relevant\n\
    Return only the numeric score.";

/// All confidence sub-scores plus the weighted composite, each in `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceReport {
    pub overall: f64,
    pub retrieval: f64,
    pub coverage: f64,
    pub faithfulness: f64,
    pub relevancy: f64,
    /// True when a judge call failed and its score was substituted with 0.5
    pub degraded: bool,
}

/// Confidence scorer over retrieval results and judge models
pub struct ConfidenceScorer {
    relevance_threshold: f64,
}

impl ConfidenceScorer {
    pub fn new(relevance_threshold: f64) -> Self {
        Self {
            relevance_threshold,
        }
    }

    /// Score an answer. The two judge calls run concurrently; the retrieval
    /// and coverage sub-scores are plain arithmetic over the retrieval set.
    pub async fn score(
        &self,
        question: &str,
        answer: &str,
        retrieved: &[RetrievedChunk],
        judge: &dyn ChatModel,
    ) -> ConfidenceReport {
        let similarities: Vec<f64> = retrieved.iter().map(|r| r.similarity).collect();

        let retrieval = if similarities.is_empty() {
            0.0
        } else {
            similarities.iter().sum::<f64>() / similarities.len() as f64
        };

        let high_relevance = similarities
            .iter()
            .filter(|s| **s > self.relevance_threshold)
            .count();
        let coverage = high_relevance as f64 / similarities.len().max(1) as f64;

        let context: Vec<&str> = retrieved.iter().map(|r| r.chunk.text.as_str()).collect();
        let (faithfulness, relevancy) = futures::join!(
            self.check_faithfulness(answer, &context, judge),
            self.check_relevancy(answer, question, judge),
        );

        let degraded = faithfulness.is_none() || relevancy.is_none();
        let faithfulness = faithfulness.unwrap_or(0.5);
        let relevancy = relevancy.unwrap_or(0.5);

        let composite = WEIGHT_RETRIEVAL * retrieval
            + WEIGHT_COVERAGE * coverage
            + WEIGHT_FAITHFULNESS * faithfulness
            + WEIGHT_RELEVANCY * relevancy;

        ConfidenceReport {
            overall: round3(composite.clamp(0.0, 1.0)),
            retrieval: round3(retrieval.clamp(0.0, 1.0)),
            coverage: round3(coverage),
            faithfulness: round3(faithfulness),
            relevancy: round3(relevancy),
            degraded,
        }
    }

    /// LLM-verified grounding of the answer in the retrieved context only.
    /// Returns None on provider failure or an unparseable verdict.
    async fn check_faithfulness(
        &self,
        answer: &str,
        contexts: &[&str],
        judge: &dyn ChatModel,
    ) -> Option<f64> {
        let context_text = contexts.join("\n---\n");
        let user = format!("Context:\n{}\n\nAnswer:\n{}", context_text, answer);
        match self.judge_score(judge, FAITHFULNESS_SYSTEM, &user).await {
            Ok(score) => Some(score),
            Err(e) => {
                warn!(error = %e, "Faithfulness check failed, substituting neutral score");
                None
            }
        }
    }

    /// Whether the answer addresses the question that was asked.
    async fn check_relevancy(
        &self,
        answer: &str,
        question: &str,
        judge: &dyn ChatModel,
    ) -> Option<f64> {
        let user = format!("Question:\n{}\n\nAnswer:\n{}", question, answer);
        match self.judge_score(judge, RELEVANCY_SYSTEM, &user).await {
            Ok(score) => Some(score),
            Err(e) => {
                warn!(error = %e, "Relevancy check failed, substituting neutral score");
                None
            }
        }
    }

    async fn judge_score(&self, judge: &dyn ChatModel, system: &str, user: &str) -> Result<f64> {
        let verdict = judge.complete(system, user).await?;
        let score = verdict
            .trim()
            .parse::<f64>()
            .map_err(|_| ddq_common::errors::EngineError::Provider {
                message: format!("judge returned a non-numeric verdict: {:?}", verdict),
            })?;
        Ok(score.clamp(0.0, 1.0))
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddq_common::llm::MockChatModel;
    use ddq_common::models::ChunkRecord;
    use uuid::Uuid;

    fn retrieved(similarities: &[f64]) -> Vec<RetrievedChunk> {
        similarities
            .iter()
            .enumerate()
            .map(|(i, similarity)| RetrievedChunk {
                chunk: ChunkRecord {
                    id: Uuid::new_v4(),
                    document_id: Uuid::new_v4(),
                    chunk_index: i as u32,
                    text: format!("context {}", i),
                    page_number: Some(1),
                    char_offset_start: 0,
                    char_offset_end: 9,
                    token_count: 2,
                    content_hash: "hash".to_string(),
                    vector_id: String::new(),
                    extra: serde_json::Value::Null,
                },
                similarity: *similarity,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_retrieval_and_coverage_arithmetic() {
        let scorer = ConfidenceScorer::new(0.7);
        let judge = MockChatModel::always("0.8");
        let report = scorer
            .score("q", "a", &retrieved(&[0.9, 0.8, 0.5]), &judge)
            .await;

        assert!((report.retrieval - round3((0.9 + 0.8 + 0.5) / 3.0)).abs() < 1e-9);
        assert!((report.coverage - round3(2.0 / 3.0)).abs() < 1e-9);
        assert!(!report.degraded);
    }

    #[tokio::test]
    async fn test_zero_retrieval_scores_zero_not_error() {
        let scorer = ConfidenceScorer::new(0.7);
        let judge = MockChatModel::always("0.8");
        let report = scorer.score("q", "a", &[], &judge).await;
        assert_eq!(report.retrieval, 0.0);
        assert_eq!(report.coverage, 0.0);
    }

    #[tokio::test]
    async fn test_judge_failure_degrades_to_neutral() {
        let scorer = ConfidenceScorer::new(0.7);
        let judge = MockChatModel::failing("rate limited");
        let report = scorer.score("q", "a", &retrieved(&[0.9]), &judge).await;

        assert!(report.degraded);
        assert_eq!(report.faithfulness, 0.5);
        assert_eq!(report.relevancy, 0.5);
        // The composite still lands in range
        assert!(report.overall >= 0.0 && report.overall <= 1.0);
    }

    #[tokio::test]
    async fn test_non_numeric_verdict_degrades() {
        let scorer = ConfidenceScorer::new(0.7);
        let judge = MockChatModel::always("fully supported");
        let report = scorer.score("q", "a", &retrieved(&[0.9]), &judge).await;
        assert!(report.degraded);
        assert_eq!(report.faithfulness, 0.5);
    }

    #[tokio::test]
    async fn test_out_of_range_verdict_is_clamped() {
        let scorer = ConfidenceScorer::new(0.7);
        let judge = MockChatModel::always("7.5");
        let report = scorer.score("q", "a", &retrieved(&[0.9]), &judge).await;
        assert_eq!(report.faithfulness, 1.0);
        assert!(report.overall <= 1.0);
    }

    #[tokio::test]
    async fn test_composite_bounded_for_all_subscore_combinations() {
        let scorer = ConfidenceScorer::new(0.7);
        let grid = [0.0, 0.25, 0.5, 0.75, 1.0];

        // Weights sum to 1.0
        assert!(
            (WEIGHT_FAITHFULNESS + WEIGHT_RETRIEVAL + WEIGHT_RELEVANCY + WEIGHT_COVERAGE - 1.0)
                .abs()
                < 1e-12
        );

        for &sim in &grid {
            for &verdict in &grid {
                let judge = MockChatModel::always(format!("{}", verdict));
                let report = scorer
                    .score("q", "a", &retrieved(&[sim, sim]), &judge)
                    .await;
                assert!(
                    report.overall >= 0.0 && report.overall <= 1.0,
                    "composite {} out of range for sim={} verdict={}",
                    report.overall,
                    sim,
                    verdict
                );
            }
        }
    }

    #[tokio::test]
    async fn test_weighted_composite_value() {
        let scorer = ConfidenceScorer::new(0.7);
        let judge = MockChatModel::always("1.0");
        let report = scorer.score("q", "a", &retrieved(&[1.0]), &judge).await;
        // 0.25*1 + 0.15*1 + 0.35*1 + 0.25*1 = 1.0
        assert_eq!(report.overall, 1.0);
    }
}
