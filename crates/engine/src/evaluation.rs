//! Ground-truth evaluation
//!
//! Compares an answer against a human-authored reference with BLEU,
//! ROUGE-1/2/L and embedding cosine similarity. The text metrics are pure
//! functions of the two strings and deterministic across calls; the
//! semantic metric reuses the embedding provider and degrades to `None` on
//! failure rather than fabricating a zero.

use ddq_common::embeddings::Embedder;
use ddq_common::index::cosine_similarity;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Overall-score weights
const WEIGHT_SEMANTIC: f64 = 0.50;
const WEIGHT_ROUGE_L: f64 = 0.25;
const WEIGHT_BLEU: f64 = 0.25;

/// Epsilon substituted for zero n-gram precisions (smoothing)
const BLEU_SMOOTHING_EPS: f64 = 0.1;

/// Highest n-gram order considered by BLEU
const BLEU_MAX_ORDER: usize = 4;

/// Evaluation metrics; `None` marks a metric that could not be computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub has_ground_truth: bool,
    pub bleu: Option<f64>,
    pub rouge_1_f1: Option<f64>,
    pub rouge_2_f1: Option<f64>,
    pub rouge_l_f1: Option<f64>,
    pub semantic_similarity: Option<f64>,
    pub overall: Option<f64>,
}

impl EvaluationReport {
    /// All-null report for questions without a reference answer.
    /// No provider call is ever made on this path.
    pub fn without_ground_truth() -> Self {
        Self {
            has_ground_truth: false,
            bleu: None,
            rouge_1_f1: None,
            rouge_2_f1: None,
            rouge_l_f1: None,
            semantic_similarity: None,
            overall: None,
        }
    }
}

/// Evaluation entry point
pub struct EvaluationEngine;

impl EvaluationEngine {
    /// Evaluate an answer against its reference.
    pub async fn evaluate(
        answer_text: &str,
        ground_truth: &str,
        embedder: &dyn Embedder,
    ) -> EvaluationReport {
        let candidate = normalize(answer_text);
        let reference = normalize(ground_truth);

        let candidate_tokens = tokenize(&candidate);
        let reference_tokens = tokenize(&reference);

        let bleu = bleu_score(&candidate_tokens, &reference_tokens);
        let rouge_1 = rouge_n(&candidate_tokens, &reference_tokens, 1);
        let rouge_2 = rouge_n(&candidate_tokens, &reference_tokens, 2);
        let rouge_l = rouge_l_f1(&candidate_tokens, &reference_tokens);

        let semantic = semantic_similarity(&candidate, &reference, embedder).await;

        let overall = overall_score(bleu, rouge_l, semantic);

        EvaluationReport {
            has_ground_truth: true,
            bleu: Some(round4(bleu)),
            rouge_1_f1: Some(round4(rouge_1)),
            rouge_2_f1: Some(round4(rouge_2)),
            rouge_l_f1: Some(round4(rouge_l)),
            semantic_similarity: semantic.map(round4),
            overall: overall.map(round4),
        }
    }
}

/// Lowercase, strip citation markers, collapse whitespace
fn normalize(text: &str) -> String {
    let markers = Regex::new(r"\[\d+\]").expect("static marker pattern");
    let without_markers = markers.replace_all(text, " ");
    without_markers
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whitespace tokens with edge punctuation trimmed
fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn ngram_counts(tokens: &[String], n: usize) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    if tokens.len() >= n {
        for window in tokens.windows(n) {
            *counts.entry(window.join("\u{1}")).or_insert(0) += 1;
        }
    }
    counts
}

/// Modified n-gram precision with epsilon smoothing and a brevity penalty.
///
/// Orders the candidate cannot form are skipped and the remaining orders
/// share uniform weights, so short answers still score above zero.
fn bleu_score(candidate: &[String], reference: &[String]) -> f64 {
    if candidate.is_empty() || reference.is_empty() {
        return 0.0;
    }

    let mut log_sum = 0.0;
    let mut orders = 0usize;

    for n in 1..=BLEU_MAX_ORDER {
        let candidate_counts = ngram_counts(candidate, n);
        let total: usize = candidate_counts.values().sum();
        if total == 0 {
            continue;
        }
        let reference_counts = ngram_counts(reference, n);

        let clipped: usize = candidate_counts
            .iter()
            .map(|(gram, count)| (*count).min(reference_counts.get(gram).copied().unwrap_or(0)))
            .sum();

        let precision = if clipped == 0 {
            BLEU_SMOOTHING_EPS / total as f64
        } else {
            clipped as f64 / total as f64
        };

        log_sum += precision.ln();
        orders += 1;
    }

    if orders == 0 {
        return 0.0;
    }

    let geometric_mean = (log_sum / orders as f64).exp();

    let c = candidate.len() as f64;
    let r = reference.len() as f64;
    let brevity_penalty = if c > r { 1.0 } else { (1.0 - r / c).exp() };

    (geometric_mean * brevity_penalty).clamp(0.0, 1.0)
}

/// N-gram overlap F1 (recall-oriented ROUGE-N)
fn rouge_n(candidate: &[String], reference: &[String], n: usize) -> f64 {
    let candidate_counts = ngram_counts(candidate, n);
    let reference_counts = ngram_counts(reference, n);

    let candidate_total: usize = candidate_counts.values().sum();
    let reference_total: usize = reference_counts.values().sum();
    if candidate_total == 0 || reference_total == 0 {
        return 0.0;
    }

    let overlap: usize = candidate_counts
        .iter()
        .map(|(gram, count)| (*count).min(reference_counts.get(gram).copied().unwrap_or(0)))
        .sum();

    f1(
        overlap as f64 / candidate_total as f64,
        overlap as f64 / reference_total as f64,
    )
}

/// Longest-common-subsequence F1 (ROUGE-L)
fn rouge_l_f1(candidate: &[String], reference: &[String]) -> f64 {
    if candidate.is_empty() || reference.is_empty() {
        return 0.0;
    }
    let lcs = lcs_length(candidate, reference) as f64;
    f1(lcs / candidate.len() as f64, lcs / reference.len() as f64)
}

fn lcs_length(a: &[String], b: &[String]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];
    for item_a in a {
        for (j, item_b) in b.iter().enumerate() {
            current[j + 1] = if item_a == item_b {
                prev[j] + 1
            } else {
                prev[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// Cosine similarity of the two embeddings; `None` on provider failure
async fn semantic_similarity(
    candidate: &str,
    reference: &str,
    embedder: &dyn Embedder,
) -> Option<f64> {
    if candidate.is_empty() || reference.is_empty() {
        return None;
    }
    let texts = vec![candidate.to_string(), reference.to_string()];
    match embedder.embed_batch(&texts).await {
        Ok(embeddings) if embeddings.len() == 2 => {
            Some(cosine_similarity(&embeddings[0], &embeddings[1]).clamp(-1.0, 1.0))
        }
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, "Semantic similarity unavailable");
            None
        }
    }
}

/// Weighted average over the metrics that are present, weights renormalized
fn overall_score(bleu: f64, rouge_l: f64, semantic: Option<f64>) -> Option<f64> {
    let mut weighted = WEIGHT_BLEU * bleu + WEIGHT_ROUGE_L * rouge_l;
    let mut weight_total = WEIGHT_BLEU + WEIGHT_ROUGE_L;

    if let Some(similarity) = semantic {
        weighted += WEIGHT_SEMANTIC * similarity.max(0.0);
        weight_total += WEIGHT_SEMANTIC;
    }

    if weight_total == 0.0 {
        None
    } else {
        Some(weighted / weight_total)
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ddq_common::embeddings::MockEmbedder;
    use ddq_common::errors::{EngineError, Result};

    /// Embedder that fails every call
    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(EngineError::Provider {
                message: "unreachable".to_string(),
            })
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(EngineError::Provider {
                message: "unreachable".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "down"
        }

        fn dimension(&self) -> usize {
            0
        }
    }

    #[test]
    fn test_normalize_strips_markers_and_case() {
        assert_eq!(
            normalize("Revenue   is $50M [1]. See [12]."),
            "revenue is $50m . see ."
        );
    }

    #[test]
    fn test_tokenize_trims_edge_punctuation() {
        assert_eq!(
            tokenize("revenue is $50m . see"),
            vec!["revenue", "is", "50m", "see"]
        );
    }

    #[test]
    fn test_identical_texts_score_one() {
        let tokens = tokenize("the total revenue grew to fifty million dollars");
        assert!((bleu_score(&tokens, &tokens) - 1.0).abs() < 1e-9);
        assert!((rouge_n(&tokens, &tokens, 1) - 1.0).abs() < 1e-9);
        assert!((rouge_n(&tokens, &tokens, 2) - 1.0).abs() < 1e-9);
        assert!((rouge_l_f1(&tokens, &tokens) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_disjoint_texts_score_near_zero() {
        let a = tokenize("alpha beta gamma delta epsilon");
        let b = tokenize("one two three four five");
        assert!(bleu_score(&a, &b) < 0.15); // smoothing keeps it above zero
        assert_eq!(rouge_n(&a, &b, 1), 0.0);
        assert_eq!(rouge_l_f1(&a, &b), 0.0);
    }

    #[test]
    fn test_bleu_smoothing_avoids_zero_on_short_texts() {
        let candidate = tokenize("revenue is 50m");
        let reference = tokenize("50m");
        let score = bleu_score(&candidate, &reference);
        assert!(score > 0.0 && score < 1.0);
    }

    #[test]
    fn test_brevity_penalty_punishes_short_candidates() {
        let reference = tokenize("the quick brown fox jumps over the lazy dog");
        let short = tokenize("the quick");
        let long = tokenize("the quick brown fox jumps over the lazy dog today");
        assert!(bleu_score(&short, &reference) < bleu_score(&long, &reference));
    }

    #[test]
    fn test_rouge_l_orders_matter() {
        let reference = tokenize("alpha beta gamma");
        let in_order = tokenize("alpha gamma");
        let lcs = lcs_length(&in_order, &reference);
        assert_eq!(lcs, 2);
        let reversed = tokenize("gamma alpha");
        assert_eq!(lcs_length(&reversed, &reference), 1);
    }

    #[tokio::test]
    async fn test_report_is_deterministic() {
        let embedder = MockEmbedder::new(64);
        let first = EvaluationEngine::evaluate(
            "Revenue is $50M [1].",
            "Revenue was $50M",
            &embedder,
        )
        .await;
        let second = EvaluationEngine::evaluate(
            "Revenue is $50M [1].",
            "Revenue was $50M",
            &embedder,
        )
        .await;
        assert_eq!(first, second);
        assert!(first.has_ground_truth);
        assert!(first.bleu.unwrap() > 0.0);
        assert!(first.rouge_1_f1.unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_embedder_failure_yields_null_semantic_not_zero() {
        let report =
            EvaluationEngine::evaluate("Revenue is $50M [1].", "$50M", &DownEmbedder).await;

        assert!(report.semantic_similarity.is_none());
        // Text metrics are still present and the overall renormalizes
        assert!(report.bleu.is_some());
        assert!(report.overall.is_some());
        let expected =
            (WEIGHT_BLEU * report.bleu.unwrap() + WEIGHT_ROUGE_L * report.rouge_l_f1.unwrap())
                / (WEIGHT_BLEU + WEIGHT_ROUGE_L);
        assert!((report.overall.unwrap() - round4(expected)).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_without_ground_truth_is_all_null() {
        let report = EvaluationReport::without_ground_truth();
        assert!(!report.has_ground_truth);
        assert!(report.bleu.is_none());
        assert!(report.rouge_l_f1.is_none());
        assert!(report.semantic_similarity.is_none());
        assert!(report.overall.is_none());
    }
}
