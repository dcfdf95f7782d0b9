//! Citation linking
//!
//! Maps inline `[n]` markers in generated text back to the retrieved chunks
//! and emits ordered citation records. A marker referencing a number outside
//! the retrieved set must never produce a citation to an arbitrary chunk; it
//! is dropped and counted instead.

use ddq_common::models::CitationRecord;
use regex_lite::Regex;
use tracing::warn;
use uuid::Uuid;

use crate::retriever::RetrievedChunk;

/// Result of a linking pass
#[derive(Debug)]
pub struct LinkedCitations {
    pub citations: Vec<CitationRecord>,
    /// Markers referencing numbers outside the retrieved set
    pub dropped_markers: usize,
}

/// Scans answers for citation markers
pub struct CitationLinker {
    marker: Regex,
    excerpt_max_chars: usize,
}

impl CitationLinker {
    pub fn new(excerpt_max_chars: usize) -> Self {
        Self {
            marker: Regex::new(r"\[(\d+)\]").expect("static citation pattern"),
            excerpt_max_chars,
        }
    }

    /// Link the markers in `answer_text` against the retrieval set.
    ///
    /// `citation_order` is the 1-based rank of each distinct valid marker's
    /// first occurrence, so the result is always a dense 1..N sequence.
    /// An answer with zero valid markers yields zero citations; that is a
    /// valid low-trust outcome, not an error.
    pub fn link(
        &self,
        answer_id: Uuid,
        answer_text: &str,
        retrieved: &[RetrievedChunk],
    ) -> LinkedCitations {
        let mut citations: Vec<CitationRecord> = Vec::new();
        let mut seen: Vec<usize> = Vec::new();
        let mut dropped = 0usize;

        for capture in self.marker.captures_iter(answer_text) {
            let Some(number) = capture.get(1).and_then(|m| m.as_str().parse::<usize>().ok())
            else {
                continue;
            };

            if number == 0 || number > retrieved.len() {
                // Hallucinated reference number
                dropped += 1;
                continue;
            }
            if seen.contains(&number) {
                continue;
            }
            seen.push(number);

            let source = &retrieved[number - 1];
            citations.push(CitationRecord {
                id: Uuid::new_v4(),
                answer_id,
                chunk_id: source.chunk.id,
                document_id: source.chunk.document_id,
                page_number: source.chunk.page_number,
                relevance_score: source.similarity,
                citation_order: seen.len() as u32,
                excerpt: self.excerpt(&source.chunk.text),
            });
        }

        if dropped > 0 {
            warn!(
                answer_id = %answer_id,
                dropped,
                retrieved = retrieved.len(),
                "Dropped citation markers referencing no retrieved chunk"
            );
        }

        LinkedCitations {
            citations,
            dropped_markers: dropped,
        }
    }

    fn excerpt(&self, text: &str) -> String {
        if text.chars().count() <= self.excerpt_max_chars {
            return text.to_string();
        }
        let mut excerpt: String = text.chars().take(self.excerpt_max_chars).collect();
        excerpt.push_str("...");
        excerpt
    }
}
