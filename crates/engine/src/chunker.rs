//! Text chunking module
//!
//! Splits extracted page text into overlapping windows for embedding.
//! Windows target a whitespace-token budget and prefer to break at
//! paragraph, then sentence, then whitespace boundaries; a hard character
//! cut is the last resort for text with no usable boundary (e.g. one
//! unbroken blob).
//!
//! Chunks are exact slices of the page text. For each page the produced
//! offset ranges tile the page: the first chunk starts at offset 0, every
//! following chunk starts at or before the previous chunk's end, and the
//! last chunk ends at the page's end. Dropping each chunk's overlap prefix
//! and concatenating therefore reconstructs the page losslessly, and the
//! whole pass is deterministic for identical input.

use ddq_common::config::ChunkingConfig;
use ddq_common::models::{short_hash, ExtractedPage};
use tracing::debug;

/// Hard cut multiplier: a chunk never exceeds this many bytes per budgeted
/// token, even when the text has no whitespace at all.
const HARD_CUT_BYTES_PER_TOKEN: usize = 8;

/// A chunk produced by the splitter, before storage identity is assigned
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    /// Position in document reading order, stable across re-runs
    pub chunk_index: u32,
    pub text: String,
    pub page_number: u32,
    /// Byte offset into the page text where this chunk starts
    pub char_offset_start: usize,
    /// Byte offset into the page text where this chunk ends (exclusive)
    pub char_offset_end: usize,
    pub token_count: u32,
    pub content_hash: String,
}

/// Boundary-aware overlapping splitter
pub struct Chunker {
    max_tokens: usize,
    overlap_tokens: usize,
}

impl Chunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        let max_tokens = config.max_tokens.max(1);
        // Overlap must leave room for forward progress
        let overlap_tokens = config.overlap_tokens.min(max_tokens / 2);
        Self {
            max_tokens,
            overlap_tokens,
        }
    }

    /// Split all pages, assigning `chunk_index` in document reading order.
    pub fn chunk_pages(&self, pages: &[ExtractedPage]) -> Vec<ChunkDraft> {
        let mut drafts = Vec::new();
        let mut next_index = 0u32;

        for page in pages {
            let windows = self.split_page(&page.text);
            for (start, end) in windows {
                let text = &page.text[start..end];
                drafts.push(ChunkDraft {
                    chunk_index: next_index,
                    text: text.to_string(),
                    page_number: page.page_number,
                    char_offset_start: start,
                    char_offset_end: end,
                    token_count: text.split_whitespace().count() as u32,
                    content_hash: short_hash(text),
                });
                next_index += 1;
            }
        }

        debug!(
            pages = pages.len(),
            chunks = drafts.len(),
            max_tokens = self.max_tokens,
            overlap_tokens = self.overlap_tokens,
            "Pages chunked"
        );

        drafts
    }

    /// Compute the window byte ranges for one page.
    fn split_page(&self, text: &str) -> Vec<(usize, usize)> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let spans = token_spans(text);
        let hard_limit = self.max_tokens * HARD_CUT_BYTES_PER_TOKEN;

        let mut windows: Vec<(usize, usize)> = Vec::new();
        let mut start = 0usize;
        // Index of the first token at or after `start`
        let mut first_token = 0usize;

        loop {
            let budget_end = (first_token + self.max_tokens).min(spans.len());
            let is_final = budget_end == spans.len();

            let mut end = if is_final {
                text.len()
            } else {
                self.find_break(text, &spans, first_token, budget_end)
            };

            // Hard character cut for boundary-free text
            if end - start > hard_limit {
                end = floor_char_boundary(text, start + hard_limit);
            }

            windows.push((start, end));

            if end >= text.len() {
                break;
            }

            // First token starting at or after the cut. The cut always falls
            // past the first token's end, so cut_token > first_token and the
            // loop advances.
            let cut_token = spans.partition_point(|span| span.0 < end);
            let overlap_token = cut_token
                .saturating_sub(self.overlap_tokens)
                .max(first_token + 1);

            if overlap_token >= cut_token {
                // No overlap available: the next window begins exactly at
                // the cut so the ranges still tile the page.
                start = end;
                first_token = cut_token;
            } else {
                start = spans[overlap_token].0;
                first_token = overlap_token;
            }
        }

        windows
    }

    /// Pick the best break position inside the window, by boundary priority:
    /// paragraph, then sentence, then whitespace after the last budgeted
    /// token.
    fn find_break(
        &self,
        text: &str,
        spans: &[(usize, usize)],
        first_token: usize,
        budget_end: usize,
    ) -> usize {
        // Never cut before the first token finishes
        let floor = spans[first_token].1;
        let ceiling = spans[budget_end - 1].1;
        let window = &text[floor..ceiling];

        if let Some(pos) = window.rfind("\n\n") {
            return floor + pos + 2;
        }

        const SENTENCE_ENDINGS: [&str; 6] = [". ", "! ", "? ", ".\n", "!\n", "?\n"];
        if let Some(pos) = SENTENCE_ENDINGS
            .iter()
            .filter_map(|ending| window.rfind(ending))
            .max()
        {
            return floor + pos + 2;
        }

        // Whitespace boundary: end of the last token within budget
        ceiling
    }
}

/// Byte spans of whitespace-delimited tokens
fn token_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push((s, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

/// Largest char boundary at or below `index`
fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut i = index;
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(max_tokens: usize, overlap_tokens: usize) -> Chunker {
        Chunker::new(&ChunkingConfig {
            max_tokens,
            overlap_tokens,
        })
    }

    fn page(text: &str) -> ExtractedPage {
        ExtractedPage {
            page_number: 1,
            text: text.to_string(),
        }
    }

    /// Reassemble a page from its chunks by dropping each overlap prefix.
    fn reconstruct(chunks: &[ChunkDraft]) -> String {
        let mut out = String::new();
        let mut covered = 0usize;
        for chunk in chunks {
            assert!(
                chunk.char_offset_start <= covered,
                "gap before chunk {}",
                chunk.chunk_index
            );
            let skip = covered - chunk.char_offset_start;
            out.push_str(&chunk.text[skip..]);
            covered = chunk.char_offset_end;
        }
        out
    }

    #[test]
    fn test_lossless_reconstruction() {
        let text = "First paragraph about revenue recognition.\n\n\
                    Second paragraph covers the audit history. It has two sentences.\n\n\
                    Third paragraph lists subsidiaries and their jurisdictions. \
                    More detail follows here. And a final remark closes the page.";
        let chunks = chunker(12, 4).chunk_pages(&[page(text)]);
        assert!(chunks.len() > 1);
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn test_lossless_on_whitespace_heavy_text() {
        let text = "  leading space\n\nand \t odd   spacing everywhere \n trailing  ";
        let chunks = chunker(4, 1).chunk_pages(&[page(text)]);
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let text = "Alpha beta gamma.\n\nDelta epsilon zeta eta theta iota kappa.";
        let chunks = chunker(6, 0).chunk_pages(&[page(text)]);
        // First cut lands right after the paragraph break
        assert!(chunks[0].text.ends_with("\n\n"));
    }

    #[test]
    fn test_falls_back_to_sentence_boundary() {
        let text = "Alpha beta gamma delta. Epsilon zeta eta theta iota kappa lambda mu.";
        let chunks = chunker(6, 0).chunk_pages(&[page(text)]);
        assert!(chunks[0].text.ends_with(". "));
    }

    #[test]
    fn test_hard_cut_without_any_boundary() {
        let blob: String = "x".repeat(10_000);
        let chunks = chunker(8, 2).chunk_pages(&[page(&blob)]);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.len() <= 8 * HARD_CUT_BYTES_PER_TOKEN);
        }
        assert_eq!(reconstruct(&chunks), blob);
    }

    #[test]
    fn test_stable_indices_across_reruns() {
        let text = "One two three. Four five six seven. Eight nine ten eleven twelve.";
        let splitter = chunker(5, 2);
        let first = splitter.chunk_pages(&[page(text)]);
        let second = splitter.chunk_pages(&[page(text)]);
        assert_eq!(first, second);
        for (i, chunk) in first.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as u32);
        }
    }

    #[test]
    fn test_overlap_carries_tokens_back() {
        let text = "a b c d e f g h i j k l m n o p";
        let chunks = chunker(6, 2).chunk_pages(&[page(text)]);
        assert!(chunks.len() >= 2);
        for pair in chunks.windows(2) {
            assert!(pair[1].char_offset_start < pair[0].char_offset_end);
        }
    }

    #[test]
    fn test_empty_and_blank_pages_are_skipped() {
        let pages = vec![page(""), page("   \n  "), page("real content here")];
        let chunks = chunker(8, 2).chunk_pages(&pages);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "real content here");
    }

    #[test]
    fn test_indices_continue_across_pages() {
        let pages = vec![
            ExtractedPage {
                page_number: 1,
                text: "Page one text body.".to_string(),
            },
            ExtractedPage {
                page_number: 2,
                text: "Page two text body.".to_string(),
            },
        ];
        let chunks = chunker(64, 8).chunk_pages(&pages);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page_number, 1);
        assert_eq!(chunks[1].page_number, 2);
        assert_eq!(chunks[1].chunk_index, 1);
        // Offsets are page-relative
        assert_eq!(chunks[1].char_offset_start, 0);
    }

    #[test]
    fn test_multibyte_text_cuts_on_char_boundaries() {
        let text = "résumé naïve café ".repeat(200);
        let chunks = chunker(8, 2).chunk_pages(&[page(&text)]);
        assert!(chunks.len() > 1);
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn test_token_counts_and_hashes() {
        let text = "Total revenue was fifty million dollars.";
        let chunks = chunker(64, 8).chunk_pages(&[page(text)]);
        assert_eq!(chunks[0].token_count, 6);
        assert_eq!(chunks[0].content_hash, short_hash(text));
    }
}
