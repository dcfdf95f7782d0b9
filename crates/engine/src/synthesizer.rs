//! Grounded answer synthesis
//!
//! Builds the due-diligence prompt from retrieved chunks and asks the chat
//! model for an answer carrying inline `[n]` citation markers. The model is
//! told to answer strictly from the provided context and to say so when the
//! context is insufficient instead of inventing an answer.

use ddq_common::errors::Result;
use ddq_common::llm::ChatModel;
use tracing::debug;

use crate::retriever::RetrievedChunk;

const SYSTEM_PROMPT: &str = "You are a due diligence analyst.";

/// Prompt builder and generation entry point
pub struct Synthesizer;

impl Synthesizer {
    /// Generate a grounded answer for the question over the retrieved
    /// context. Returns the raw answer text; citation linking happens
    /// downstream.
    pub async fn synthesize(
        question: &str,
        contexts: &[RetrievedChunk],
        model: &dyn ChatModel,
    ) -> Result<String> {
        let prompt = Self::build_prompt(question, contexts);

        debug!(
            context_count = contexts.len(),
            model = model.model_name(),
            "Requesting grounded answer"
        );

        model.complete(SYSTEM_PROMPT, &prompt).await
    }

    /// Build the grounded prompt with numbered reference tags.
    pub fn build_prompt(question: &str, contexts: &[RetrievedChunk]) -> String {
        let mut context_text = String::new();
        for (i, ctx) in contexts.iter().enumerate() {
            let page_info = match ctx.chunk.page_number {
                Some(page) => format!("Page {}", page),
                None => "Page N/A".to_string(),
            };
            context_text.push_str(&format!(
                "\n[{}] ({})\n{}\n",
                i + 1,
                page_info,
                ctx.chunk.text
            ));
        }

        format!(
            "You are answering a due diligence questionnaire based on company documents.\n\n\
             Question: {question}\n\n\
             Available Context from Documents:\n\
             {context_text}\n\
             Instructions:\n\
             1. Answer the question based ONLY on the provided context\n\
             2. If the answer cannot be found in the context, say \"Information not found in provided documents\"\n\
             3. Include citation numbers [1], [2], etc. in your answer where you reference information\n\
             4. Be concise and factual\n\
             5. Do not make assumptions beyond what's stated in the documents\n\n\
             Answer:"
        )
    }
}
