//! Context assembly and prompt construction.
//!
//! The prompt is the "stuff" question-answering template: every retrieved
//! chunk is placed, most relevant first, between a fixed instruction and
//! the question.
//!
//! Budget policy, counted in characters:
//! 1. The template and the question are charged first. If they alone exceed
//!    the budget the question is rejected.
//! 2. Chunks are added whole in rank order. The first chunk that does not
//!    fit is dropped together with every lower-ranked chunk.
//! 3. The one exception: if the top-ranked chunk alone does not fit, it is
//!    cut at a character boundary so the prompt still carries the best
//!    match. This is reported through [`AssembledContext::truncated`].

use tracing::warn;

use crate::document::SearchResult;
use crate::error::{RagError, Result};

const INSTRUCTION: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\n";
const QUESTION_PREFIX: &str = "\n\nQuestion: ";
const ANSWER_PREFIX: &str = "\nHelpful Answer:";
const CHUNK_SEPARATOR: &str = "\n\n";

/// Characters the template contributes regardless of question and context.
pub(crate) fn template_overhead() -> usize {
    INSTRUCTION.chars().count() + QUESTION_PREFIX.chars().count() + ANSWER_PREFIX.chars().count()
}

/// Characters left for context once the template and `question` are placed.
///
/// # Errors
///
/// Returns [`RagError::InvalidArgument`] when the question alone does not fit.
pub(crate) fn context_budget(question: &str, max_prompt_chars: usize) -> Result<usize> {
    let fixed = template_overhead() + question.chars().count();
    max_prompt_chars.checked_sub(fixed).ok_or_else(|| {
        RagError::InvalidArgument(format!(
            "question needs {fixed} of {max_prompt_chars} prompt characters"
        ))
    })
}

/// The context block produced by [`assemble_context`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledContext {
    /// Chunk texts joined by blank lines, most relevant first.
    pub text: String,
    /// Number of chunks included (wholly or, for the first, truncated).
    pub included: usize,
    /// Number of lower-ranked chunks left out for lack of room.
    pub dropped: usize,
    /// Whether the top-ranked chunk was cut short.
    pub truncated: bool,
}

/// Concatenate retrieved chunks so that the final prompt for `question`
/// stays within `max_prompt_chars`.
///
/// # Errors
///
/// Returns [`RagError::InvalidArgument`] if the template and question alone
/// exceed the budget.
pub fn assemble_context(
    results: &[SearchResult],
    question: &str,
    max_prompt_chars: usize,
) -> Result<AssembledContext> {
    let mut remaining = context_budget(question, max_prompt_chars)?;

    let mut text = String::new();
    let mut included = 0;
    let mut truncated = false;

    for result in results {
        let separator = if included == 0 { 0 } else { CHUNK_SEPARATOR.chars().count() };
        let chunk_chars = result.chunk.text.chars().count();

        if separator + chunk_chars <= remaining {
            if included > 0 {
                text.push_str(CHUNK_SEPARATOR);
            }
            text.push_str(&result.chunk.text);
            remaining -= separator + chunk_chars;
            included += 1;
            continue;
        }

        if included == 0 && remaining > 0 {
            text.extend(result.chunk.text.chars().take(remaining));
            included = 1;
            truncated = true;
            warn!(
                chunk = result.chunk.id,
                chunk_chars,
                kept_chars = remaining,
                "top-ranked chunk truncated to fit prompt budget"
            );
        }
        break;
    }

    Ok(AssembledContext { text, included, dropped: results.len() - included, truncated })
}

/// Render the full prompt for `question` around an assembled context block.
pub fn build_prompt(question: &str, context: &str) -> String {
    let mut prompt = String::with_capacity(
        INSTRUCTION.len() + context.len() + QUESTION_PREFIX.len() + question.len() + ANSWER_PREFIX.len(),
    );
    prompt.push_str(INSTRUCTION);
    prompt.push_str(context);
    prompt.push_str(QUESTION_PREFIX);
    prompt.push_str(question);
    prompt.push_str(ANSWER_PREFIX);
    prompt
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::document::{Chunk, ChunkMetadata};

    fn result(id: u64, text: &str, score: f32) -> SearchResult {
        SearchResult {
            chunk: Arc::new(Chunk { id, text: text.to_string(), metadata: ChunkMetadata::default() }),
            score,
        }
    }

    #[test]
    fn prompt_places_context_before_question() {
        let prompt = build_prompt("What is theft?", "Article 1 defines theft.");
        assert!(prompt.starts_with("Use the following pieces of context"));
        let context_at = prompt.find("Article 1 defines theft.").unwrap();
        let question_at = prompt.find("Question: What is theft?").unwrap();
        assert!(context_at < question_at);
        assert!(prompt.ends_with("Helpful Answer:"));
        assert_eq!(prompt.chars().count(), template_overhead() + 14 + 24);
    }

    #[test]
    fn keeps_all_chunks_in_rank_order_when_they_fit() {
        let results = vec![result(0, "first", 0.9), result(1, "second", 0.8)];
        let ctx = assemble_context(&results, "q", 10_000).unwrap();
        assert_eq!(ctx.text, "first\n\nsecond");
        assert_eq!((ctx.included, ctx.dropped, ctx.truncated), (2, 0, false));
    }

    #[test]
    fn drops_lowest_ranked_chunks_first() {
        let results = vec![result(0, "aaaaa", 0.9), result(1, "bbbbb", 0.8), result(2, "c", 0.7)];
        // Room for the first chunk plus a separator and one more char: not enough for "bbbbb".
        let budget = template_overhead() + 1 + 5 + 3;
        let ctx = assemble_context(&results, "q", budget).unwrap();
        assert_eq!(ctx.text, "aaaaa");
        assert_eq!((ctx.included, ctx.dropped, ctx.truncated), (1, 2, false));
    }

    #[test]
    fn truncates_only_an_oversized_top_chunk() {
        let results = vec![result(0, "مادة طويلة جدا", 0.9), result(1, "short", 0.5)];
        let budget = template_overhead() + 1 + 4;
        let ctx = assemble_context(&results, "q", budget).unwrap();
        assert_eq!(ctx.text, "مادة");
        assert_eq!((ctx.included, ctx.dropped, ctx.truncated), (1, 1, true));
    }

    #[test]
    fn rejects_question_larger_than_budget() {
        let question = "x".repeat(50);
        let err = assemble_context(&[], &question, template_overhead() + 10).unwrap_err();
        assert!(matches!(err, RagError::InvalidArgument(_)));
    }

    #[test]
    fn empty_results_give_empty_context() {
        let ctx = assemble_context(&[], "q", 1_000).unwrap();
        assert_eq!(ctx, AssembledContext { text: String::new(), included: 0, dropped: 0, truncated: false });
    }
}
