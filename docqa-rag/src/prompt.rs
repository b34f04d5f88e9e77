//! Grounded prompt assembly.

use std::fmt::Write;

use crate::document::{MetadataValue, SearchResult, keys};
use crate::memory::ConversationTurn;

/// Instructions placed at the top of every prompt.
pub const SYSTEM_INSTRUCTIONS: &str = "You are a helpful assistant that answers questions about team documentation.\n\
Use the following pieces of context to answer the question at the end.\n\
If you don't know the answer based on the context, just say that you don't know, don't try to make up an answer.";

/// Assembles the prompt sent to the completion provider.
///
/// The layout is fixed: instructions, then prior turns verbatim, then the
/// numbered context blocks in the order given, then the question.
///
/// ```text
/// <instructions>
///
/// Conversation so far:
/// User: ...
/// Assistant: ...
///
/// Context:
/// [1] (guide.pdf, page 2) ...
///
/// Question: ...
///
/// Answer:
/// ```
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    instructions: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(SYSTEM_INSTRUCTIONS)
    }
}

impl PromptBuilder {
    /// Use custom instructions in place of [`SYSTEM_INSTRUCTIONS`].
    pub fn new(instructions: impl Into<String>) -> Self {
        Self { instructions: instructions.into() }
    }

    /// Build a prompt. The history section is omitted when `history` is empty.
    pub fn build<'a>(
        &self,
        history: impl IntoIterator<Item = &'a ConversationTurn>,
        context: &[SearchResult],
        question: &str,
    ) -> String {
        let mut prompt = String::new();
        prompt.push_str(self.instructions.trim_end());
        prompt.push_str("\n\n");

        let mut history = history.into_iter().peekable();
        if history.peek().is_some() {
            prompt.push_str("Conversation so far:\n");
            for turn in history {
                let _ = writeln!(prompt, "User: {}", turn.question);
                let _ = writeln!(prompt, "Assistant: {}", turn.answer);
            }
            prompt.push('\n');
        }

        prompt.push_str("Context:\n");
        for (i, result) in context.iter().enumerate() {
            let _ = writeln!(prompt, "[{}] ({}) {}", i + 1, label(result), result.chunk.content);
        }

        let _ = write!(prompt, "\nQuestion: {question}\n\nAnswer:");
        prompt
    }
}

fn label(result: &SearchResult) -> String {
    let metadata = &result.chunk.metadata;
    let name = metadata
        .get(keys::FILE_NAME)
        .and_then(MetadataValue::as_str)
        .unwrap_or(&result.chunk.document_id);
    match metadata.get(keys::PAGE).and_then(MetadataValue::as_i64) {
        Some(page) => format!("{name}, page {page}"),
        None => name.to_string(),
    }
}
