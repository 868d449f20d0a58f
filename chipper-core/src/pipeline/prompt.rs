//! Prompt rendering for the generator node.

use crate::provider::Message;
use crate::rag::Document;

/// Bumped whenever the rendered layout changes, so logged prompts can be
/// compared across releases.
pub const PROMPT_TEMPLATE_VERSION: &str = "1";

const UNKNOWN_SOURCE: &str = "unknown";

/// Renders the single system message handed to the generator.
///
/// Layout, in order:
///
/// ```text
/// System prompt:
/// <system prompt>
///
/// Previous conversation:        (only when there is history)
/// <role>: <content>
///
/// Context:
/// <document content>
/// Source: <file_path>
///
/// Question: <question>
/// ```
///
/// Documents appear in retrieval order and history in chronological order.
/// Nothing is truncated.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(
        &self,
        system_prompt: &str,
        conversation: &[Message],
        documents: &[Document],
        question: &str,
    ) -> Message {
        Message::system(self.render(system_prompt, conversation, documents, question))
    }

    pub fn render(
        &self,
        system_prompt: &str,
        conversation: &[Message],
        documents: &[Document],
        question: &str,
    ) -> String {
        let mut prompt = format!("System prompt:\n{}\n\n", system_prompt);

        if !conversation.is_empty() {
            prompt.push_str("Previous conversation:\n");
            for message in conversation {
                prompt.push_str(&format!("{}: {}\n", message.role, message.content));
            }
            prompt.push('\n');
        }

        prompt.push_str("Context:\n");
        for document in documents {
            prompt.push_str(&format!(
                "{}\nSource: {}\n\n",
                document.content,
                document.file_path().unwrap_or(UNKNOWN_SOURCE)
            ));
        }
        if documents.is_empty() {
            prompt.push('\n');
        }

        prompt.push_str(&format!("Question: {}", question));
        prompt
    }
}
