//! Prompt assembly: system directive, retrieved context, conversation
//! window.

use crate::types::{ChatMessage, ChatRequest};

/// Messages from the tail of the conversation included in the prompt.
const CONVERSATION_WINDOW: usize = 20;

/// Build the full prompt for one request.
///
/// Sections are joined with blank lines; empty sections are dropped so a
/// context-free request still yields a clean prompt.
pub fn build_prompt(request: &ChatRequest, context: &[String]) -> String {
    let mut sections = vec![system_directive(request.lang_hint.as_deref())];
    let context = context_block(context);
    if !context.is_empty() {
        sections.push(context);
    }
    let conversation = conversation_block(&request.messages);
    if !conversation.is_empty() {
        sections.push(conversation);
    }
    sections.join("\n\n")
}

/// Rough token estimate used for usage accounting, about four
/// characters per token.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.len() / 4) as u32
}

fn system_directive(lang_hint: Option<&str>) -> String {
    let language_rule = match lang_hint {
        Some(hint) if !hint.trim().is_empty() => format!(
            "- Answer language: follow the user's preference '{}' unless the conversation clearly asks for another language.",
            hint.trim()
        ),
        _ => "- Answer language: match the language of the user's last message.".to_string(),
    };
    format!(
        "You are a knowledgeable course assistant. Your goal is to help the \
user understand the material and to provide clear, correct, runnable examples.\n\n\
Follow these rules:\n\
- Accuracy first: state complexity bounds and edge cases where they matter.\n\
- Example code: complete enough to run or call directly, in fenced code blocks \
with a language tag so the client can render them.\n\
- Structure: give the conclusion first, then the steps, then a short example if useful.\n\
- Honesty: never invent libraries or APIs; if unsure, say so or ask a short clarifying question.\n\
{language_rule}"
    )
}

/// Advisory header plus numbered snippets. Empty when nothing was
/// retrieved.
fn context_block(context: &[String]) -> String {
    if context.is_empty() {
        return String::new();
    }
    let mut block = String::from(
        "[Retrieved reference material — advisory only; weigh it against the conversation]\n",
    );
    for (i, snippet) in context.iter().enumerate() {
        block.push_str(&format!("# Snippet {}\n{}\n\n", i + 1, snippet));
    }
    block.trim_end().to_string()
}

/// The last [`CONVERSATION_WINDOW`] messages as role-prefixed lines,
/// closed with the answer instruction.
fn conversation_block(messages: &[ChatMessage]) -> String {
    if messages.is_empty() {
        return String::new();
    }
    let from = messages.len().saturating_sub(CONVERSATION_WINDOW);
    let mut block = String::from("Conversation so far (oldest first):\n");
    for message in &messages[from..] {
        block.push_str(&format!("- {}: {}\n", message.role.as_str(), message.content));
    }
    block.push_str("\nAnswer the last user message in the context above.");
    block
}
