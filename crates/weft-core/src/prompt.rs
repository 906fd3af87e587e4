//! Builds the message sequence sent to the model.

use weft_llm::Message;
use weft_memory::ConversationTurn;

pub const CONTEXT_PREAMBLE: &str = "Use the following retrieved context to answer the user's question. \
                                    If the context is not relevant, answer from general knowledge.";

/// Compose the prompt: system instruction, prior turns, retrieved context, then the user turn.
///
/// Empty `system_message` and empty `context` are left out.
#[must_use]
pub fn compose(
    system_message: Option<&str>,
    history: &[ConversationTurn],
    context: &str,
    user_message: &str,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 3);
    if let Some(system) = system_message.filter(|s| !s.trim().is_empty()) {
        messages.push(Message::system(system));
    }
    messages.extend(history.iter().map(ConversationTurn::to_message));
    if !context.trim().is_empty() {
        messages.push(Message::system(format!("{CONTEXT_PREAMBLE}\n\n{context}")));
    }
    messages.push(Message::user(user_message));
    messages
}

#[cfg(test)]
mod tests {
    use weft_llm::Role;

    use super::*;

    #[test]
    fn bare_message_without_system_or_context() {
        let messages = compose(None, &[], "", "2+2?");
        assert_eq!(messages, vec![Message::user("2+2?")]);
    }

    #[test]
    fn context_sits_right_before_the_user_turn() {
        let history = [
            ConversationTurn::user("hi"),
            ConversationTurn::assistant("hello"),
        ];
        let messages = compose(
            Some("Be brief."),
            &history,
            "=== From Company (weight: 1.0) ===\nFounded in 1999.",
            "When were we founded?",
        );
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                Role::System,
                Role::User,
                Role::Assistant,
                Role::System,
                Role::User
            ]
        );
        assert!(messages[3].content.starts_with(CONTEXT_PREAMBLE));
        assert!(messages[3].content.ends_with("Founded in 1999."));
        assert_eq!(messages[4].content, "When were we founded?");
    }

    #[test]
    fn blank_system_message_is_skipped() {
        let messages = compose(Some("  "), &[], "", "q");
        assert_eq!(messages.len(), 1);
    }
}
