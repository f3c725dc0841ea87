//! AI guidance context for the investigation assistant.
//!
//! The latest confidence decision is folded into the first system message
//! so the assistant sees the recommended action, without ever breaking the
//! tool_use/tool_result adjacency of the conversation.

use tracing::warn;

use inquest_contracts::{InvestigationState, Message, MessageKind};

/// Renders the guidance block from the latest AI decision. Empty when no
/// decision exists yet.
pub fn guidance_context(state: &InvestigationState) -> String {
    let Some(decision) = state.ai_decisions.last() else {
        return String::new();
    };

    format!(
        "\n\nINVESTIGATION GUIDANCE:\n\
         - Recommended action: {}\n\
         - Reasoning: {}\n\
         - Current strategy: {}\n\
         - Initial dataset collected: {}\n\n\
         Follow this guidance when selecting tools and the investigation approach.\n",
        decision.recommended_action.label(),
        if decision.reasoning.is_empty() {
            "strategic investigation approach".to_string()
        } else {
            decision.reasoning.join(" ")
        },
        state.investigation_strategy.as_str(),
        state.snowflake_completed,
    )
}

/// Injects guidance into the message sequence.
///
/// The first system message is extended in place; when none exists, a new
/// system message is prepended only if that cannot break a tool sequence.
/// Message order is never rearranged.
pub fn inject_guidance(messages: &mut Vec<Message>, guidance: &str) {
    if guidance.trim().is_empty() {
        return;
    }

    if let Some(first_system) = messages
        .iter_mut()
        .find(|m| m.kind == MessageKind::System)
    {
        first_system.content.push_str("\n\n");
        first_system.content.push_str(guidance);
        return;
    }

    match messages.first() {
        Some(m) if m.kind == MessageKind::ToolUse => {
            warn!("guidance not injected: would break tool_use/tool_result sequence");
        }
        _ => {
            messages.insert(0, Message::system(guidance));
        }
    }
}

/// Validates the tool_use/tool_result adjacency invariant: every tool_use
/// is followed by its tool_result entries before any message of a
/// different kind.
pub fn validate_message_sequence(messages: &[Message]) -> bool {
    let mut expecting_result = false;
    for message in messages {
        match message.kind {
            MessageKind::ToolUse => {
                if expecting_result {
                    return false;
                }
                expecting_result = true;
            }
            MessageKind::ToolResult => {
                expecting_result = false;
            }
            _ => {
                if expecting_result {
                    return false;
                }
            }
        }
    }
    !expecting_result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::test_seed;
    use inquest_contracts::InvestigationState;

    fn tooled_messages() -> Vec<Message> {
        vec![
            Message::system("base prompt"),
            Message::assistant("analyzing"),
            Message::tool_use("[\"ip_reputation\"]"),
            Message::tool_result("{\"score\": 10}"),
        ]
    }

    #[test]
    fn guidance_extends_first_system_message() {
        let mut messages = tooled_messages();
        inject_guidance(&mut messages, "GUIDANCE");
        assert_eq!(messages.len(), 4);
        assert!(messages[0].content.contains("GUIDANCE"));
        assert!(validate_message_sequence(&messages));
    }

    #[test]
    fn guidance_prepends_when_no_system_message() {
        let mut messages = vec![Message::assistant("hello")];
        inject_guidance(&mut messages, "GUIDANCE");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].kind, MessageKind::System);
    }

    #[test]
    fn guidance_skipped_when_sequence_would_break() {
        let mut messages = vec![
            Message::tool_use("[\"x\"]"),
            Message::tool_result("{}"),
        ];
        inject_guidance(&mut messages, "GUIDANCE");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].kind, MessageKind::ToolUse);
        assert!(validate_message_sequence(&messages));
    }

    #[test]
    fn sequence_validator_flags_orphan_tool_use() {
        let messages = vec![
            Message::tool_use("[\"x\"]"),
            Message::assistant("skipped the result"),
        ];
        assert!(!validate_message_sequence(&messages));

        let messages = vec![Message::tool_use("[\"x\"]")];
        assert!(!validate_message_sequence(&messages));
    }

    #[test]
    fn guidance_mentions_latest_recommendation() {
        let state = InvestigationState::create_initial(test_seed("inv-ctx", 12));
        let guidance = guidance_context(&state);
        assert!(guidance.contains("snowflake_analysis"));
        assert!(guidance.contains("adaptive"));
    }
}
