//! Chat turns and conversation flattening

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::text::normalize_text;

/// Speaker of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Role name as it appears in the chat template.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Normalize every turn, drop empty ones, and merge consecutive turns of the
/// same role.
///
/// Turns that normalize to an empty string are skipped entirely, so they do
/// not separate two same-role neighbours. Merged contents are joined with a
/// single space. The input is never modified.
pub fn flatten(turns: &[ChatTurn]) -> Vec<ChatTurn> {
    turns.iter().fold(Vec::new(), |mut acc: Vec<ChatTurn>, turn| {
        let content = normalize_text(&turn.content);
        if content.is_empty() {
            return acc;
        }
        match acc.last_mut() {
            Some(last) if last.role == turn.role => {
                last.content.push(' ');
                last.content.push_str(&content);
            }
            _ => acc.push(ChatTurn::new(turn.role, content)),
        }
        acc
    })
}

/// Keep only the `max_turns` most recent turns.
///
/// `None` or `Some(0)` leaves the conversation untouched.
pub fn limit_history(mut turns: Vec<ChatTurn>, max_turns: Option<usize>) -> Vec<ChatTurn> {
    if let Some(max) = max_turns.filter(|&m| m > 0)
        && turns.len() > max
    {
        turns.drain(..turns.len() - max);
    }
    turns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_same_role() {
        let turns = vec![
            ChatTurn::user("Hello there."),
            ChatTurn::user("How are you?"),
        ];
        let flat = flatten(&turns);
        assert_eq!(flat, vec![ChatTurn::user("hello there how are you")]);
    }

    #[test]
    fn test_whitespace_only_dropped() {
        let turns = vec![ChatTurn::user("   ")];
        assert!(flatten(&turns).is_empty());
    }

    #[test]
    fn test_empty_turn_is_not_a_boundary() {
        let turns = vec![
            ChatTurn::user("first"),
            ChatTurn::assistant("..."),
            ChatTurn::user("second"),
        ];
        let flat = flatten(&turns);
        assert_eq!(flat, vec![ChatTurn::user("first second")]);
    }

    #[test]
    fn test_alternating_roles_kept() {
        let turns = vec![
            ChatTurn::assistant("Hi! How can I help?"),
            ChatTurn::user("I'd like to book a table"),
            ChatTurn::assistant("Sure."),
            ChatTurn::user("For two."),
        ];
        let flat = flatten(&turns);
        assert_eq!(flat.len(), 4);
        assert_eq!(flat[0], ChatTurn::assistant("hi how can i help"));
        assert_eq!(flat[1], ChatTurn::user("i'd like to book a table"));
        assert_eq!(flat[3], ChatTurn::user("for two"));
    }

    #[test]
    fn test_input_untouched() {
        let turns = vec![ChatTurn::user("A."), ChatTurn::user("B.")];
        let before = turns.clone();
        let _ = flatten(&turns);
        assert_eq!(turns, before);
    }

    #[test]
    fn test_limit_history() {
        let turns = vec![
            ChatTurn::user("a"),
            ChatTurn::assistant("b"),
            ChatTurn::user("c"),
        ];
        assert_eq!(limit_history(turns.clone(), None), turns);
        assert_eq!(limit_history(turns.clone(), Some(0)), turns);
        assert_eq!(limit_history(turns.clone(), Some(5)), turns);
        assert_eq!(
            limit_history(turns, Some(2)),
            vec![ChatTurn::assistant("b"), ChatTurn::user("c")]
        );
    }

    #[test]
    fn test_role_serde() {
        let turn: ChatTurn = serde_json::from_str(r#"{"role":"assistant","content":"ok"}"#)
            .expect("valid turn json");
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(
            serde_json::to_string(&ChatTurn::user("hi")).unwrap(),
            r#"{"role":"user","content":"hi"}"#
        );
    }
}
