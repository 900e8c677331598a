//! Conversation Data Model
//!
//! Roles, turns, and the bounded context window used during prompt assembly.
//!
//! # Design Philosophy
//!
//! Callers speak the wire vocabulary (`"user"` / `"llm"`); backends speak
//! model-specific role markers. The typed [`Role`] sits between the two so
//! that an unrecognized role is rejected once, at the channel boundary, and
//! never silently coerced further down.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Who produced a conversation turn.
///
/// The wire strings are exactly `"user"` and `"llm"`. Any other value fails
/// with [`InvalidRoleError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// The human side of the conversation.
    User,
    /// The model side of the conversation.
    Model,
}

impl Role {
    /// Parse a wire role string.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRoleError`] for anything other than `"user"` or
    /// `"llm"`.
    pub fn parse(role: &str) -> Result<Self, InvalidRoleError> {
        match role {
            "user" => Ok(Self::User),
            "llm" => Ok(Self::Model),
            other => Err(InvalidRoleError {
                role: other.to_string(),
            }),
        }
    }

    /// The wire representation of this role.
    #[must_use]
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "llm",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire_str())
    }
}

/// A history turn carried an unrecognized role value.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("role={role} is undefined, supported are: ('user', 'llm')")]
pub struct InvalidRoleError {
    /// The offending role string.
    pub role: String,
}

/// One turn of a conversation, immutable once constructed.
///
/// Serializes as a `[role, content]` pair to match the request schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "(String, String)", into = "(String, String)")]
pub struct ChatTurn {
    /// Who produced the turn.
    pub role: Role,
    /// The turn text.
    pub content: String,
}

impl ChatTurn {
    /// Create a turn.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl TryFrom<(String, String)> for ChatTurn {
    type Error = InvalidRoleError;

    fn try_from((role, content): (String, String)) -> Result<Self, Self::Error> {
        Ok(Self {
            role: Role::parse(&role)?,
            content,
        })
    }
}

impl From<ChatTurn> for (String, String) {
    fn from(turn: ChatTurn) -> Self {
        (turn.role.as_wire_str().to_string(), turn.content)
    }
}

/// The suffix of `history` that fits the context window.
///
/// At most the `depth` most recent turns are returned, in their original
/// order. Older turns are dropped, not summarized.
#[must_use]
pub fn context_window(history: &[ChatTurn], depth: usize) -> &[ChatTurn] {
    let start = history.len().saturating_sub(depth);
    &history[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_known() {
        assert_eq!(Role::parse("user").unwrap(), Role::User);
        assert_eq!(Role::parse("llm").unwrap(), Role::Model);
    }

    #[test]
    fn test_role_parse_unknown_rejected() {
        let err = Role::parse("assistant").unwrap_err();
        assert_eq!(err.role, "assistant");
        assert!(err.to_string().contains("assistant"));

        // Case matters: never coerce.
        assert!(Role::parse("User").is_err());
        assert!(Role::parse("").is_err());
    }

    #[test]
    fn test_turn_wire_roundtrip() {
        let turn = ChatTurn::new(Role::Model, "hello");
        let json = serde_json::to_string(&turn).unwrap();
        assert_eq!(json, r#"["llm","hello"]"#);

        let back: ChatTurn = serde_json::from_str(&json).unwrap();
        assert_eq!(back, turn);
    }

    #[test]
    fn test_turn_unknown_role_fails_decode() {
        let result: Result<ChatTurn, _> = serde_json::from_str(r#"["bot","hi"]"#);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("role=bot"), "unexpected error: {err}");
    }

    #[test]
    fn test_context_window_bounds() {
        let history: Vec<ChatTurn> = (0..5)
            .map(|i| ChatTurn::new(Role::User, format!("turn {i}")))
            .collect();

        assert_eq!(context_window(&history, 2).len(), 2);
        assert_eq!(context_window(&history, 2)[0].content, "turn 3");
        assert_eq!(context_window(&history, 2)[1].content, "turn 4");

        // Depth larger than history returns everything.
        assert_eq!(context_window(&history, 99).len(), 5);
        // Zero depth returns nothing.
        assert!(context_window(&history, 0).is_empty());
        // Empty history stays empty.
        assert!(context_window(&[], 3).is_empty());
    }
}
