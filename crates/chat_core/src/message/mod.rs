//! Message module - Chat message types
//!
//! `ChatMessage` is the unit of conversation history. Only `role` and `content` travel on the
//! wire; `status` is local bookkeeping for the message that is still being streamed.

use serde::{Deserialize, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a message inside a conversation.
///
/// Only a `Streaming` message may change. Every other status is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageStatus {
    Streaming,
    #[default]
    Done,
    Failed,
    Cancelled,
}

impl MessageStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, MessageStatus::Streaming)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip)]
    pub status: MessageStatus,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            status: MessageStatus::Done,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Empty assistant message that is still receiving fragments.
    pub fn pending_assistant() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            status: MessageStatus::Streaming,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.status == MessageStatus::Streaming
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_omits_status() {
        let mut message = ChatMessage::pending_assistant();
        message.content = "partial".to_string();

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"role": "assistant", "content": "partial"})
        );
    }

    #[test]
    fn deserialized_messages_are_final() {
        let message: ChatMessage =
            serde_json::from_str(r#"{"role":"user","content":"hi"}"#).unwrap();
        assert_eq!(message.role, Role::User);
        assert_eq!(message.status, MessageStatus::Done);
        assert!(message.status.is_final());
    }

    #[test]
    fn unknown_role_is_rejected() {
        let result = serde_json::from_str::<ChatMessage>(r#"{"role":"tool","content":""}"#);
        assert!(result.is_err());
    }
}
