//! ConversationState - ordered message log of one conversation view.
//!
//! Insertion order is chronological order. At most one message is in progress at a time and it
//! is always the last one; every mutation below keeps that invariant.

use thiserror::Error;

use crate::message::{ChatMessage, MessageStatus, Role};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    #[error("an assistant message is already streaming")]
    ExchangeInProgress,

    #[error("no assistant message is streaming")]
    NoPendingMessage,
}

pub type Result<T> = std::result::Result<T, ConversationError>;

#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    messages: Vec<ChatMessage>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop all messages, e.g. when the view is left.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> Result<()> {
        self.push_final(ChatMessage::user(content))
    }

    pub fn push_system(&mut self, content: impl Into<String>) -> Result<()> {
        self.push_final(ChatMessage::system(content))
    }

    /// Append a finished assistant reply (non-streaming exchange).
    pub fn push_assistant(&mut self, content: impl Into<String>) -> Result<()> {
        self.push_final(ChatMessage::assistant(content))
    }

    fn push_final(&mut self, message: ChatMessage) -> Result<()> {
        if self.pending().is_some() {
            return Err(ConversationError::ExchangeInProgress);
        }
        self.messages.push(message);
        Ok(())
    }

    /// Append the empty assistant message that the next stream will fill.
    pub fn begin_assistant(&mut self) -> Result<()> {
        if self.pending().is_some() {
            return Err(ConversationError::ExchangeInProgress);
        }
        self.messages.push(ChatMessage::pending_assistant());
        Ok(())
    }

    pub fn pending(&self) -> Option<&ChatMessage> {
        self.messages.last().filter(|m| m.is_streaming())
    }

    fn pending_mut(&mut self) -> Result<&mut ChatMessage> {
        self.messages
            .last_mut()
            .filter(|m| m.is_streaming())
            .ok_or(ConversationError::NoPendingMessage)
    }

    /// Replace the pending message content with the text accumulated so far.
    pub fn set_pending_content(&mut self, content: &str) -> Result<()> {
        let message = self.pending_mut()?;
        message.content.clear();
        message.content.push_str(content);
        Ok(())
    }

    pub fn complete_pending(&mut self) -> Result<()> {
        self.finalize_pending(MessageStatus::Done)
    }

    /// Finalize the pending message as failed. A `notice` replaces the partial content; `None`
    /// keeps whatever was streamed before the failure.
    pub fn fail_pending(&mut self, notice: Option<&str>) -> Result<()> {
        let message = self.pending_mut()?;
        if let Some(notice) = notice {
            message.content = notice.to_string();
        }
        message.status = MessageStatus::Failed;
        Ok(())
    }

    pub fn cancel_pending(&mut self) -> Result<()> {
        self.finalize_pending(MessageStatus::Cancelled)
    }

    fn finalize_pending(&mut self, status: MessageStatus) -> Result<()> {
        let message = self.pending_mut()?;
        message.status = status;
        Ok(())
    }

    /// Messages to send as request history.
    ///
    /// The in-progress message and assistant messages that failed or were cancelled are left
    /// out, so a failure notice is never fed back to the model.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| match m.status {
                MessageStatus::Done => true,
                MessageStatus::Failed | MessageStatus::Cancelled => m.role != Role::Assistant,
                MessageStatus::Streaming => false,
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_message_is_always_last() {
        let mut state = ConversationState::new();
        state.push_user("hello").unwrap();
        state.begin_assistant().unwrap();

        let pending = state.pending().expect("pending message");
        assert_eq!(pending.role, Role::Assistant);
        assert!(pending.content.is_empty());
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn second_pending_message_is_rejected() {
        let mut state = ConversationState::new();
        state.begin_assistant().unwrap();

        assert_eq!(
            state.begin_assistant(),
            Err(ConversationError::ExchangeInProgress)
        );
        assert_eq!(
            state.push_user("interrupt"),
            Err(ConversationError::ExchangeInProgress)
        );
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn finalized_message_is_immutable() {
        let mut state = ConversationState::new();
        state.begin_assistant().unwrap();
        state.set_pending_content("Hello").unwrap();
        state.complete_pending().unwrap();

        assert!(state.pending().is_none());
        assert_eq!(
            state.set_pending_content("changed"),
            Err(ConversationError::NoPendingMessage)
        );
        assert_eq!(state.messages()[0].content, "Hello");
        assert_eq!(state.messages()[0].status, MessageStatus::Done);
    }

    #[test]
    fn fail_pending_replaces_or_keeps_partial_content() {
        let mut state = ConversationState::new();
        state.begin_assistant().unwrap();
        state.set_pending_content("partial").unwrap();
        state.fail_pending(None).unwrap();
        assert_eq!(state.messages()[0].content, "partial");
        assert_eq!(state.messages()[0].status, MessageStatus::Failed);

        state.begin_assistant().unwrap();
        state.set_pending_content("partial").unwrap();
        state.fail_pending(Some("request failed")).unwrap();
        assert_eq!(state.messages()[1].content, "request failed");
    }

    #[test]
    fn history_skips_unfinished_and_failed_replies() {
        let mut state = ConversationState::new();
        state.push_system("be brief").unwrap();
        state.push_user("first").unwrap();
        state.begin_assistant().unwrap();
        state.fail_pending(Some("error")).unwrap();
        state.push_user("second").unwrap();
        state.begin_assistant().unwrap();
        state.set_pending_content("stream").unwrap();

        let history: Vec<_> = state
            .history()
            .into_iter()
            .map(|m| (m.role, m.content))
            .collect();
        assert_eq!(
            history,
            vec![
                (Role::System, "be brief".to_string()),
                (Role::User, "first".to_string()),
                (Role::User, "second".to_string()),
            ]
        );
    }

    #[test]
    fn clear_resets_everything() {
        let mut state = ConversationState::new();
        state.push_user("hi").unwrap();
        state.begin_assistant().unwrap();
        state.clear();

        assert!(state.is_empty());
        assert!(state.begin_assistant().is_ok());
    }
}
