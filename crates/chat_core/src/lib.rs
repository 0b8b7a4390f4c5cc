//! chat_core - Core types for the streaming chat client
//!
//! This crate provides the foundational types shared by the client crates:
//! - `message` - ChatMessage, Role and the local MessageStatus
//! - `conversation` - ConversationState, the ordered message log of one view
//! - `config` - Config loaded from file and environment
//! - `paths` - Locations of the per-user config files

pub mod config;
pub mod conversation;
pub mod message;
pub mod paths;

// Re-export commonly used types
pub use config::{Config, MalformedFramePolicy};
pub use conversation::{ConversationError, ConversationState};
pub use message::{ChatMessage, MessageStatus, Role};
