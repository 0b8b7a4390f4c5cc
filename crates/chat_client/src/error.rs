use chat_core::ConversationError;
use thiserror::Error;

/// Failure while pulling bytes from an open response body.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Server error: HTTP {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Stream error: {0}")]
    Transport(#[from] TransportError),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
