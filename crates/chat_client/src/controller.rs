//! Drives one streaming exchange from request to terminal state.

use std::sync::Arc;

use chat_core::{Config, ConversationState, MalformedFramePolicy};
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::accumulator::FragmentAccumulator;
use crate::decoder::{DecodeSession, StreamEvent};
use crate::error::{ClientError, Result};
use crate::models::ChatRequest;
use crate::transport::{HttpTransport, StreamTransport};

/// Receives the progress of one exchange.
///
/// `on_fragment` always gets the full text accumulated so far, so a consumer can replace its
/// view rather than merge deltas. Exactly one of `on_complete` / `on_error` fires per exchange,
/// unless the exchange is cancelled, in which case neither does.
pub trait StreamObserver: Send {
    fn on_fragment(&mut self, content: &str);

    fn on_complete(&mut self);

    fn on_error(&mut self, error: &ClientError);

    /// Called for undecodable frames under [`MalformedFramePolicy::Report`].
    fn on_malformed(&mut self, _line: &str) {}
}

/// [`StreamObserver`] built from three closures.
pub struct FnObserver<F, C, E> {
    on_fragment: F,
    on_complete: C,
    on_error: E,
}

impl<F, C, E> FnObserver<F, C, E>
where
    F: FnMut(&str) + Send,
    C: FnMut() + Send,
    E: FnMut(&ClientError) + Send,
{
    pub fn new(on_fragment: F, on_complete: C, on_error: E) -> Self {
        Self {
            on_fragment,
            on_complete,
            on_error,
        }
    }
}

impl<F, C, E> StreamObserver for FnObserver<F, C, E>
where
    F: FnMut(&str) + Send,
    C: FnMut() + Send,
    E: FnMut(&ClientError) + Send,
{
    fn on_fragment(&mut self, content: &str) {
        (self.on_fragment)(content)
    }

    fn on_complete(&mut self) {
        (self.on_complete)()
    }

    fn on_error(&mut self, error: &ClientError) {
        (self.on_error)(error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed { content: String },
    Failed,
    Cancelled,
}

pub struct ConversationStreamController {
    transport: Arc<dyn StreamTransport>,
    malformed_frames: MalformedFramePolicy,
}

impl ConversationStreamController {
    pub fn new(transport: Arc<dyn StreamTransport>) -> Self {
        Self {
            transport,
            malformed_frames: MalformedFramePolicy::Skip,
        }
    }

    pub fn with_malformed_policy(mut self, policy: MalformedFramePolicy) -> Self {
        self.malformed_frames = policy;
        self
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = HttpTransport::from_config(config)?;
        Ok(Self::new(Arc::new(transport)).with_malformed_policy(config.malformed_frames))
    }

    /// Run one streaming exchange.
    ///
    /// An empty assistant message is appended to `state` before the request goes out and
    /// receives the accumulated text as fragments arrive. On completion it is finalized; on
    /// error it is left in place, still streaming, for the caller to mark as failed. No retry is
    /// attempted.
    pub async fn start(
        &self,
        state: &mut ConversationState,
        request: ChatRequest,
        observer: &mut dyn StreamObserver,
        cancel: &CancellationToken,
    ) -> StreamOutcome {
        if let Err(err) = state.begin_assistant() {
            warn!("Refusing to start a second exchange: {}", err);
            observer.on_error(&ClientError::from(err));
            return StreamOutcome::Failed;
        }

        let request = request.streaming();
        debug!(
            "Starting stream exchange: provider={}, model={}, {} messages",
            request.provider,
            request.model,
            request.messages.len()
        );

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Self::cancelled(state),
            opened = self.transport.open(&request) => opened,
        };

        let source = match opened {
            Ok(source) => source,
            Err(err) => {
                error!("Stream request failed: {}", err);
                observer.on_error(&err);
                return StreamOutcome::Failed;
            }
        };

        let mut session = DecodeSession::new(source);
        let mut accumulator = FragmentAccumulator::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Self::cancelled(state),
                next = session.next_event() => next,
            };

            match next {
                Ok(Some(StreamEvent::Fragment(text))) => {
                    if text.is_empty() {
                        continue;
                    }
                    let content = accumulator.push(&text);
                    if let Err(err) = state.set_pending_content(content) {
                        error!("Lost the pending assistant message: {}", err);
                        observer.on_error(&ClientError::from(err));
                        return StreamOutcome::Failed;
                    }
                    observer.on_fragment(content);
                }
                Ok(Some(StreamEvent::Malformed(line))) => {
                    warn!("Failed to parse stream frame: {}", line);
                    if self.malformed_frames == MalformedFramePolicy::Report {
                        observer.on_malformed(&line);
                    }
                }
                Ok(Some(StreamEvent::Failed(message))) => {
                    error!("Server reported a stream error: {}", message);
                    observer.on_error(&ClientError::Remote(message));
                    return StreamOutcome::Failed;
                }
                Ok(Some(StreamEvent::Complete)) | Ok(None) => {
                    if let Err(err) = state.complete_pending() {
                        error!("Lost the pending assistant message: {}", err);
                        observer.on_error(&ClientError::from(err));
                        return StreamOutcome::Failed;
                    }
                    info!(
                        "Stream complete: {} fragments, {} bytes",
                        accumulator.len(),
                        accumulator.content().len()
                    );
                    observer.on_complete();
                    return StreamOutcome::Completed {
                        content: accumulator.into_content(),
                    };
                }
                Err(err) => {
                    error!("Error in SSE stream: {}", err);
                    observer.on_error(&ClientError::Transport(err));
                    return StreamOutcome::Failed;
                }
            }
        }
    }

    fn cancelled(state: &mut ConversationState) -> StreamOutcome {
        info!("Stream exchange cancelled");
        if let Err(err) = state.cancel_pending() {
            warn!("Nothing to cancel: {}", err);
        }
        StreamOutcome::Cancelled
    }
}
