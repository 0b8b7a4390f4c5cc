//! chat_client - streaming chat protocol client
//!
//! - `decoder` - SSE line decoding into [`StreamEvent`]s
//! - `transport` - chunk sources and the HTTP stream transport
//! - `controller` - one streaming exchange merged into a [`chat_core::ConversationState`]
//! - `api` - non-streaming chat and model listing

pub mod accumulator;
pub mod api;
pub mod controller;
pub mod decoder;
pub mod error;
pub mod models;
pub mod transport;

pub use accumulator::FragmentAccumulator;
pub use api::ApiClient;
pub use chat_core::{ChatMessage, Config, ConversationState, MalformedFramePolicy, Role};
pub use controller::{ConversationStreamController, FnObserver, StreamObserver, StreamOutcome};
pub use decoder::{DecodeSession, StreamDecoder, StreamEvent};
pub use error::{ClientError, Result, TransportError};
pub use models::{ChatRequest, ChatResponse, ModelInfo, ModelsResponse, Usage};
pub use transport::{ByteStreamSource, ChunkSource, HttpTransport, StreamTransport};
pub use tokio_util::sync::CancellationToken;
