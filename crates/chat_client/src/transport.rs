//! Byte transports for streaming exchanges.
//!
//! The decoder only needs "give me the next chunk, or tell me the stream is over".
//! [`ChunkSource`] is that capability; [`StreamTransport`] opens one for a request.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chat_core::Config;
use futures::{Stream, StreamExt};
use log::{debug, error};
use reqwest::{Client, Proxy, Response};

use crate::error::{ClientError, Result, TransportError};
use crate::models::ChatRequest;

pub const STREAM_PATH: &str = "/v1/llm/chat/stream";

#[async_trait]
pub trait ChunkSource: Send {
    /// Next chunk of the body, `Ok(None)` at end of data.
    async fn next_chunk(&mut self) -> std::result::Result<Option<Bytes>, TransportError>;
}

#[async_trait]
impl<S> ChunkSource for Box<S>
where
    S: ChunkSource + ?Sized,
{
    async fn next_chunk(&mut self) -> std::result::Result<Option<Bytes>, TransportError> {
        (**self).next_chunk().await
    }
}

#[async_trait]
impl ChunkSource for Response {
    async fn next_chunk(&mut self) -> std::result::Result<Option<Bytes>, TransportError> {
        self.chunk()
            .await
            .map_err(|e| TransportError::with_source("failed to read response body", e))
    }
}

/// Adapts any ordered byte stream (chunked body, WebSocket frames, a pipe) into a
/// [`ChunkSource`].
pub struct ByteStreamSource<S> {
    inner: S,
}

impl<S> ByteStreamSource<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S, E> ChunkSource for ByteStreamSource<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    async fn next_chunk(&mut self) -> std::result::Result<Option<Bytes>, TransportError> {
        match self.inner.next().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => Err(TransportError::with_source(e.to_string(), e)),
            None => Ok(None),
        }
    }
}

#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Send `request` and return its body once the server has accepted it.
    ///
    /// A non-success status is reported as [`ClientError::Server`] before any body is decoded.
    async fn open(&self, request: &ChatRequest) -> Result<Box<dyn ChunkSource>>;
}

fn apply_proxies(
    mut builder: reqwest::ClientBuilder,
    config: &Config,
) -> Result<reqwest::ClientBuilder> {
    if !config.http_proxy.is_empty() {
        builder = builder.proxy(Proxy::http(&config.http_proxy)?);
    }
    if !config.https_proxy.is_empty() {
        builder = builder.proxy(Proxy::https(&config.https_proxy)?);
    }
    Ok(builder)
}

/// Build the shared reqwest client from config (proxies, optional timeout).
pub fn build_http_client(config: &Config) -> Result<Client> {
    let mut builder = apply_proxies(Client::builder(), config)?;
    if let Some(secs) = config.request_timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    Ok(builder.build()?)
}

/// Streams chat responses over HTTP from `{api_base}/v1/llm/chat/stream`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    api_base: String,
}

impl HttpTransport {
    pub fn new(client: Client, api_base: impl Into<String>) -> Self {
        let api_base: String = api_base.into();
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(build_http_client(config)?, config.api_base()))
    }
}

#[async_trait]
impl StreamTransport for HttpTransport {
    async fn open(&self, request: &ChatRequest) -> Result<Box<dyn ChunkSource>> {
        let url = format!("{}{}", self.api_base, STREAM_PATH);
        let mut body = request.clone();
        body.stream = true;

        debug!(
            "POST {} ({} messages, model {})",
            url,
            body.messages.len(),
            body.model
        );

        let response = self
            .client
            .post(&url)
            .header("accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send stream request: {}", e);
                ClientError::Http(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Stream request rejected: HTTP {}", status);
            return Err(ClientError::Server {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Box::new(response))
    }
}
