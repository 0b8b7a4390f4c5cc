//! Plain request/response calls that sit next to the streaming exchange.

use std::sync::Arc;
use std::time::Duration;

use chat_core::Config;
use log::{debug, error};
use reqwest::{Client, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;

use crate::error::{ClientError, Result};
use crate::models::{ChatRequest, ChatResponse, ModelsResponse};
use crate::transport::build_http_client;

pub const CHAT_PATH: &str = "/v1/llm/chat";
pub const MODELS_PATH: &str = "/v1/llm/models";

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    // Only used for idempotent GETs; chat requests may bill tokens and are never retried.
    retry_client: Arc<ClientWithMiddleware>,
    api_base: String,
}

impl ApiClient {
    pub fn new(client: Client, api_base: impl Into<String>) -> Self {
        let api_base: String = api_base.into();
        let retry_client = Arc::new(Self::build_retry_client(client.clone(), 2));
        Self {
            client,
            retry_client,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(build_http_client(config)?, config.api_base()))
    }

    /// Replace the retry policy used for model listing.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry_client = Arc::new(Self::build_retry_client(self.client.clone(), max_retries));
        self
    }

    fn build_retry_client(client: Client, max_retries: u32) -> ClientWithMiddleware {
        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_millis(500), Duration::from_secs(5))
            .build_with_max_retries(max_retries);

        ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build()
    }

    /// `POST /v1/llm/chat`, the non-streaming exchange.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}{}", self.api_base, CHAT_PATH);
        let mut body = request.clone();
        body.stream = false;

        debug!("POST {} ({} messages)", url, body.messages.len());
        let response = self.client.post(&url).json(&body).send().await?;
        Self::decode(response).await
    }

    /// `GET /v1/llm/models`.
    pub async fn list_models(&self) -> Result<ModelsResponse> {
        let url = format!("{}{}", self.api_base, MODELS_PATH);
        debug!("GET {}", url);
        let response = self.retry_client.get(&url).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Request failed: HTTP {}: {}", status, body);
            return Err(ClientError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
