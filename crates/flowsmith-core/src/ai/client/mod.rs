//! Responses API client
//!
//! OpenAI-compatible `POST {base_url}/responses`, blocking and SSE streaming.

mod config;
mod simple;
mod streaming;

use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{error, info};

pub use config::ResponsesClientConfig;

use super::reasoning::{ReasoningConfig, ReasoningLevel, Verbosity};
use super::{LanguageModel, TextStream};
use crate::error::CollaboratorError;

pub(crate) const COLLABORATOR: &str = "model";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ResponsesClient {
    http: reqwest::Client,
    config: ResponsesClientConfig,
}

impl ResponsesClient {
    pub fn new(config: ResponsesClientConfig) -> Result<Self> {
        if config.api_key.is_none() {
            tracing::warn!(url = %config.api_url(), "No API key configured for model calls");
        }
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ResponsesClientConfig {
        &self.config
    }

    fn request_body(
        &self,
        prompt: &str,
        reasoning: ReasoningLevel,
        verbosity: Verbosity,
        stream: bool,
    ) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "input": prompt,
            "stream": stream,
        });
        if let (Some(obj), Value::Object(params)) = (
            body.as_object_mut(),
            ReasoningConfig::build(reasoning, verbosity),
        ) {
            obj.extend(params);
        }
        body
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, CollaboratorError> {
        let mut request = self.http.post(self.config.api_url()).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        let call_start = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| CollaboratorError::unavailable(COLLABORATOR, e))?;
        ensure_success(response, call_start).await
    }
}

async fn ensure_success(
    response: reqwest::Response,
    call_start: Instant,
) -> Result<reqwest::Response, CollaboratorError> {
    let status = response.status();
    info!(
        status = %status,
        elapsed_ms = call_start.elapsed().as_millis() as u64,
        "Responses API replied"
    );

    if status.is_success() {
        return Ok(response);
    }

    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    error!(status = %status, body = %error_text, "Responses API error");
    Err(CollaboratorError::unavailable(
        COLLABORATOR,
        format!("{status} - {error_text}"),
    ))
}

#[async_trait]
impl LanguageModel for ResponsesClient {
    async fn complete(
        &self,
        prompt: &str,
        reasoning: ReasoningLevel,
        verbosity: Verbosity,
    ) -> Result<String, CollaboratorError> {
        self.call_simple(prompt, reasoning, verbosity).await
    }

    async fn stream(
        &self,
        prompt: &str,
        reasoning: ReasoningLevel,
        verbosity: Verbosity,
    ) -> Result<TextStream, CollaboratorError> {
        self.call_streaming(prompt, reasoning, verbosity).await
    }
}
