//! Simple (non-streaming) API calls

use serde_json::Value;
use tracing::debug;

use super::{ResponsesClient, COLLABORATOR};
use crate::ai::reasoning::{ReasoningLevel, Verbosity};
use crate::ai::sse::collect_output_text;
use crate::error::CollaboratorError;

impl ResponsesClient {
    /// Make a simple non-streaming API call and return the output text
    pub(super) async fn call_simple(
        &self,
        prompt: &str,
        reasoning: ReasoningLevel,
        verbosity: Verbosity,
    ) -> Result<String, CollaboratorError> {
        let body = self.request_body(prompt, reasoning, verbosity, false);
        let response = self.post(&body).await?;

        let json: Value = response
            .json()
            .await
            .map_err(|e| CollaboratorError::invalid(COLLABORATOR, e))?;

        let text = collect_output_text(&json)
            .ok_or_else(|| CollaboratorError::invalid(COLLABORATOR, "no output_text in response"))?;
        debug!(chars = text.len(), "Simple call complete");
        Ok(text.trim().to_string())
    }
}
