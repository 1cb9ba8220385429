//! Language model layer
//!
//! The `LanguageModel` contract the pipeline consumes, effort selection, and
//! the Responses API client that implements it.

pub mod client;
pub mod reasoning;
mod sse;

use async_trait::async_trait;
use futures::stream::BoxStream;

pub use client::{ResponsesClient, ResponsesClientConfig};
pub use reasoning::{ReasoningConfig, ReasoningLevel, Verbosity};

use crate::error::CollaboratorError;

/// Text deltas in arrival order. Ends after the last delta, or with an error.
pub type TextStream = BoxStream<'static, Result<String, CollaboratorError>>;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        reasoning: ReasoningLevel,
        verbosity: Verbosity,
    ) -> Result<String, CollaboratorError>;

    async fn stream(
        &self,
        prompt: &str,
        reasoning: ReasoningLevel,
        verbosity: Verbosity,
    ) -> Result<TextStream, CollaboratorError>;
}

/// Strip a surrounding ```json fence, if any, from a model reply.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") up to the first newline.
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n[1]\n```  "), "[1]");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn unterminated_fence_keeps_body() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}"), "{\"a\":1}");
    }
}
