//! Error taxonomy
//!
//! Collaborator failures are absorbed close to where they happen; only the
//! whole-pipeline conditions in `OrchestrationError` ever reach the caller.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Failure of a single call to an external collaborator.
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    #[error("{collaborator} timed out after {}ms", after.as_millis())]
    Timeout {
        collaborator: &'static str,
        after: Duration,
    },

    #[error("{collaborator} unavailable: {message}")]
    Unavailable {
        collaborator: &'static str,
        message: String,
    },

    #[error("{collaborator} returned an invalid response: {message}")]
    InvalidResponse {
        collaborator: &'static str,
        message: String,
    },

    #[error("{collaborator} call cancelled")]
    Cancelled { collaborator: &'static str },
}

impl CollaboratorError {
    pub fn unavailable(collaborator: &'static str, message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            collaborator,
            message: message.to_string(),
        }
    }

    pub fn invalid(collaborator: &'static str, message: impl std::fmt::Display) -> Self {
        Self::InvalidResponse {
            collaborator,
            message: message.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Whole-pipeline failures.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Intent extraction failed; callers recover with a default intent.
    #[error("request analysis failed: {reason}")]
    AnalysisFailed { reason: String },

    /// Streaming and the single non-streaming retry both failed.
    /// `partial` holds whatever text streamed before the failure.
    #[error("guide synthesis failed: {source}")]
    SynthesisFailed {
        partial: String,
        #[source]
        source: CollaboratorError,
    },
}

impl OrchestrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AnalysisFailed { .. } => ErrorKind::AnalysisFailed,
            Self::SynthesisFailed { .. } => ErrorKind::SynthesisFailed,
        }
    }
}

impl From<CollaboratorError> for OrchestrationError {
    fn from(err: CollaboratorError) -> Self {
        Self::AnalysisFailed {
            reason: err.to_string(),
        }
    }
}

/// Error kinds as they cross the transport boundary. Collaborator
/// failures and an exhausted tool budget are absorbed before they get here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AnalysisFailed,
    SynthesisFailed,
}
