//! Centralized reasoning/verbosity configuration
//!
//! Picks effort levels per call site and renders them as Responses API
//! request parameters in one place.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Low,
    Medium,
    High,
}

impl ReasoningLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl Verbosity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Centralized reasoning configuration builder
pub struct ReasoningConfig;

impl ReasoningConfig {
    /// Request fields for the given levels, to merge into the request body.
    pub fn build(reasoning: ReasoningLevel, verbosity: Verbosity) -> Value {
        json!({
            "reasoning": { "effort": reasoning.as_str() },
            "text": { "verbosity": verbosity.as_str() }
        })
    }

    /// Levels for intent extraction: short structured output, so keep it cheap.
    pub fn for_analysis(fast_mode: bool) -> (ReasoningLevel, Verbosity) {
        if fast_mode {
            (ReasoningLevel::Low, Verbosity::Low)
        } else {
            (ReasoningLevel::Medium, Verbosity::Medium)
        }
    }

    /// Levels for guide generation. `straightforward` is a simple request
    /// analysed with high confidence.
    pub fn for_guide(fast_mode: bool, straightforward: bool) -> (ReasoningLevel, Verbosity) {
        match (fast_mode, straightforward) {
            (true, true) => (ReasoningLevel::Low, Verbosity::Medium),
            (true, false) => (ReasoningLevel::Medium, Verbosity::High),
            (false, true) => (ReasoningLevel::Medium, Verbosity::Medium),
            (false, false) => (ReasoningLevel::High, Verbosity::High),
        }
    }

    /// Levels for the agent loop's final answer.
    pub fn for_answer(fast_mode: bool) -> (ReasoningLevel, Verbosity) {
        if fast_mode {
            (ReasoningLevel::Low, Verbosity::Medium)
        } else {
            (ReasoningLevel::Medium, Verbosity::Medium)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_params() {
        let val = ReasoningConfig::build(ReasoningLevel::High, Verbosity::Low);
        assert_eq!(val["reasoning"]["effort"], "high");
        assert_eq!(val["text"]["verbosity"], "low");
    }

    #[test]
    fn test_guide_levels() {
        assert_eq!(
            ReasoningConfig::for_guide(true, true),
            (ReasoningLevel::Low, Verbosity::Medium)
        );
        assert_eq!(
            ReasoningConfig::for_guide(true, false),
            (ReasoningLevel::Medium, Verbosity::High)
        );
        assert_eq!(
            ReasoningConfig::for_guide(false, false),
            (ReasoningLevel::High, Verbosity::High)
        );
    }

    #[test]
    fn test_analysis_levels() {
        assert_eq!(
            ReasoningConfig::for_analysis(true),
            (ReasoningLevel::Low, Verbosity::Low)
        );
        assert_eq!(
            ReasoningConfig::for_analysis(false),
            (ReasoningLevel::Medium, Verbosity::Medium)
        );
    }
}
