//! Progress event protocol.
//!
//! `ProgressEvent` is everything a run emits across the transport boundary.
//! Transport layers (CLI, a chat server) consume these and map them to their
//! own presentation. Every run ends with exactly one `Done`, optionally
//! preceded by an `Error`.

use serde::Serialize;

use super::intent::QueryKind;
use super::resolver::{Source, Strategy};
use super::tools::ToolKind;
use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Ask,
    Build,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    // ── Analysis ───────────────────────────────────────────────────────
    AnalysisStarted { run_id: String, mode: Mode },

    // ── Resolution ─────────────────────────────────────────────────────
    /// One component query finished resolving.
    ComponentResolved {
        query: String,
        kind: QueryKind,
        strategy: Strategy,
        source: Source,
    },

    // ── Agent loop ─────────────────────────────────────────────────────
    PlanReady { steps: usize, max_tool_calls: usize },

    /// A budgeted tool call is about to run.
    ToolCall { tool: ToolKind, query: String },

    // ── Streaming ──────────────────────────────────────────────────────
    /// Text generated since the previous update. Deltas concatenate to the
    /// final text.
    StreamingUpdate {
        delta: String,
        cumulative_chars: usize,
        cumulative_words: usize,
        /// Seconds since generation started
        elapsed: f64,
    },

    // ── Terminal ───────────────────────────────────────────────────────
    Done { final_text: String, complete: bool },

    Error { kind: ErrorKind, message: String },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = ProgressEvent::ComponentResolved {
            query: "send chat message".into(),
            kind: QueryKind::Action,
            strategy: Strategy::SemanticSuggestion,
            source: Source::Semantic,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "component_resolved");
        assert_eq!(json["strategy"], "semantic_suggestion");
        assert_eq!(json["kind"], "action");

        let done = serde_json::to_value(ProgressEvent::Done {
            final_text: "ok".into(),
            complete: false,
        })
        .unwrap();
        assert_eq!(done["type"], "done");
        assert_eq!(done["complete"], false);
    }
}
