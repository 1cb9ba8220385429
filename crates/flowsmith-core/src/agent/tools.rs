//! Tools available to the agent loop
//!
//! A closed set. Catalog and semantic calls go through the resolver so they
//! share the run cache and failure ledger with batch resolution.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::context::RunContext;
use super::intent::ComponentQuery;
use super::resolver::{ComponentResolver, ComponentResult};
use crate::ai::{LanguageModel, ReasoningLevel, Verbosity};
use crate::catalog::SemanticHit;
use crate::collaborators::guarded;
use crate::error::CollaboratorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    CatalogLookup,
    SemanticSearch,
    LanguageModelCall,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CatalogLookup => "catalog_lookup",
            Self::SemanticSearch => "semantic_search",
            Self::LanguageModelCall => "language_model_call",
        }
    }
}

/// One budgeted call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    CatalogLookup(ComponentQuery),
    SemanticSearch { query: String },
    LanguageModelCall { prompt: String },
}

impl ToolCall {
    /// Build the call for `tool` over one query variant.
    pub fn for_query(tool: ToolKind, query: &ComponentQuery) -> Self {
        match tool {
            ToolKind::CatalogLookup => Self::CatalogLookup(query.clone()),
            ToolKind::SemanticSearch => Self::SemanticSearch {
                query: query.description.clone(),
            },
            ToolKind::LanguageModelCall => Self::LanguageModelCall {
                prompt: format!(
                    "Answer briefly for a workflow automation user: {}",
                    query.description
                ),
            },
        }
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            Self::CatalogLookup(_) => ToolKind::CatalogLookup,
            Self::SemanticSearch { .. } => ToolKind::SemanticSearch,
            Self::LanguageModelCall { .. } => ToolKind::LanguageModelCall,
        }
    }

    /// Short label for events and logs.
    pub fn label(&self) -> &str {
        match self {
            Self::CatalogLookup(query) => &query.description,
            Self::SemanticSearch { query } => query,
            Self::LanguageModelCall { prompt } => prompt,
        }
    }
}

/// What a tool call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Component { result: Arc<ComponentResult> },
    Passages { query: String, hits: Vec<SemanticHit> },
    Text { text: String },
}

impl Observation {
    /// Plain-text rendering for answer prompts and the deterministic answer.
    pub fn summary(&self) -> String {
        match self {
            Self::Component { result } => {
                let query = &result.query.description;
                match (&result.matched_item, &result.matched_operation) {
                    (Some(item), Some(op)) => {
                        let mut line = format!(
                            "'{}': {} - {} ({})",
                            query,
                            item.display_name,
                            op.display_name,
                            op.kind.as_str()
                        );
                        if !result.input_fields.is_empty() {
                            let fields: Vec<String> = result
                                .input_fields
                                .iter()
                                .map(|f| {
                                    let marker = if f.required { "required" } else { "optional" };
                                    format!("{} ({})", f.name, marker)
                                })
                                .collect();
                            line.push_str(&format!("; inputs: {}", fields.join(", ")));
                        }
                        line
                    }
                    (Some(item), None) => format!(
                        "'{}': the {} piece exists but no matching operation was found",
                        query, item.display_name
                    ),
                    _ if !result.suggestions.is_empty() => {
                        let hits: Vec<&str> =
                            result.suggestions.iter().map(|h| h.text.as_str()).collect();
                        format!("'{}': related documentation: {}", query, hits.join(" | "))
                    }
                    _ => format!("'{}': nothing found in the catalog", query),
                }
            }
            Self::Passages { query, hits } if hits.is_empty() => {
                format!("'{}': no documentation passages found", query)
            }
            Self::Passages { query, hits } => {
                let hits: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
                format!("'{}': {}", query, hits.join(" | "))
            }
            Self::Text { text } => text.clone(),
        }
    }
}

/// Runs tool calls against the collaborators.
#[derive(Clone)]
pub struct ToolExecutor {
    resolver: ComponentResolver,
    model: Arc<dyn LanguageModel>,
    model_timeout: Duration,
}

impl ToolExecutor {
    pub fn new(
        resolver: ComponentResolver,
        model: Arc<dyn LanguageModel>,
        model_timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            model,
            model_timeout,
        }
    }

    pub async fn execute(
        &self,
        call: &ToolCall,
        ctx: &RunContext,
    ) -> Result<Observation, CollaboratorError> {
        match call {
            ToolCall::CatalogLookup(query) => {
                let result = self.resolver.resolve_single(query, ctx).await?;
                Ok(Observation::Component { result })
            }
            ToolCall::SemanticSearch { query } => {
                let hits = self.resolver.semantic_call(query, ctx).await?;
                Ok(Observation::Passages {
                    query: query.clone(),
                    hits,
                })
            }
            ToolCall::LanguageModelCall { prompt } => {
                if ctx.is_cancelled() {
                    return Err(CollaboratorError::Cancelled { collaborator: "model" });
                }
                let text = guarded(
                    "model",
                    ctx.call_timeout(self.model_timeout),
                    &ctx.cancel,
                    self.model
                        .complete(prompt, ReasoningLevel::Low, Verbosity::Low),
                )
                .await?;
                Ok(Observation::Text { text })
            }
        }
    }
}
