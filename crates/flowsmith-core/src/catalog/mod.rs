//! Knowledge collaborators
//!
//! Contracts for the catalog store and the semantic index, plus thin adapters:
//! - `SqliteCatalog` - read-only reader over an existing pieces database
//! - `HttpSemanticSearch` / `DisabledSemanticSearch` - similarity search

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;

mod semantic;
mod sqlite;

pub use semantic::{DisabledSemanticSearch, HttpSemanticSearch};
pub use sqlite::SqliteCatalog;

/// An integration ("piece") in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    pub display_name: String,
    /// Number of actions plus triggers the piece exposes
    pub operation_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Action,
    Trigger,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Action => "action",
            Self::Trigger => "trigger",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    pub display_name: String,
    pub kind: OperationKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// One catalog candidate. `operation` is absent for a piece-level match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogHit {
    pub item: CatalogItem,
    pub operation: Option<Operation>,
    pub input_fields: Vec<InputField>,
}

impl CatalogHit {
    fn names_match(&self, term: &str) -> bool {
        let term = term.trim();
        let eq = |s: &str| s.eq_ignore_ascii_case(term);
        eq(&self.item.name)
            || eq(&self.item.display_name)
            || self
                .operation
                .as_ref()
                .is_some_and(|op| eq(&op.name) || eq(&op.display_name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticHit {
    pub text: String,
    pub score: f32,
}

#[async_trait]
pub trait CatalogLookup: Send + Sync {
    /// Candidates for `term`; empty means no match.
    async fn find(&self, term: &str) -> Result<Vec<CatalogHit>, CollaboratorError>;
}

#[async_trait]
pub trait SemanticSearch: Send + Sync {
    /// Best-effort ranked hits; empty on no match.
    async fn search(&self, term: &str, k: usize) -> Result<Vec<SemanticHit>, CollaboratorError>;
}

/// Order candidates: exact case-insensitive name match first, then the item
/// with the most operations, then display name.
pub fn rank_candidates(term: &str, mut hits: Vec<CatalogHit>) -> Vec<CatalogHit> {
    hits.sort_by(|a, b| compare_candidates(term, a, b));
    hits
}

fn compare_candidates(term: &str, a: &CatalogHit, b: &CatalogHit) -> Ordering {
    b.names_match(term)
        .cmp(&a.names_match(term))
        .then_with(|| b.item.operation_count.cmp(&a.item.operation_count))
        .then_with(|| a.item.display_name.cmp(&b.item.display_name))
        .then_with(|| {
            let name = |h: &CatalogHit| h.operation.as_ref().map(|o| o.display_name.clone());
            name(a).cmp(&name(b))
        })
}
