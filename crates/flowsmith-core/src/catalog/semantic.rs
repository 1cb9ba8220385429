//! Semantic search adapters

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{SemanticHit, SemanticSearch};
use crate::error::CollaboratorError;

const COLLABORATOR: &str = "semantic";

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    k: usize,
}

/// Either a bare list or `{"results": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Hits(Vec<SemanticHit>),
    Wrapped { results: Vec<SemanticHit> },
}

/// `POST {endpoint}` with `{query, k}`, answered by `[{text, score}]`.
pub struct HttpSemanticSearch {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpSemanticSearch {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl SemanticSearch for HttpSemanticSearch {
    async fn search(&self, term: &str, k: usize) -> Result<Vec<SemanticHit>, CollaboratorError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&SearchRequest { query: term, k })
            .send()
            .await
            .map_err(|e| CollaboratorError::unavailable(COLLABORATOR, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::unavailable(
                COLLABORATOR,
                format!("HTTP {status}"),
            ));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::invalid(COLLABORATOR, e))?;
        let mut hits = match parsed {
            SearchResponse::Hits(hits) | SearchResponse::Wrapped { results: hits } => hits,
        };
        hits.truncate(k);
        Ok(hits)
    }
}

/// Used when no semantic index is configured.
pub struct DisabledSemanticSearch;

#[async_trait]
impl SemanticSearch for DisabledSemanticSearch {
    async fn search(&self, _term: &str, _k: usize) -> Result<Vec<SemanticHit>, CollaboratorError> {
        Ok(Vec::new())
    }
}
