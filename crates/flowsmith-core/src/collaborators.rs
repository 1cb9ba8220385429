//! Collaborator handle
//!
//! Built once at startup and passed explicitly to every pipeline stage.
//! Tests construct it from fakes.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::ai::{LanguageModel, ResponsesClient, ResponsesClientConfig};
use crate::catalog::{
    CatalogLookup, DisabledSemanticSearch, HttpSemanticSearch, SemanticSearch, SqliteCatalog,
};
use crate::config::Settings;
use crate::error::CollaboratorError;

#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn CatalogLookup>,
    pub semantic: Arc<dyn SemanticSearch>,
    pub model: Arc<dyn LanguageModel>,
}

impl Collaborators {
    pub fn new(
        catalog: Arc<dyn CatalogLookup>,
        semantic: Arc<dyn SemanticSearch>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            catalog,
            semantic,
            model,
        }
    }

    /// Build the production adapters from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let catalog = SqliteCatalog::open(&settings.catalog.db_path).context(
            "Catalog database unavailable (set [catalog].db_path or FLOWSMITH_CATALOG_DB)",
        )?;

        let semantic: Arc<dyn SemanticSearch> = match &settings.semantic.endpoint {
            Some(endpoint) => Arc::new(HttpSemanticSearch::new(endpoint.clone())?),
            None => {
                tracing::info!("No semantic endpoint configured, semantic search disabled");
                Arc::new(DisabledSemanticSearch)
            }
        };

        let model = ResponsesClient::new(ResponsesClientConfig::from_settings(
            &settings.model,
            settings.api_key(),
        ))?;

        Ok(Self::new(Arc::new(catalog), semantic, Arc::new(model)))
    }
}

/// Run one collaborator call under its own timeout, abandoning it if the
/// run is cancelled first.
pub(crate) async fn guarded<T, F>(
    collaborator: &'static str,
    after: Duration,
    cancel: &CancellationToken,
    call: F,
) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CollaboratorError::Cancelled { collaborator }),
        res = tokio::time::timeout(after, call) => match res {
            Ok(inner) => inner,
            Err(_) => Err(CollaboratorError::Timeout { collaborator, after }),
        },
    }
}
