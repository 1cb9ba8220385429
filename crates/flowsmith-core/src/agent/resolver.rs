//! Component resolution
//!
//! Resolves a batch of `ComponentQuery`s against the catalog, falling back to
//! semantic search, on a fixed-size worker pool. One result per query, in
//! input order. A failing lookup only ever affects its own query.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::cache::{normalize_term, ResultKey};
use super::context::RunContext;
use super::events::ProgressEvent;
use super::intent::{ComponentQuery, QueryKind};
use crate::catalog::{
    rank_candidates, CatalogHit, CatalogItem, InputField, Operation, OperationKind, SemanticHit,
};
use crate::collaborators::{guarded, Collaborators};
use crate::config::Settings;
use crate::error::CollaboratorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Native,
    Alternative,
    SemanticSuggestion,
    Unresolved,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Alternative => "alternative",
            Self::SemanticSuggestion => "semantic_suggestion",
            Self::Unresolved => "unresolved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Catalog,
    Semantic,
    None,
}

/// Outcome of resolving one query.
///
/// `Native` always carries an item and an operation; `Unresolved` carries
/// neither and no input fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentResult {
    pub query: ComponentQuery,
    pub matched_item: Option<CatalogItem>,
    pub matched_operation: Option<Operation>,
    pub input_fields: Vec<InputField>,
    pub strategy: Strategy,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<SemanticHit>,
}

impl ComponentResult {
    pub fn unresolved(query: ComponentQuery) -> Self {
        Self {
            query,
            matched_item: None,
            matched_operation: None,
            input_fields: Vec::new(),
            strategy: Strategy::Unresolved,
            source: Source::None,
            suggestions: Vec::new(),
        }
    }

    fn from_catalog(query: ComponentQuery, hit: CatalogHit, strategy: Strategy) -> Self {
        Self {
            query,
            matched_item: Some(hit.item),
            matched_operation: hit.operation,
            input_fields: hit.input_fields,
            strategy,
            source: Source::Catalog,
            suggestions: Vec::new(),
        }
    }

    fn from_semantic(query: ComponentQuery, suggestions: Vec<SemanticHit>) -> Self {
        Self {
            query,
            matched_item: None,
            matched_operation: None,
            input_fields: Vec::new(),
            strategy: Strategy::SemanticSuggestion,
            source: Source::Semantic,
            suggestions,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.strategy != Strategy::Unresolved
    }

    /// Without a concrete catalog operation the user has to look it up.
    pub fn needs_manual_lookup(&self) -> bool {
        matches!(
            self.strategy,
            Strategy::SemanticSuggestion | Strategy::Unresolved
        )
    }
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub pool_size: usize,
    pub collaborator_timeout: Duration,
    pub semantic_top_k: usize,
}

impl ResolverConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            pool_size: settings.limits.worker_pool_size.max(1),
            collaborator_timeout: settings.limits.collaborator_timeout(),
            semantic_top_k: settings.semantic.top_k.max(1),
        }
    }
}

#[derive(Clone)]
pub struct ComponentResolver {
    collaborators: Collaborators,
    config: ResolverConfig,
}

enum Slot {
    Pending,
    Done(Arc<ComponentResult>),
    /// Same result key as an earlier query in the batch
    SameAs(usize),
}

impl ComponentResolver {
    pub fn new(collaborators: Collaborators, config: ResolverConfig) -> Self {
        Self {
            collaborators,
            config,
        }
    }

    /// Resolve `queries`, returning exactly one result per query in input
    /// order, regardless of the order lookups complete in.
    pub async fn resolve(
        &self,
        queries: &[ComponentQuery],
        ctx: &RunContext,
    ) -> Vec<Arc<ComponentResult>> {
        let started = Instant::now();
        let mut slots: Vec<Slot> = Vec::with_capacity(queries.len());
        let mut first_for_key: Vec<(ResultKey, usize)> = Vec::new();
        let semaphore = Arc::new(Semaphore::new(self.config.pool_size));
        let mut workers = JoinSet::new();

        for (index, query) in queries.iter().enumerate() {
            let key = ResultKey::for_query(query);

            if let Some(cached) = ctx.cache.result(&key) {
                let result = for_query(cached, query);
                emit_resolved(ctx, &result);
                slots.push(Slot::Done(result));
                continue;
            }
            if let Some((_, first)) = first_for_key.iter().find(|(k, _)| *k == key) {
                slots.push(Slot::SameAs(*first));
                continue;
            }
            first_for_key.push((key.clone(), index));
            slots.push(Slot::Pending);

            let worker = self.clone();
            let query = query.clone();
            let ctx = ctx.clone();
            let semaphore = Arc::clone(&semaphore);
            workers.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => worker.resolve_one(query, &ctx).await,
                    Err(_) => ComponentResult::unresolved(query),
                };
                let mut result = Arc::new(result);
                if result.is_resolved() {
                    result = ctx.cache.store(key, result);
                }
                emit_resolved(&ctx, &result);
                (index, result)
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Slot::Done(result),
                Err(e) => tracing::error!(run_id = %ctx.run_id, "Resolver worker failed: {}", e),
            }
        }

        let mut results: Vec<Arc<ComponentResult>> = Vec::with_capacity(queries.len());
        for (index, query) in queries.iter().enumerate() {
            let result = match &slots[index] {
                Slot::Done(result) => Arc::clone(result),
                Slot::SameAs(first) => {
                    let result = for_query(Arc::clone(&results[*first]), query);
                    emit_resolved(ctx, &result);
                    result
                }
                Slot::Pending => Arc::new(ComponentResult::unresolved(query.clone())),
            };
            results.push(result);
        }

        let stats = ctx.cache.stats();
        tracing::info!(
            run_id = %ctx.run_id,
            queries = queries.len(),
            resolved = results.iter().filter(|r| r.is_resolved()).count(),
            catalog_calls = stats.catalog_calls,
            semantic_calls = stats.semantic_calls,
            timeouts = stats.timeouts,
            cache_hits = stats.cache_hits,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Components resolved"
        );
        results
    }

    /// Resolve one query for a caller that wants to see collaborator
    /// failures (the agent loop's catalog tool). Successes are cached and
    /// announced like batch results.
    pub async fn resolve_single(
        &self,
        query: &ComponentQuery,
        ctx: &RunContext,
    ) -> Result<Arc<ComponentResult>, CollaboratorError> {
        let key = ResultKey::for_query(query);
        if let Some(cached) = ctx.cache.result(&key) {
            let result = for_query(cached, query);
            emit_resolved(ctx, &result);
            return Ok(result);
        }

        let mut result = Arc::new(self.try_resolve(query, ctx).await?);
        if result.is_resolved() {
            result = ctx.cache.store(key, result);
        }
        emit_resolved(ctx, &result);
        Ok(result)
    }

    async fn resolve_one(&self, query: ComponentQuery, ctx: &RunContext) -> ComponentResult {
        let started = Instant::now();
        let result = match self.try_resolve(&query, ctx).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(
                    run_id = %ctx.run_id,
                    query = %query.description,
                    error = %err,
                    "Lookup failed, component unresolved"
                );
                ComponentResult::unresolved(query)
            }
        };

        tracing::debug!(
            run_id = %ctx.run_id,
            query = %result.query.description,
            strategy = ?result.strategy,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Component resolved"
        );
        result
    }

    async fn try_resolve(
        &self,
        query: &ComponentQuery,
        ctx: &RunContext,
    ) -> Result<ComponentResult, CollaboratorError> {
        let term = normalize_term(query.primary_term());
        if ctx.cache.failures().is_exhausted(&term) {
            return Err(CollaboratorError::unavailable(
                "catalog",
                format!("'{term}' failed repeatedly this run, not retried"),
            ));
        }
        Ok(self
            .lookup(query, ctx)
            .await?
            .unwrap_or_else(|| ComponentResult::unresolved(query.clone())))
    }

    /// Catalog first, each search term in order until one returns
    /// candidates; semantic search only when the catalog gave nothing
    /// usable. Any collaborator failure is returned as an error.
    async fn lookup(
        &self,
        query: &ComponentQuery,
        ctx: &RunContext,
    ) -> Result<Option<ComponentResult>, CollaboratorError> {
        for term in &query.search_terms {
            let hits = self.catalog_call(term, ctx).await?;
            if hits.is_empty() {
                continue;
            }

            let ranked = rank_candidates(term, hits);
            if let Some(hit) = ranked.iter().find(|h| operation_fits(query.kind, h)) {
                return Ok(Some(ComponentResult::from_catalog(
                    query.clone(),
                    hit.clone(),
                    Strategy::Native,
                )));
            }
            if query.accept_alternatives {
                if let Some(hit) = ranked.into_iter().next() {
                    return Ok(Some(ComponentResult::from_catalog(
                        query.clone(),
                        piece_only(hit),
                        Strategy::Alternative,
                    )));
                }
            }
            break;
        }

        let suggestions = self.semantic_call(query.primary_term(), ctx).await?;
        if suggestions.is_empty() {
            return Ok(None);
        }
        Ok(Some(ComponentResult::from_semantic(query.clone(), suggestions)))
    }

    pub(crate) async fn catalog_call(
        &self,
        term: &str,
        ctx: &RunContext,
    ) -> Result<Vec<CatalogHit>, CollaboratorError> {
        checkpoint(ctx, "catalog")?;
        let catalog = Arc::clone(&self.collaborators.catalog);
        let timeout = ctx.call_timeout(self.config.collaborator_timeout);
        ctx.cache
            .catalog_lookup(term, || async move {
                guarded("catalog", timeout, &ctx.cancel, catalog.find(term)).await
            })
            .await
    }

    pub(crate) async fn semantic_call(
        &self,
        term: &str,
        ctx: &RunContext,
    ) -> Result<Vec<SemanticHit>, CollaboratorError> {
        checkpoint(ctx, "semantic")?;
        let semantic = Arc::clone(&self.collaborators.semantic);
        let timeout = ctx.call_timeout(self.config.collaborator_timeout);
        let k = self.config.semantic_top_k;
        ctx.cache
            .semantic_search(term, || async move {
                guarded("semantic", timeout, &ctx.cancel, semantic.search(term, k)).await
            })
            .await
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }
}

/// Triggers only match catalog triggers and actions only catalog actions;
/// a topic takes any operation.
fn operation_fits(kind: QueryKind, hit: &CatalogHit) -> bool {
    match (&hit.operation, kind) {
        (None, _) => false,
        (Some(_), QueryKind::Topic) => true,
        (Some(op), QueryKind::Trigger) => op.kind == OperationKind::Trigger,
        (Some(op), QueryKind::Action) => op.kind == OperationKind::Action,
    }
}

/// The piece of a near match, without an operation of the wrong kind.
fn piece_only(hit: CatalogHit) -> CatalogHit {
    CatalogHit {
        item: hit.item,
        operation: None,
        input_fields: Vec::new(),
    }
}

/// Refuse to start a call once the run is cancelled or out of time.
fn checkpoint(ctx: &RunContext, collaborator: &'static str) -> Result<(), CollaboratorError> {
    if ctx.is_cancelled() {
        return Err(CollaboratorError::Cancelled { collaborator });
    }
    if ctx.deadline_passed() {
        return Err(CollaboratorError::Timeout {
            collaborator,
            after: Duration::ZERO,
        });
    }
    Ok(())
}

/// Reuse a result for another query with the same key, keeping that
/// query's own description.
fn for_query(result: Arc<ComponentResult>, query: &ComponentQuery) -> Arc<ComponentResult> {
    if result.query == *query {
        return result;
    }
    Arc::new(ComponentResult {
        query: query.clone(),
        ..(*result).clone()
    })
}

fn emit_resolved(ctx: &RunContext, result: &ComponentResult) {
    ctx.emit(ProgressEvent::ComponentResolved {
        query: result.query.description.clone(),
        kind: result.query.kind,
        strategy: result.strategy,
        source: result.source,
    });
}
