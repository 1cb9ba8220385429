//! Run-scoped resolution cache
//!
//! One `RunCache` per request; nothing is shared across requests. Holds
//! - resolved `ComponentResult`s keyed by term, query kind and whether
//!   near matches are acceptable
//! - per-term single-flight memos for catalog and semantic calls
//! - the failed-lookup ledger and call counters
//!
//! Entries are only ever added during a run. Failures are never memoized.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::OnceCell;

use super::failure::FailureLedger;
use super::intent::{ComponentQuery, QueryKind};
use super::resolver::ComponentResult;
use crate::catalog::{CatalogHit, SemanticHit};
use crate::error::CollaboratorError;

/// Lowercase, whitespace-collapsed form used for every cache key.
pub fn normalize_term(term: &str) -> String {
    term.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Key for resolved results. Collaborator calls are memoized per term, but a
/// strict trigger query must not reuse what a looser query resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultKey {
    pub term: String,
    pub kind: QueryKind,
    pub accept_alternatives: bool,
}

impl ResultKey {
    pub fn for_query(query: &ComponentQuery) -> Self {
        Self {
            term: normalize_term(query.primary_term()),
            kind: query.kind,
            accept_alternatives: query.accept_alternatives,
        }
    }
}

type Memo<T> = DashMap<String, Arc<OnceCell<T>>>;

#[derive(Default)]
pub struct RunCache {
    results: DashMap<ResultKey, Arc<ComponentResult>>,
    catalog: Memo<Vec<CatalogHit>>,
    semantic: Memo<Vec<SemanticHit>>,
    failures: FailureLedger,
    stats: Counters,
}

#[derive(Default)]
struct Counters {
    catalog_calls: AtomicUsize,
    semantic_calls: AtomicUsize,
    timeouts: AtomicUsize,
    failures: AtomicUsize,
    cache_hits: AtomicUsize,
}

/// Snapshot of a run's collaborator traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    pub catalog_calls: usize,
    pub semantic_calls: usize,
    pub timeouts: usize,
    pub failures: usize,
    pub cache_hits: usize,
}

impl RunCache {
    pub fn new(max_failed_lookups_per_term: usize) -> Self {
        Self {
            failures: FailureLedger::new(max_failed_lookups_per_term),
            ..Default::default()
        }
    }

    pub fn result(&self, key: &ResultKey) -> Option<Arc<ComponentResult>> {
        let hit = self.results.get(key).map(|r| Arc::clone(&r));
        if hit.is_some() {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    /// Insert-if-absent; the first writer wins.
    pub fn store(&self, key: ResultKey, result: Arc<ComponentResult>) -> Arc<ComponentResult> {
        Arc::clone(&self.results.entry(key).or_insert(result))
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn failures(&self) -> &FailureLedger {
        &self.failures
    }

    /// Catalog lookup for `term`, issued at most once per run on success.
    pub(crate) async fn catalog_lookup<F, Fut>(
        &self,
        term: &str,
        call: F,
    ) -> Result<Vec<CatalogHit>, CollaboratorError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<CatalogHit>, CollaboratorError>>,
    {
        self.memoized(&self.catalog, &self.stats.catalog_calls, term, call)
            .await
    }

    /// Semantic search for `term`, issued at most once per run on success.
    pub(crate) async fn semantic_search<F, Fut>(
        &self,
        term: &str,
        call: F,
    ) -> Result<Vec<SemanticHit>, CollaboratorError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<SemanticHit>, CollaboratorError>>,
    {
        self.memoized(&self.semantic, &self.stats.semantic_calls, term, call)
            .await
    }

    async fn memoized<T, F, Fut>(
        &self,
        memo: &Memo<T>,
        calls: &AtomicUsize,
        term: &str,
        call: F,
    ) -> Result<T, CollaboratorError>
    where
        T: Clone,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CollaboratorError>>,
    {
        let key = normalize_term(term);
        let cell = Arc::clone(&memo.entry(key.clone()).or_default());

        if let Some(value) = cell.get() {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value.clone());
        }

        let res = cell
            .get_or_try_init(|| async move {
                calls.fetch_add(1, Ordering::Relaxed);
                call().await
            })
            .await
            .cloned();

        match &res {
            Ok(_) => self.failures.clear(&key),
            Err(CollaboratorError::Cancelled { .. }) => {}
            Err(err) => {
                if err.is_timeout() {
                    self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                }
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                if let Some(msg) = self.failures.record(&key, err) {
                    tracing::warn!(term = %key, "{}", msg);
                }
            }
        }
        res
    }

    pub fn stats(&self) -> ResolverStats {
        let load = |c: &AtomicUsize| c.load(Ordering::Relaxed);
        ResolverStats {
            catalog_calls: load(&self.stats.catalog_calls),
            semantic_calls: load(&self.stats.semantic_calls),
            timeouts: load(&self.stats.timeouts),
            failures: load(&self.stats.failures),
            cache_hits: load(&self.stats.cache_hits),
        }
    }
}
