//! Fake collaborators for tests
//!
//! Call counting, injectable delays and failures, and scripted model
//! streams.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::agent::cache::normalize_term;
use crate::agent::context::RunContext;
use crate::agent::events::ProgressEvent;
use crate::ai::{LanguageModel, ReasoningLevel, TextStream, Verbosity};
use crate::catalog::{
    CatalogHit, CatalogItem, CatalogLookup, InputField, Operation, OperationKind, SemanticHit,
    SemanticSearch,
};
use crate::collaborators::Collaborators;
use crate::error::CollaboratorError;

pub fn run_context() -> (RunContext, mpsc::UnboundedReceiver<ProgressEvent>) {
    run_context_with_budget(Duration::from_secs(60))
}

/// A run that must finish within `budget`.
pub fn run_context_with_budget(
    budget: Duration,
) -> (RunContext, mpsc::UnboundedReceiver<ProgressEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let ctx = RunContext::new(budget, 2, CancellationToken::new(), tx);
    (ctx, rx)
}

pub fn collaborators(
    catalog: Arc<FakeCatalog>,
    semantic: Arc<FakeSemantic>,
    model: Arc<FakeModel>,
) -> Collaborators {
    Collaborators::new(catalog, semantic, model)
}

/// Drain every event currently buffered in `rx`.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// A piece with one action and two input fields.
pub fn catalog_hit(piece: &str, operation: &str, operation_count: usize) -> CatalogHit {
    operation_hit(piece, operation, operation_count, OperationKind::Action)
}

/// A piece with one trigger and two input fields.
pub fn trigger_hit(piece: &str, operation: &str, operation_count: usize) -> CatalogHit {
    operation_hit(piece, operation, operation_count, OperationKind::Trigger)
}

fn operation_hit(
    piece: &str,
    operation: &str,
    operation_count: usize,
    kind: OperationKind,
) -> CatalogHit {
    CatalogHit {
        item: CatalogItem {
            id: piece.to_lowercase().replace(' ', "-"),
            name: piece.to_lowercase().replace(' ', "-"),
            display_name: piece.to_string(),
            operation_count,
        },
        operation: Some(Operation {
            name: operation.to_lowercase().replace(' ', "_"),
            display_name: operation.to_string(),
            kind,
            description: String::new(),
        }),
        input_fields: vec![
            InputField {
                name: "target".into(),
                field_type: "SHORT_TEXT".into(),
                required: true,
                description: "Where it goes".into(),
                default: None,
            },
            InputField {
                name: "note".into(),
                field_type: "LONG_TEXT".into(),
                required: false,
                description: String::new(),
                default: Some("n/a".into()),
            },
        ],
    }
}

/// A piece-level match without an operation.
pub fn item_hit(piece: &str, operation_count: usize) -> CatalogHit {
    CatalogHit {
        item: CatalogItem {
            id: piece.to_lowercase(),
            name: piece.to_lowercase(),
            display_name: piece.to_string(),
            operation_count,
        },
        operation: None,
        input_fields: Vec::new(),
    }
}

#[derive(Default)]
struct CallLog {
    per_term: Mutex<HashMap<String, usize>>,
}

impl CallLog {
    fn record(&self, term: &str) {
        if let Ok(mut map) = self.per_term.lock() {
            *map.entry(term.to_string()).or_insert(0) += 1;
        }
    }

    fn count(&self, term: &str) -> usize {
        self.per_term
            .lock()
            .map(|m| m.get(&normalize_term(term)).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

#[derive(Default)]
pub struct FakeCatalog {
    entries: HashMap<String, Vec<CatalogHit>>,
    delays: HashMap<String, Duration>,
    failing: HashSet<String>,
    pub calls: AtomicUsize,
    log: CallLog,
}

impl FakeCatalog {
    pub fn with(mut self, term: &str, hits: Vec<CatalogHit>) -> Self {
        self.entries.insert(normalize_term(term), hits);
        self
    }

    pub fn with_delay(mut self, term: &str, delay: Duration) -> Self {
        self.delays.insert(normalize_term(term), delay);
        self
    }

    pub fn failing(mut self, term: &str) -> Self {
        self.failing.insert(normalize_term(term));
        self
    }

    pub fn calls_for(&self, term: &str) -> usize {
        self.log.count(term)
    }
}

#[async_trait]
impl CatalogLookup for FakeCatalog {
    async fn find(&self, term: &str) -> Result<Vec<CatalogHit>, CollaboratorError> {
        let key = normalize_term(term);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.record(&key);

        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&key) {
            return Err(CollaboratorError::unavailable("catalog", "connection refused"));
        }
        Ok(self.entries.get(&key).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeSemantic {
    entries: HashMap<String, Vec<SemanticHit>>,
    failing: HashSet<String>,
    pub calls: AtomicUsize,
    log: CallLog,
}

impl FakeSemantic {
    pub fn with(mut self, term: &str, hits: Vec<(&str, f32)>) -> Self {
        let hits = hits
            .into_iter()
            .map(|(text, score)| SemanticHit {
                text: text.to_string(),
                score,
            })
            .collect();
        self.entries.insert(normalize_term(term), hits);
        self
    }

    pub fn failing(mut self, term: &str) -> Self {
        self.failing.insert(normalize_term(term));
        self
    }

    pub fn calls_for(&self, term: &str) -> usize {
        self.log.count(term)
    }
}

#[async_trait]
impl SemanticSearch for FakeSemantic {
    async fn search(&self, term: &str, k: usize) -> Result<Vec<SemanticHit>, CollaboratorError> {
        let key = normalize_term(term);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.record(&key);

        if self.failing.contains(&key) {
            return Err(CollaboratorError::unavailable("semantic", "index offline"));
        }
        let mut hits = self.entries.get(&key).cloned().unwrap_or_default();
        hits.truncate(k);
        Ok(hits)
    }
}

/// Scripted behaviour for one `stream` call.
#[derive(Clone, Default)]
pub struct StreamScript {
    chunks: Vec<String>,
    chunk_delay: Duration,
    fail_at: Option<usize>,
    stall_at: Option<usize>,
    cancel_at: Option<(usize, CancellationToken)>,
    refuse: bool,
}

impl StreamScript {
    pub fn chunks(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn refused() -> Self {
        Self {
            refuse: true,
            ..Default::default()
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Yield an error instead of chunk `index`.
    pub fn fail_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Never deliver chunk `index`.
    pub fn stall_at(mut self, index: usize) -> Self {
        self.stall_at = Some(index);
        self
    }

    /// Cancel `token` while producing chunk `index`.
    pub fn cancel_at(mut self, index: usize, token: CancellationToken) -> Self {
        self.cancel_at = Some((index, token));
        self
    }
}

#[derive(Default)]
pub struct FakeModel {
    completions: Mutex<VecDeque<Result<String, CollaboratorError>>>,
    stream_script: Mutex<Option<StreamScript>>,
    complete_delay: Option<Duration>,
    pub complete_calls: AtomicUsize,
    pub stream_calls: AtomicUsize,
    /// Chunks handed out across all streams
    pub chunks_pulled: Arc<AtomicUsize>,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeModel {
    /// Queue a successful `complete` reply.
    pub fn reply(self, text: &str) -> Self {
        if let Ok(mut q) = self.completions.lock() {
            q.push_back(Ok(text.to_string()));
        }
        self
    }

    /// Queue a failing `complete` call.
    pub fn fail(self) -> Self {
        if let Ok(mut q) = self.completions.lock() {
            q.push_back(Err(CollaboratorError::unavailable("model", "503 overloaded")));
        }
        self
    }

    pub fn complete_delay(mut self, delay: Duration) -> Self {
        self.complete_delay = Some(delay);
        self
    }

    pub fn streaming(self, script: StreamScript) -> Self {
        if let Ok(mut s) = self.stream_script.lock() {
            *s = Some(script);
        }
        self
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().ok().and_then(|p| p.last().cloned())
    }

    fn record_prompt(&self, prompt: &str) {
        if let Ok(mut p) = self.prompts.lock() {
            p.push(prompt.to_string());
        }
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn complete(
        &self,
        prompt: &str,
        _reasoning: ReasoningLevel,
        _verbosity: Verbosity,
    ) -> Result<String, CollaboratorError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        self.record_prompt(prompt);
        if let Some(delay) = self.complete_delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.completions.lock().ok().and_then(|mut q| q.pop_front());
        next.unwrap_or_else(|| Err(CollaboratorError::unavailable("model", "no scripted reply")))
    }

    async fn stream(
        &self,
        prompt: &str,
        _reasoning: ReasoningLevel,
        _verbosity: Verbosity,
    ) -> Result<TextStream, CollaboratorError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.record_prompt(prompt);

        let script = self
            .stream_script
            .lock()
            .ok()
            .and_then(|s| s.clone())
            .ok_or_else(|| CollaboratorError::unavailable("model", "no scripted stream"))?;
        if script.refuse {
            return Err(CollaboratorError::unavailable("model", "stream refused"));
        }

        let pulled = Arc::clone(&self.chunks_pulled);
        let StreamScript {
            chunks,
            chunk_delay,
            fail_at,
            stall_at,
            cancel_at,
            ..
        } = script;

        let deltas = stream::iter(chunks.into_iter().enumerate())
            .then(move |(index, chunk)| {
                let cancel_at = cancel_at.clone();
                let pulled = Arc::clone(&pulled);
                async move {
                    if !chunk_delay.is_zero() {
                        tokio::time::sleep(chunk_delay).await;
                    }
                    if stall_at == Some(index) {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                    }
                    if let Some((at, token)) = &cancel_at {
                        if *at == index {
                            token.cancel();
                        }
                    }
                    if fail_at == Some(index) {
                        return Err(CollaboratorError::unavailable("model", "connection reset"));
                    }
                    pulled.fetch_add(1, Ordering::SeqCst);
                    Ok(chunk)
                }
            })
            .boxed();
        Ok(deltas)
    }
}
