//! Orchestrator: one request from raw text to a terminal `Done` event.
//!
//! ```text
//!              ┌──────────┐   Intent   ┌───────────────┐
//!  request ──► │ Analyzer │ ─────────► │ ask: plan+loop │ ──┐
//!              └──────────┘            │ build: resolve │   │ ProgressEvent
//!                                      │   + synthesize │   ▼
//!                                      └───────────────┘  consumer (CLI, server)
//! ```
//!
//! Consumers call `run()` and read events until `Done`. Local failures are
//! absorbed and annotated; only whole-pipeline failures become `Error`
//! events.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::agent_loop::AgentLoop;
use super::analyzer::RequestAnalyzer;
use super::context::RunContext;
use super::events::{Mode, ProgressEvent};
use super::intent::{ConversationTurn, Intent};
use super::resolver::{ComponentResolver, ResolverConfig};
use super::synthesizer::{GuideSynthesizer, SynthesizerConfig};
use super::tools::ToolExecutor;
use crate::collaborators::Collaborators;
use crate::config::Settings;
use crate::constants::messages::LAST_RESORT;
use crate::error::{ErrorKind, OrchestrationError};

#[derive(Clone)]
pub struct Orchestrator {
    collaborators: Collaborators,
    settings: Arc<Settings>,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators, settings: Settings) -> Self {
        Self {
            collaborators,
            settings: Arc::new(settings),
        }
    }

    /// Start a run. Events arrive on the returned receiver; the last one is
    /// always `Done`. Cancelling `cancel` ends the run at the next
    /// checkpoint with whatever it has.
    pub fn run(
        &self,
        mode: Mode,
        request: String,
        history: Vec<ConversationTurn>,
        cancel: CancellationToken,
    ) -> (mpsc::UnboundedReceiver<ProgressEvent>, JoinHandle<()>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let ctx = RunContext::new(
            self.settings.limits.request_timeout(),
            self.settings.limits.max_failed_lookups_per_term,
            cancel,
            event_tx,
        );

        let this = self.clone();
        let handle = tokio::spawn(async move {
            this.run_inner(mode, &request, &history, &ctx).await;
        });
        (event_rx, handle)
    }

    async fn run_inner(
        &self,
        mode: Mode,
        request: &str,
        history: &[ConversationTurn],
        ctx: &RunContext,
    ) {
        let started = tokio::time::Instant::now();
        ctx.emit(ProgressEvent::AnalysisStarted {
            run_id: ctx.run_id.clone(),
            mode,
        });
        tracing::info!(run_id = %ctx.run_id, mode = ?mode, "Run started");

        if request.trim().is_empty() {
            ctx.emit(ProgressEvent::Error {
                kind: ErrorKind::AnalysisFailed,
                message: "The request is empty.".to_string(),
            });
            ctx.emit(ProgressEvent::Done {
                final_text: String::new(),
                complete: false,
            });
            return;
        }

        let limits = &self.settings.limits;
        let analyzer = RequestAnalyzer::new(
            Arc::clone(&self.collaborators.model),
            self.settings.model.fast_mode,
            limits.history_turns,
            limits.model_timeout(),
        );
        let intent = match analyzer.analyze(request, history, ctx).await {
            Ok(intent) => intent,
            Err(e) => {
                tracing::warn!(
                    run_id = %ctx.run_id,
                    error = %e,
                    "Analysis failed, using the request as-is"
                );
                Intent::fallback(request)
            }
        };

        let resolver = ComponentResolver::new(
            self.collaborators.clone(),
            ResolverConfig::from_settings(&self.settings),
        );
        let (final_text, complete) = match mode {
            Mode::Ask => self.ask(request, &intent, resolver, ctx).await,
            Mode::Build => self.build(request, &intent, resolver, ctx).await,
        };

        let stats = ctx.cache.stats();
        tracing::info!(
            run_id = %ctx.run_id,
            complete,
            chars = final_text.chars().count(),
            catalog_calls = stats.catalog_calls,
            semantic_calls = stats.semantic_calls,
            timeouts = stats.timeouts,
            failures = stats.failures,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Run finished"
        );
        ctx.emit(ProgressEvent::Done {
            final_text,
            complete,
        });
    }

    async fn ask(
        &self,
        request: &str,
        intent: &Intent,
        resolver: ComponentResolver,
        ctx: &RunContext,
    ) -> (String, bool) {
        let limits = &self.settings.limits;
        let executor = ToolExecutor::new(
            resolver,
            Arc::clone(&self.collaborators.model),
            limits.model_timeout(),
        );
        let agent = AgentLoop::new(
            executor,
            Arc::clone(&self.collaborators.model),
            limits.iteration_ceiling,
            limits.model_timeout(),
            self.settings.model.fast_mode,
        );

        let answer = agent.run(request, intent, ctx).await;
        tracing::debug!(
            run_id = %ctx.run_id,
            tool_calls = answer.tool_calls_used,
            iterations = answer.iterations,
            exhausted = answer.exhausted,
            "Answer ready"
        );
        (answer.text, answer.complete)
    }

    async fn build(
        &self,
        request: &str,
        intent: &Intent,
        resolver: ComponentResolver,
        ctx: &RunContext,
    ) -> (String, bool) {
        let results = resolver.resolve(&intent.queries(), ctx).await;
        let synthesizer = GuideSynthesizer::new(
            Arc::clone(&self.collaborators.model),
            SynthesizerConfig::from_settings(&self.settings),
        );

        match synthesizer.synthesize(request, intent, &results, ctx).await {
            Ok(guide) => (guide.markdown_text, guide.complete),
            Err(OrchestrationError::SynthesisFailed { partial, .. }) if !partial.is_empty() => {
                (partial, false)
            }
            Err(e) => {
                ctx.emit(ProgressEvent::Error {
                    kind: e.kind(),
                    message: format!("{}. {}", e, LAST_RESORT),
                });
                (String::new(), false)
            }
        }
    }
}
