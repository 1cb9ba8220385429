//! Guide synthesis for build mode.
//!
//! One structured prompt over the intent and every resolved component,
//! streamed through `StreamState`. A failed stream falls back once to a
//! blocking completion; text already streamed is never retracted.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use super::context::RunContext;
use super::intent::{Intent, QueryKind};
use super::resolver::{ComponentResult, Strategy};
use super::stream::StreamState;
use crate::ai::{LanguageModel, ReasoningConfig, ReasoningLevel, Verbosity};
use crate::catalog::InputField;
use crate::collaborators::guarded;
use crate::config::Settings;
use crate::constants::messages::LAST_RESORT;
use crate::error::{CollaboratorError, OrchestrationError};

/// The finished guide.
#[derive(Debug, Clone)]
pub struct Guide {
    pub markdown_text: String,
    pub char_count: usize,
    pub word_count: usize,
    pub component_results_used: Vec<Arc<ComponentResult>>,
    /// False when cancelled or out of time
    pub complete: bool,
}

#[derive(Debug, Clone)]
pub struct SynthesizerConfig {
    pub fast_mode: bool,
    pub model_timeout: Duration,
    pub emit_interval: Duration,
    pub idle_timeout: Duration,
}

impl SynthesizerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            fast_mode: settings.model.fast_mode,
            model_timeout: settings.limits.model_timeout(),
            emit_interval: settings.limits.stream_emit_interval(),
            idle_timeout: settings.limits.stream_idle_timeout(),
        }
    }
}

enum StreamEnd {
    Finished,
    Cancelled,
    OutOfTime,
    Failed(CollaboratorError),
}

pub struct GuideSynthesizer {
    model: Arc<dyn LanguageModel>,
    config: SynthesizerConfig,
}

impl GuideSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, config: SynthesizerConfig) -> Self {
        Self { model, config }
    }

    pub async fn synthesize(
        &self,
        request: &str,
        intent: &Intent,
        results: &[Arc<ComponentResult>],
        ctx: &RunContext,
    ) -> Result<Guide, OrchestrationError> {
        let prompt = build_prompt(request, intent, results);
        let (reasoning, verbosity) =
            ReasoningConfig::for_guide(self.config.fast_mode, intent.is_straightforward());
        let mut state = StreamState::new(self.config.emit_interval);

        match self
            .stream_into(&prompt, reasoning, verbosity, &mut state, ctx)
            .await
        {
            StreamEnd::Finished => {}
            StreamEnd::Cancelled | StreamEnd::OutOfTime => {
                tracing::info!(
                    run_id = %ctx.run_id,
                    chunks = state.chunk_count,
                    cancelled = ctx.is_cancelled(),
                    "Guide generation stopped early"
                );
                return Ok(finish(&mut state, results, false, ctx));
            }
            StreamEnd::Failed(err) => {
                tracing::warn!(
                    run_id = %ctx.run_id,
                    chunks = state.chunk_count,
                    error = %err,
                    "Guide stream failed, retrying without streaming"
                );
                if ctx.should_stop() {
                    return Ok(finish(&mut state, results, false, ctx));
                }
                self.fallback(&prompt, reasoning, verbosity, &mut state, ctx)
                    .await?;
            }
        }

        if !intent.open_questions.is_empty() {
            emit_push(&mut state, &clarifications(&intent.open_questions), ctx);
        }
        let guide = finish(&mut state, results, true, ctx);
        tracing::info!(
            run_id = %ctx.run_id,
            chars = guide.char_count,
            words = guide.word_count,
            elapsed_ms = state.elapsed().as_millis() as u64,
            "Guide generated"
        );
        Ok(guide)
    }

    async fn stream_into(
        &self,
        prompt: &str,
        reasoning: ReasoningLevel,
        verbosity: Verbosity,
        state: &mut StreamState,
        ctx: &RunContext,
    ) -> StreamEnd {
        let opened = guarded(
            "model",
            ctx.call_timeout(self.config.model_timeout),
            &ctx.cancel,
            self.model.stream(prompt, reasoning, verbosity),
        )
        .await;
        let mut deltas = match opened {
            Ok(deltas) => deltas,
            Err(CollaboratorError::Cancelled { .. }) => return StreamEnd::Cancelled,
            Err(e) => return StreamEnd::Failed(e),
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return StreamEnd::Cancelled,
                _ = tokio::time::sleep_until(ctx.deadline) => return StreamEnd::OutOfTime,
                next = tokio::time::timeout(self.config.idle_timeout, deltas.next()) => next,
            };
            match next {
                Err(_) => {
                    return StreamEnd::Failed(CollaboratorError::Timeout {
                        collaborator: "model",
                        after: self.config.idle_timeout,
                    })
                }
                Ok(None) => return StreamEnd::Finished,
                Ok(Some(Err(e))) => return StreamEnd::Failed(e),
                Ok(Some(Ok(chunk))) => {
                    // a chunk that arrives with the cancellation is dropped
                    if ctx.is_cancelled() {
                        return StreamEnd::Cancelled;
                    }
                    emit_push(state, &chunk, ctx);
                }
            }
        }
    }

    /// One blocking completion with the same prompt. Only text beyond what
    /// was already streamed is emitted.
    async fn fallback(
        &self,
        prompt: &str,
        reasoning: ReasoningLevel,
        verbosity: Verbosity,
        state: &mut StreamState,
        ctx: &RunContext,
    ) -> Result<(), OrchestrationError> {
        let reply = guarded(
            "model",
            ctx.call_timeout(self.config.model_timeout),
            &ctx.cancel,
            self.model.complete(prompt, reasoning, verbosity),
        )
        .await;

        match reply {
            Ok(text) => {
                let text = text.trim_end();
                let addition = if state.text_so_far.is_empty() {
                    text.to_string()
                } else if let Some(rest) = text.strip_prefix(state.text_so_far.as_str()) {
                    rest.to_string()
                } else {
                    format!("\n\n{}", text)
                };
                emit_push(state, &addition, ctx);
                Ok(())
            }
            Err(source) => {
                if !state.text_so_far.trim().is_empty() {
                    emit_push(state, &format!("\n\n{}", LAST_RESORT), ctx);
                }
                if let Some(update) = state.flush() {
                    ctx.emit(update);
                }
                tracing::error!(run_id = %ctx.run_id, error = %source, "Guide fallback failed");
                Err(OrchestrationError::SynthesisFailed {
                    partial: state.text_so_far.clone(),
                    source,
                })
            }
        }
    }
}

fn emit_push(state: &mut StreamState, text: &str, ctx: &RunContext) {
    if let Some(update) = state.push(text) {
        ctx.emit(update);
    }
}

fn finish(
    state: &mut StreamState,
    results: &[Arc<ComponentResult>],
    complete: bool,
    ctx: &RunContext,
) -> Guide {
    if let Some(update) = state.flush() {
        ctx.emit(update);
    }
    Guide {
        markdown_text: state.text_so_far.clone(),
        char_count: state.text_so_far.chars().count(),
        word_count: state.word_count(),
        component_results_used: results.to_vec(),
        complete,
    }
}

fn clarifications(questions: &[String]) -> String {
    let mut section = String::from(
        "\n\n## Optional clarifications\n\nAnswering these is optional, but would sharpen the flow:\n\n",
    );
    for question in questions {
        section.push_str(&format!("- {}\n", question));
    }
    section
}

const FOUNDATIONS: &str = "\
- Every flow starts with exactly one trigger; it decides when the flow runs.
- Actions follow the trigger and run in order; the flow ends after the last one.
- Routers branch the flow; each branch has filters (AND/OR groups) deciding when it runs.
- Loops repeat the steps inside them once per item of a list.
- Outputs of the trigger and earlier steps can be mapped into the inputs of later steps.
- Test the trigger and each action while building to confirm connections and mappings.
";

const OUTLINE: &str = "\
1. Flow overview: what the flow does
2. Prerequisites: accounts and connections needed
3. Trigger configuration: the exact trigger and every input
4. Action configuration: for each action, every required and optional input
5. Data mapping between steps
6. Testing and validation
7. Common issues and fixes
";

fn render_fields(fields: &[InputField], out: &mut String) {
    if fields.is_empty() {
        return;
    }
    out.push_str("  Inputs:\n");
    for field in fields {
        let needed = if field.required { "required" } else { "optional" };
        out.push_str(&format!("    - {} ({}, {})", field.name, field.field_type, needed));
        if !field.description.is_empty() {
            out.push_str(&format!(": {}", field.description));
        }
        if let Some(default) = &field.default {
            out.push_str(&format!(" [default: {}]", default));
        }
        out.push('\n');
    }
}

fn render_component(result: &ComponentResult, out: &mut String) {
    out.push_str(&format!(
        "\n→ {}\n  Status: {}\n",
        result.query.description,
        strategy_label(result.strategy)
    ));
    match (&result.matched_item, &result.matched_operation) {
        (Some(item), Some(op)) => {
            out.push_str(&format!(
                "  Use: {} - {} ({})\n",
                item.display_name,
                op.display_name,
                op.kind.as_str()
            ));
            if !op.description.is_empty() {
                out.push_str(&format!("  Description: {}\n", op.description));
            }
            render_fields(&result.input_fields, out);
        }
        (Some(item), None) => out.push_str(&format!(
            "  Closest piece: {} ({} operations); no exact operation matched, pick the closest one it offers\n",
            item.display_name, item.operation_count
        )),
        _ => {
            for hit in &result.suggestions {
                out.push_str(&format!("  Related: {}\n", hit.text));
            }
            out.push_str("  Fallback: the HTTP Request piece or a Code step\n");
        }
    }
}

fn strategy_label(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::Native => "native",
        Strategy::Alternative => "alternative",
        Strategy::SemanticSuggestion => "semantic suggestion (needs manual lookup)",
        Strategy::Unresolved => "unresolved (needs manual lookup)",
    }
}

pub(crate) fn build_prompt(
    request: &str,
    intent: &Intent,
    results: &[Arc<ComponentResult>],
) -> String {
    let mut prompt = String::from(
        "You are an expert workflow automation architect. Write a step-by-step guide for \
         building the flow below in a visual workflow automation platform, where flows are \
         made of pieces (integrations), each offering triggers and actions.\n\n",
    );

    prompt.push_str(&format!("Request: \"{}\"\n\n", request.trim()));
    prompt.push_str("Analysis:\n");
    prompt.push_str(&format!("- Goal: {}\n", intent.goal));
    prompt.push_str(&format!(
        "- Trigger: {}\n",
        intent.trigger_hint.as_deref().unwrap_or("unclear")
    ));
    if !intent.actions_needed.is_empty() {
        prompt.push_str(&format!("- Actions: {}\n", intent.actions_needed.join(", ")));
    }
    prompt.push_str(&format!("- Complexity: {}\n\n", intent.complexity.as_str()));

    prompt.push_str("Flow building foundations:\n");
    prompt.push_str(FOUNDATIONS);

    let (triggers, actions): (Vec<&Arc<ComponentResult>>, Vec<&Arc<ComponentResult>>) = results
        .iter()
        .partition(|r| r.query.kind == QueryKind::Trigger);

    prompt.push_str("\nTrigger:\n");
    if triggers.is_empty() {
        prompt.push_str("  No trigger identified; recommend one that fits the goal.\n");
    }
    for result in &triggers {
        render_component(result, &mut prompt);
    }

    if !actions.is_empty() {
        prompt.push_str("\nAction strategies:\n");
        for result in &actions {
            render_component(result, &mut prompt);
        }
    }

    let manual: Vec<&Arc<ComponentResult>> =
        results.iter().filter(|r| r.needs_manual_lookup()).collect();
    if !manual.is_empty() {
        prompt.push_str("\nNeeds manual lookup (not confirmed in the catalog):\n");
        for result in manual {
            prompt.push_str(&format!("- {}\n", result.query.description));
        }
    }

    if !intent.open_questions.is_empty() {
        prompt.push_str("\nOpen questions (the user may skip these; do not block on them):\n");
        for question in &intent.open_questions {
            prompt.push_str(&format!("- {}\n", question));
        }
    }

    prompt.push_str("\nThe guide must contain, in order:\n");
    prompt.push_str(OUTLINE);
    prompt.push_str(
        "\nRules: name pieces, triggers and actions exactly as confirmed above. List every \
         input of each confirmed operation. Mark anything under \"Needs manual lookup\" as \
         needing verification in the platform, and only suggest the HTTP Request piece or a \
         Code step when no native piece fits. Write clear markdown with headers and bullets.",
    );
    prompt
}
