//! Bounded agent loop for ask mode.
//!
//! ```text
//!  Planning ──► Acting ──► Observing ──┐
//!                 ▲                    │ criterion met / retry
//!                 └────────────────────┘
//!                 │ stop, budget, ceiling, deadline, cancel, tool failure
//!                 ▼
//!             Responding ──► Done
//! ```
//!
//! Tool calls never exceed the plan's `max_tool_calls`; the iteration
//! ceiling and the run deadline are independent safety nets.

use std::sync::Arc;
use std::time::Duration;

use super::context::RunContext;
use super::events::ProgressEvent;
use super::intent::Intent;
use super::planner::{generate_plan, Plan, StepStatus};
use super::tools::{Observation, ToolExecutor};
use crate::ai::{LanguageModel, ReasoningConfig};
use crate::collaborators::guarded;
use crate::constants::messages::LAST_RESORT;
use crate::error::CollaboratorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Planning,
    Acting,
    Observing,
    Responding,
    Done,
}

/// What the loop produced.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub tool_calls_used: usize,
    pub iterations: usize,
    /// The budget or a safety net ended acting before the plan finished
    pub exhausted: bool,
    /// False when cancelled or out of time
    pub complete: bool,
    pub observations: Vec<Observation>,
}

pub struct AgentLoop {
    executor: ToolExecutor,
    model: Arc<dyn LanguageModel>,
    iteration_ceiling: usize,
    model_timeout: Duration,
    fast_mode: bool,
}

/// Mutable bookkeeping for one run.
struct Progress {
    plan: Plan,
    statuses: Vec<StepStatus>,
    step: usize,
    attempt: usize,
    tool_calls: usize,
    iterations: usize,
    exhausted: bool,
    interrupted: bool,
    guidance: Option<String>,
    observations: Vec<Observation>,
    pending: Option<Result<Observation, CollaboratorError>>,
}

impl AgentLoop {
    pub fn new(
        executor: ToolExecutor,
        model: Arc<dyn LanguageModel>,
        iteration_ceiling: usize,
        model_timeout: Duration,
        fast_mode: bool,
    ) -> Self {
        Self {
            executor,
            model,
            iteration_ceiling: iteration_ceiling.max(1),
            model_timeout,
            fast_mode,
        }
    }

    pub async fn run(&self, request: &str, intent: &Intent, ctx: &RunContext) -> Answer {
        self.run_with_plan(request, intent, None, ctx).await
    }

    /// Run with a ready-made plan instead of generating one. A defective
    /// plan is replaced by a single generic attempt.
    pub async fn run_with_plan(
        &self,
        request: &str,
        intent: &Intent,
        plan: Option<Plan>,
        ctx: &RunContext,
    ) -> Answer {
        let mut state = LoopState::Planning;
        let mut progress: Option<Progress> = None;
        let mut plan = plan;
        let mut text = String::new();

        loop {
            match state {
                LoopState::Planning => {
                    let mut chosen = plan.take().unwrap_or_else(|| generate_plan(request, intent));
                    if !chosen.is_valid() {
                        tracing::warn!(
                            run_id = %ctx.run_id,
                            max_tool_calls = chosen.max_tool_calls,
                            attempts = chosen.total_attempts(),
                            "Defective plan, using a single generic attempt"
                        );
                        chosen = Plan::generic(intent);
                    }
                    ctx.emit(ProgressEvent::PlanReady {
                        steps: chosen.steps.len(),
                        max_tool_calls: chosen.max_tool_calls,
                    });
                    tracing::info!(
                        run_id = %ctx.run_id,
                        steps = chosen.steps.len(),
                        max_tool_calls = chosen.max_tool_calls,
                        "Plan ready"
                    );
                    progress = Some(Progress::new(chosen));
                    state = LoopState::Acting;
                }
                LoopState::Acting => {
                    let Some(p) = progress.as_mut() else {
                        state = LoopState::Responding;
                        continue;
                    };
                    state = self.act(p, ctx).await;
                }
                LoopState::Observing => {
                    let Some(p) = progress.as_mut() else {
                        state = LoopState::Responding;
                        continue;
                    };
                    state = observe(p, ctx);
                }
                LoopState::Responding => {
                    text = match progress.as_mut() {
                        Some(p) => {
                            if ctx.should_stop() {
                                p.interrupted = true;
                            }
                            self.respond(request, p, ctx).await
                        }
                        None => LAST_RESORT.to_string(),
                    };
                    state = LoopState::Done;
                }
                LoopState::Done => break,
            }
        }

        match progress {
            Some(p) => Answer {
                text,
                tool_calls_used: p.tool_calls,
                iterations: p.iterations,
                exhausted: p.exhausted,
                complete: !p.interrupted,
                observations: p.observations,
            },
            None => Answer {
                text,
                tool_calls_used: 0,
                iterations: 0,
                exhausted: true,
                complete: false,
                observations: Vec::new(),
            },
        }
    }

    async fn act(&self, p: &mut Progress, ctx: &RunContext) -> LoopState {
        p.iterations += 1;

        if ctx.should_stop() {
            tracing::info!(
                run_id = %ctx.run_id,
                cancelled = ctx.is_cancelled(),
                "Run stopped before the plan finished"
            );
            p.exhausted = true;
            p.interrupted = true;
            return LoopState::Responding;
        }
        if p.iterations > self.iteration_ceiling {
            tracing::warn!(
                run_id = %ctx.run_id,
                ceiling = self.iteration_ceiling,
                "Iteration ceiling reached"
            );
            p.exhausted = true;
            p.guidance = Some(p.plan.fallback_strategy.clone());
            return LoopState::Responding;
        }
        if p.plan.stopping_condition.holds(&p.statuses) {
            return LoopState::Responding;
        }

        let Some(step) = p.plan.steps.get(p.step) else {
            if p.statuses.contains(&StepStatus::Unsatisfied) {
                p.guidance = Some(p.plan.fallback_strategy.clone());
            }
            return LoopState::Responding;
        };
        if p.tool_calls >= p.plan.max_tool_calls {
            tracing::info!(
                run_id = %ctx.run_id,
                max_tool_calls = p.plan.max_tool_calls,
                "Tool budget spent"
            );
            p.exhausted = true;
            p.guidance = Some(p.plan.fallback_strategy.clone());
            return LoopState::Responding;
        }
        let Some(call) = step.call(p.attempt) else {
            p.statuses[p.step] = StepStatus::Unsatisfied;
            p.advance();
            return LoopState::Acting;
        };

        ctx.emit(ProgressEvent::ToolCall {
            tool: call.kind(),
            query: call.label().to_string(),
        });
        p.tool_calls += 1;
        p.pending = Some(self.executor.execute(&call, ctx).await);
        LoopState::Observing
    }

    async fn respond(&self, request: &str, p: &Progress, ctx: &RunContext) -> String {
        if ctx.should_stop() {
            return deterministic_answer(p);
        }

        let prompt = answer_prompt(request, p);
        let (reasoning, verbosity) = ReasoningConfig::for_answer(self.fast_mode);
        let reply = guarded(
            "model",
            ctx.call_timeout(self.model_timeout),
            &ctx.cancel,
            self.model.complete(&prompt, reasoning, verbosity),
        )
        .await;

        match reply {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => deterministic_answer(p),
            Err(e) => {
                tracing::warn!(run_id = %ctx.run_id, error = %e, "Answer generation failed, using findings");
                deterministic_answer(p)
            }
        }
    }
}

impl Progress {
    fn new(plan: Plan) -> Self {
        Self {
            statuses: vec![StepStatus::Pending; plan.steps.len()],
            plan,
            step: 0,
            attempt: 0,
            tool_calls: 0,
            iterations: 0,
            exhausted: false,
            interrupted: false,
            guidance: None,
            observations: Vec::new(),
            pending: None,
        }
    }

    fn advance(&mut self) {
        self.step += 1;
        self.attempt = 0;
    }
}

fn observe(p: &mut Progress, ctx: &RunContext) -> LoopState {
    let Some(outcome) = p.pending.take() else {
        return LoopState::Acting;
    };
    let Some(step) = p.plan.steps.get(p.step) else {
        return LoopState::Responding;
    };

    match outcome {
        Ok(observation) => {
            let met = step.success_criterion.is_met(&observation);
            p.observations.push(observation);
            if met {
                p.statuses[p.step] = StepStatus::Satisfied;
                p.advance();
            } else if step.call(p.attempt + 1).is_some() {
                p.attempt += 1;
            } else {
                p.statuses[p.step] = StepStatus::Unsatisfied;
                p.advance();
            }
            LoopState::Acting
        }
        Err(e) => {
            tracing::warn!(
                run_id = %ctx.run_id,
                step = p.step + 1,
                error = %e,
                "Tool call failed, falling back"
            );
            if matches!(e, CollaboratorError::Cancelled { .. }) {
                p.interrupted = true;
            }
            p.statuses[p.step] = StepStatus::Unsatisfied;
            p.guidance = Some(p.plan.fallback_strategy.clone());
            LoopState::Responding
        }
    }
}

fn findings(p: &Progress) -> String {
    if p.observations.is_empty() {
        return "- nothing was found\n".to_string();
    }
    p.observations
        .iter()
        .map(|o| format!("- {}\n", o.summary()))
        .collect()
}

fn answer_prompt(request: &str, p: &Progress) -> String {
    let mut prompt = String::from(
        "You answer questions about a workflow automation platform and its catalog of \
         integrations (pieces), their triggers, actions and input fields.\n\n",
    );
    prompt.push_str(&format!("Question: \"{}\"\n\n", request.trim()));
    prompt.push_str(&p.plan.render());
    prompt.push_str("\nFindings:\n");
    prompt.push_str(&findings(p));
    if let Some(guidance) = &p.guidance {
        prompt.push_str(&format!("\nNot every planned lookup succeeded. {}\n", guidance));
    }
    prompt.push_str(
        "\nAnswer using only the findings. Name pieces and operations exactly as listed. \
         If something could not be verified, say so plainly.",
    );
    prompt
}

/// Answer without the model: the findings plus the last-resort note.
fn deterministic_answer(p: &Progress) -> String {
    let mut text = String::new();
    if !p.observations.is_empty() {
        text.push_str("Here is what the catalog lookups found:\n\n");
        text.push_str(&findings(p));
        text.push('\n');
    }
    text.push_str(LAST_RESORT);
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::intent::{Complexity, ComponentQuery, Confidence};
    use crate::agent::planner::{PlanStep, StoppingCondition, SuccessCriterion};
    use crate::agent::resolver::{ComponentResolver, ResolverConfig};
    use crate::agent::tools::ToolKind;
    use crate::test_support::{
        catalog_hit, collaborators, drain, item_hit, run_context, run_context_with_budget,
        FakeCatalog, FakeModel, FakeSemantic,
    };
    use std::sync::atomic::Ordering;

    fn agent(
        catalog: FakeCatalog,
        semantic: FakeSemantic,
        model: Arc<FakeModel>,
        ceiling: usize,
    ) -> AgentLoop {
        let collabs = collaborators(Arc::new(catalog), Arc::new(semantic), Arc::clone(&model));
        let resolver = ComponentResolver::new(
            collabs,
            ResolverConfig {
                pool_size: 2,
                collaborator_timeout: Duration::from_secs(5),
                semantic_top_k: 3,
            },
        );
        let executor = ToolExecutor::new(resolver, model.clone(), Duration::from_secs(5));
        AgentLoop::new(executor, model, ceiling, Duration::from_secs(5), true)
    }

    fn intent(complexity: Complexity, actions: &[&str]) -> Intent {
        Intent {
            goal: "move leads into the CRM".into(),
            trigger_hint: None,
            actions_needed: actions.iter().map(|a| a.to_string()).collect(),
            complexity,
            confidence: Confidence::Medium,
            open_questions: Vec::new(),
        }
    }

    fn tool_calls(events: &[ProgressEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::ToolCall { .. }))
            .count()
    }

    #[tokio::test]
    async fn existence_question_uses_one_call_then_answers() {
        let model = Arc::new(FakeModel::default().reply("Yes, Gmail is available."));
        let agent = agent(
            FakeCatalog::default().with("gmail", vec![item_hit("Gmail", 7)]),
            FakeSemantic::default(),
            Arc::clone(&model),
            25,
        );
        let (ctx, mut rx) = run_context();

        let answer = agent
            .run("Is Gmail available?", &Intent::fallback("Is Gmail available?"), &ctx)
            .await;
        assert_eq!(answer.text, "Yes, Gmail is available.");
        assert_eq!(answer.tool_calls_used, 1);
        assert!(!answer.exhausted);
        assert!(answer.complete);

        let events = drain(&mut rx);
        assert!(matches!(events[0], ProgressEvent::PlanReady { steps: 1, max_tool_calls: 1 }));
        assert_eq!(tool_calls(&events), 1);
        assert!(model.last_prompt().unwrap().contains("Gmail"));
    }

    #[tokio::test]
    async fn tool_calls_never_exceed_the_budget() {
        let model = Arc::new(FakeModel::default().reply("summary"));
        let agent = agent(FakeCatalog::default(), FakeSemantic::default(), Arc::clone(&model), 25);
        for complexity in [Complexity::Simple, Complexity::Moderate, Complexity::Complex] {
            let (ctx, mut rx) = run_context();
            let intent = intent(
                complexity,
                &[
                    "create contact via HubSpot",
                    "send welcome email via Gmail",
                    "log row via Sheets",
                ],
            );
            let plan = generate_plan("keep my CRM tidy", &intent);
            let answer = agent.run("keep my CRM tidy", &intent, &ctx).await;
            assert!(answer.tool_calls_used <= plan.max_tool_calls.max(25));
            assert!(answer.tool_calls_used <= plan.max_tool_calls);
            assert_eq!(tool_calls(&drain(&mut rx)), answer.tool_calls_used);
        }
    }

    #[tokio::test]
    async fn terminates_when_every_tool_fails() {
        let model = Arc::new(FakeModel::default().fail());
        let agent = agent(
            FakeCatalog::default().failing("create contact via hubspot"),
            FakeSemantic::default(),
            Arc::clone(&model),
            25,
        );
        let (ctx, mut rx) = run_context();

        let intent = intent(Complexity::Complex, &["create contact via HubSpot"]);
        let answer = agent.run("keep my CRM tidy", &intent, &ctx).await;
        assert_eq!(answer.tool_calls_used, 1, "a failed tool is not retried");
        assert!(answer.text.contains(LAST_RESORT));
        assert_eq!(model.complete_calls.load(Ordering::SeqCst), 1);
        assert_eq!(tool_calls(&drain(&mut rx)), 1);
    }

    #[tokio::test]
    async fn unmet_step_retries_with_next_variant() {
        let model = Arc::new(FakeModel::default().reply("done"));
        let agent = agent(
            FakeCatalog::default()
                .with("post update via slack", vec![item_hit("Slack", 12)])
                .with("slack", vec![catalog_hit("Slack", "Send Message To A Channel", 12)]),
            FakeSemantic::default(),
            Arc::clone(&model),
            25,
        );
        let (ctx, _rx) = run_context();
        let step_query = ComponentQuery::action("post update via Slack");
        let narrower = ComponentQuery {
            search_terms: vec!["slack".into()],
            ..step_query.clone()
        };
        let plan = Plan {
            steps: vec![PlanStep {
                description: "find the Slack action".into(),
                tool: ToolKind::CatalogLookup,
                queries: vec![step_query, narrower],
                success_criterion: SuccessCriterion::OperationFound,
                max_attempts: 2,
            }],
            max_tool_calls: 2,
            stopping_condition: StoppingCondition::AllStepsSatisfied,
            fallback_strategy: "check the UI".into(),
        };

        let answer = agent
            .run_with_plan("post to slack", &intent(Complexity::Moderate, &[]), Some(plan), &ctx)
            .await;
        assert_eq!(answer.tool_calls_used, 2);
        assert!(!answer.exhausted);
        assert!(answer.observations[1].summary().contains("Send Message To A Channel"));
    }

    #[tokio::test]
    async fn defective_plan_becomes_one_generic_attempt() {
        let model = Arc::new(FakeModel::default().reply("ok"));
        let agent = agent(FakeCatalog::default(), FakeSemantic::default(), Arc::clone(&model), 25);
        let (ctx, mut rx) = run_context();
        let intent = intent(Complexity::Moderate, &["Send Email"]);
        let mut plan = generate_plan("email people", &intent);
        plan.max_tool_calls = 0;

        let answer = agent.run_with_plan("email people", &intent, Some(plan), &ctx).await;
        assert_eq!(answer.tool_calls_used, 1);
        let events = drain(&mut rx);
        assert!(matches!(events[0], ProgressEvent::PlanReady { max_tool_calls: 1, .. }));
    }

    #[tokio::test]
    async fn iteration_ceiling_forces_a_response() {
        let model = Arc::new(FakeModel::default().reply("partial"));
        let agent = agent(FakeCatalog::default(), FakeSemantic::default(), Arc::clone(&model), 1);
        let (ctx, _rx) = run_context();
        let intent = intent(Complexity::Complex, &["a step", "b step", "c step"]);

        let answer = agent.run("do several things", &intent, &ctx).await;
        assert_eq!(answer.tool_calls_used, 1);
        assert!(answer.exhausted);
        assert_eq!(answer.text, "partial");
        assert!(model
            .last_prompt()
            .unwrap()
            .contains("Not every planned lookup succeeded."));
    }

    #[tokio::test(start_paused = true)]
    async fn run_deadline_cuts_a_slow_lookup_short() {
        let model = Arc::new(FakeModel::default().reply("unused"));
        let catalog = FakeCatalog::default()
            .with("gmail", vec![catalog_hit("Gmail", "Send Email", 8)])
            .with_delay("gmail", Duration::from_secs(30));
        let agent = agent(catalog, FakeSemantic::default(), Arc::clone(&model), 25);
        let (ctx, _rx) = run_context_with_budget(Duration::from_secs(2));

        let answer = agent
            .run("Is Gmail available?", &Intent::fallback("Is Gmail available?"), &ctx)
            .await;
        assert_eq!(answer.tool_calls_used, 1);
        assert!(!answer.complete);
        assert!(answer.observations.is_empty());
        assert_eq!(answer.text, LAST_RESORT);
        assert_eq!(model.complete_calls.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.cache.stats().timeouts, 1);
    }

    #[tokio::test]
    async fn cancelled_run_answers_without_the_model() {
        let model = Arc::new(FakeModel::default().reply("unused"));
        let agent = agent(FakeCatalog::default(), FakeSemantic::default(), Arc::clone(&model), 25);
        let (ctx, _rx) = run_context();
        ctx.cancel.cancel();

        let answer = agent.run("Is Gmail available?", &Intent::fallback("x"), &ctx).await;
        assert_eq!(answer.tool_calls_used, 0);
        assert!(!answer.complete);
        assert_eq!(answer.text, LAST_RESORT);
        assert!(answer.observations.is_empty());
        assert_eq!(model.complete_calls.load(Ordering::SeqCst), 0);
    }
}
