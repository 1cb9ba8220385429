//! Plan generation for the agent loop
//!
//! Deterministic: no model call. Short existence questions and
//! configuration questions take fast paths; everything else gets one
//! catalog step per component, scaled to the intent's complexity.

use serde::Serialize;

use super::intent::{Complexity, ComponentQuery, Intent, QueryKind};
use super::tools::{Observation, ToolCall, ToolKind};
use crate::constants::limits::PLAN_TOOL_CALL_CEILING;

const MAX_SIMPLE_LOOKUP_LENGTH: usize = 140;
const MAX_DETAIL_LOOKUP_LENGTH: usize = 260;
const MAX_SHORT_QUESTION_WORDS: usize = 9;

const QUESTION_OPENERS: &[&str] = &["is", "does", "do", "can", "are", "was", "has", "have"];
const EXISTENCE_KEYWORDS: &[&str] = &[
    "available",
    "exist",
    "exists",
    "support",
    "supports",
    "supported",
    "integration",
    "integrate",
    "piece",
    "connector",
];
const DETAIL_KEYWORDS: &[&str] = &[
    "input",
    "field",
    "property",
    "parameter",
    "configuration",
    "configure",
    "setup",
    "set up",
    "mapping",
    "settings",
];
const ACTION_TERMS: &[&str] = &["action", "trigger", "step", "task", "piece"];

/// Words stripped from an existence question to find what it asks about.
const LOOKUP_FILLER: &[&str] = &[
    "is", "does", "do", "can", "are", "was", "has", "have", "there", "a", "an", "the", "you",
    "i", "we", "it", "any", "available", "exist", "exists", "support", "supports", "supported",
    "integration", "integrations", "integrate", "piece", "pieces", "connector", "connectors",
    "in", "on", "for", "with", "to", "of", "your", "me", "platform", "way",
];

/// Observable fact that satisfies a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessCriterion {
    /// A concrete catalog operation was matched
    OperationFound,
    /// Any catalog item matched, with or without an operation
    CatalogMatch,
    /// Semantic search returned at least one passage
    PassagesFound,
    /// The model produced non-empty text
    TextProduced,
}

impl SuccessCriterion {
    pub fn is_met(&self, observation: &Observation) -> bool {
        match (self, observation) {
            (Self::OperationFound, Observation::Component { result }) => {
                result.matched_operation.is_some()
            }
            (Self::CatalogMatch, Observation::Component { result }) => {
                result.matched_item.is_some()
            }
            (Self::PassagesFound, Observation::Passages { hits, .. }) => !hits.is_empty(),
            (Self::TextProduced, Observation::Text { text }) => !text.trim().is_empty(),
            _ => false,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::OperationFound => "a catalog operation with its input fields is returned",
            Self::CatalogMatch => "a matching piece is returned",
            Self::PassagesFound => "at least one documentation passage is returned",
            Self::TextProduced => "a non-empty answer is returned",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Satisfied,
    Unsatisfied,
}

/// When the loop stops acting and responds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoppingCondition {
    /// The first satisfied step is enough
    AnyStepSatisfied,
    /// Every step has been satisfied
    AllStepsSatisfied,
}

impl StoppingCondition {
    pub fn holds(&self, statuses: &[StepStatus]) -> bool {
        match self {
            Self::AnyStepSatisfied => statuses.contains(&StepStatus::Satisfied),
            Self::AllStepsSatisfied => {
                !statuses.is_empty() && statuses.iter().all(|s| *s == StepStatus::Satisfied)
            }
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::AnyStepSatisfied => "stop and answer as soon as one step succeeds",
            Self::AllStepsSatisfied => "stop and answer once every step has succeeded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanStep {
    pub description: String,
    pub tool: ToolKind,
    /// Query variants, tried in order, one per attempt
    pub queries: Vec<ComponentQuery>,
    pub success_criterion: SuccessCriterion,
    pub max_attempts: usize,
}

impl PlanStep {
    fn catalog(query: ComponentQuery) -> Self {
        let (description, success_criterion) = match query.kind {
            QueryKind::Trigger => (
                format!("Find the trigger for '{}' and its inputs", query.description),
                SuccessCriterion::OperationFound,
            ),
            QueryKind::Action => (
                format!("Find the action for '{}' and its inputs", query.description),
                SuccessCriterion::OperationFound,
            ),
            QueryKind::Topic => (
                format!("Look up '{}' in the catalog", query.description),
                SuccessCriterion::CatalogMatch,
            ),
        };
        Self {
            description,
            tool: ToolKind::CatalogLookup,
            queries: query_variants(query),
            success_criterion,
            max_attempts: 1,
        }
    }

    fn semantic(text: &str) -> Self {
        Self {
            description: format!("Search the documentation for '{}'", text.trim()),
            tool: ToolKind::SemanticSearch,
            queries: vec![ComponentQuery::topic(text)],
            success_criterion: SuccessCriterion::PassagesFound,
            max_attempts: 1,
        }
    }

    /// The call for a zero-based attempt, if that variant exists.
    pub fn call(&self, attempt: usize) -> Option<ToolCall> {
        if attempt >= self.max_attempts {
            return None;
        }
        self.queries
            .get(attempt)
            .map(|query| ToolCall::for_query(self.tool, query))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
    pub max_tool_calls: usize,
    pub stopping_condition: StoppingCondition,
    pub fallback_strategy: String,
}

impl Plan {
    /// Single catalog attempt over the first component (or the goal). Used
    /// in place of a defective plan.
    pub fn generic(intent: &Intent) -> Self {
        let query = intent
            .queries()
            .into_iter()
            .next()
            .unwrap_or_else(|| ComponentQuery::topic(&intent.goal));
        let mut step = PlanStep::catalog(query);
        step.queries.truncate(1);
        Self {
            steps: vec![step],
            max_tool_calls: 1,
            stopping_condition: StoppingCondition::AnyStepSatisfied,
            fallback_strategy: COMPONENT_FALLBACK.to_string(),
        }
    }

    pub fn total_attempts(&self) -> usize {
        self.steps.iter().map(|s| s.max_attempts).sum()
    }

    /// Steps present, budget within bounds and covering every attempt.
    pub fn is_valid(&self) -> bool {
        !self.steps.is_empty()
            && (1..=PLAN_TOOL_CALL_CEILING).contains(&self.max_tool_calls)
            && !self.fallback_strategy.trim().is_empty()
            && self
                .steps
                .iter()
                .all(|s| s.max_attempts >= 1 && !s.queries.is_empty())
            && self.total_attempts() <= self.max_tool_calls
    }

    /// Guidance text for the answering prompt.
    pub fn render(&self) -> String {
        let mut out = format!("Plan (at most {} tool calls):\n", self.max_tool_calls);
        for (i, step) in self.steps.iter().enumerate() {
            out.push_str(&format!(
                "{}. {}. Tool: {}. Success when {}. Attempts: {}.\n",
                i + 1,
                step.description,
                step.tool.as_str(),
                step.success_criterion.describe(),
                step.max_attempts
            ));
        }
        out.push_str(&format!("Stopping: {}.\n", self.stopping_condition.describe()));
        out.push_str(&format!("Fallback: {}\n", self.fallback_strategy));
        out
    }
}

const LOOKUP_FALLBACK: &str = "If the catalog lookup fails, say the integration could not be \
    verified and suggest checking the platform's piece list directly.";
const DETAIL_FALLBACK: &str = "If the documentation search fails, give general guidance on \
    configuring the step and suggest checking its input form in the platform.";
const COMPONENT_FALLBACK: &str = "Present what was found, mark every component that could not \
    be verified, and suggest the HTTP Request piece or a code step for anything missing.";

/// Build the plan for `request` as analysed into `intent`.
pub fn generate_plan(request: &str, intent: &Intent) -> Plan {
    let lower = request.trim().to_lowercase();

    if looks_like_detail_lookup(&lower) {
        return Plan {
            steps: vec![PlanStep::semantic(request)],
            max_tool_calls: 1,
            stopping_condition: StoppingCondition::AnyStepSatisfied,
            fallback_strategy: DETAIL_FALLBACK.to_string(),
        };
    }
    if looks_like_simple_lookup(&lower) {
        let query = lookup_query(request).unwrap_or_else(|| ComponentQuery::topic(&intent.goal));
        let mut step = PlanStep::catalog(query);
        step.queries.truncate(1);
        return Plan {
            steps: vec![step],
            max_tool_calls: 1,
            stopping_condition: StoppingCondition::AnyStepSatisfied,
            fallback_strategy: LOOKUP_FALLBACK.to_string(),
        };
    }

    let queries = intent.queries();
    let budget = tool_budget(intent.complexity, queries.len());

    let mut steps: Vec<PlanStep> = queries.into_iter().take(budget).map(PlanStep::catalog).collect();
    if intent.complexity != Complexity::Simple
        && steps.len() < budget
        && !intent.goal.trim().is_empty()
    {
        steps.push(PlanStep::semantic(&intent.goal));
    }

    // Spare budget buys second attempts for steps with a narrower variant
    let mut spare = budget.saturating_sub(steps.iter().map(|s| s.max_attempts).sum());
    for step in steps.iter_mut() {
        if spare == 0 {
            break;
        }
        if step.queries.len() > step.max_attempts {
            step.max_attempts += 1;
            spare -= 1;
        }
    }
    for step in steps.iter_mut() {
        step.queries.truncate(step.max_attempts);
    }

    Plan {
        steps,
        max_tool_calls: budget,
        stopping_condition: StoppingCondition::AllStepsSatisfied,
        fallback_strategy: COMPONENT_FALLBACK.to_string(),
    }
}

/// simple → 1, moderate → 2-3, complex → 4-6, never above the ceiling.
fn tool_budget(complexity: Complexity, components: usize) -> usize {
    let budget = match complexity {
        Complexity::Simple => 1,
        Complexity::Moderate => components.clamp(2, 3),
        Complexity::Complex => (components + 1).clamp(4, 6),
    };
    budget.min(PLAN_TOOL_CALL_CEILING)
}

/// The query itself, then the same query starting from its second term.
fn query_variants(query: ComponentQuery) -> Vec<ComponentQuery> {
    let narrower = (query.search_terms.len() > 1).then(|| ComponentQuery {
        search_terms: query.search_terms[1..].to_vec(),
        ..query.clone()
    });
    std::iter::once(query).chain(narrower).collect()
}

fn words(lower: &str) -> Vec<&str> {
    lower
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .collect()
}

fn looks_like_simple_lookup(lower: &str) -> bool {
    if lower.is_empty() || lower.len() > MAX_SIMPLE_LOOKUP_LENGTH {
        return false;
    }
    let words = words(lower);
    let opener = words.first().is_some_and(|w| QUESTION_OPENERS.contains(w));
    let existence = words.iter().any(|w| EXISTENCE_KEYWORDS.contains(w));
    let short_question = lower.ends_with('?') && words.len() <= MAX_SHORT_QUESTION_WORDS;
    (opener && (existence || short_question)) || (existence && short_question)
}

fn looks_like_detail_lookup(lower: &str) -> bool {
    if lower.is_empty() || lower.len() > MAX_DETAIL_LOOKUP_LENGTH {
        return false;
    }
    DETAIL_KEYWORDS.iter().any(|k| lower.contains(k))
        && ACTION_TERMS.iter().any(|t| lower.contains(t))
}

/// What an existence question asks about: its non-filler words, then each
/// word alone, longest first.
fn lookup_query(request: &str) -> Option<ComponentQuery> {
    let subject: Vec<&str> = request
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty() && !LOOKUP_FILLER.contains(&w.to_lowercase().as_str()))
        .collect();
    if subject.is_empty() {
        return None;
    }

    let mut query = ComponentQuery::topic(&subject.join(" "));
    let mut singles = subject.clone();
    singles.sort_by_key(|w| std::cmp::Reverse(w.len()));
    for word in singles {
        if !query.search_terms.iter().any(|t| t.eq_ignore_ascii_case(word)) {
            query.search_terms.push(word.to_string());
        }
    }
    Some(query)
}
