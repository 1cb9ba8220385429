//! Agent pipeline for Flowsmith
//!
//! ## Orchestrator
//! - `Orchestrator` - one request from raw text to a terminal `Done` event
//! - `ProgressEvent` - event protocol between the orchestrator and consumers
//!
//! ## Stages
//! - `RequestAnalyzer` - request (+ recent turns) to `Intent`, one model call
//! - `ComponentResolver` - component queries to catalog matches on a worker pool
//! - `generate_plan` / `AgentLoop` - budgeted tool use for ask mode
//! - `GuideSynthesizer` - streamed build guide over the resolved components
//!
//! ## Per-run state
//! - `RunContext` - run id, cancellation, deadline, event channel
//! - `RunCache` - resolved components, single-flight lookups, failure ledger

pub mod agent_loop;
pub mod analyzer;
pub mod cache;
pub mod context;
pub mod events;
pub mod failure;
pub mod intent;
pub mod orchestrator;
pub mod planner;
pub mod resolver;
pub mod stream;
pub mod synthesizer;
pub mod tools;

pub use agent_loop::{AgentLoop, Answer};
pub use analyzer::RequestAnalyzer;
pub use cache::{ResolverStats, RunCache};
pub use context::RunContext;
pub use events::{Mode, ProgressEvent};
pub use intent::{ComponentQuery, ConversationTurn, Intent, QueryKind, Role};
pub use orchestrator::Orchestrator;
pub use planner::{generate_plan, Plan, PlanStep, StoppingCondition, SuccessCriterion};
pub use resolver::{ComponentResolver, ComponentResult, ResolverConfig, Source, Strategy};
pub use synthesizer::{Guide, GuideSynthesizer, SynthesizerConfig};
pub use tools::{Observation, ToolCall, ToolExecutor, ToolKind};
