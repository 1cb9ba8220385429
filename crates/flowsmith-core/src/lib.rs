//! Flowsmith core library
//!
//! Bounded orchestration for a workflow-catalog assistant:
//! - `agent` - intent analysis, component resolution, planning, the bounded
//!   agent loop, guide synthesis, and the orchestrator that ties them together
//! - `catalog` - catalog and semantic-search collaborator contracts and adapters
//! - `ai` - language model contract and the Responses API client
//! - `config` - TOML settings with environment overrides

pub mod agent;
pub mod ai;
pub mod catalog;
pub mod collaborators;
pub mod config;
pub mod constants;
pub mod error;
pub mod paths;

#[cfg(test)]
pub(crate) mod test_support;

pub use collaborators::Collaborators;
pub use config::Settings;
pub use error::{CollaboratorError, ErrorKind, OrchestrationError};
