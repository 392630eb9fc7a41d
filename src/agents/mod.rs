//! Planner -> executor -> verifier pipeline.
//!
//! - `planner`: turns a request into a [`plan::Plan`] via the generation backend
//! - `executor`: runs plan steps concurrently against the tool registry
//! - `verifier`: turns raw results into a final answer
//! - `orchestrator`: sequences the three stages with caching and cost accounting

pub mod cache;
pub mod executor;
pub mod ledger;
pub mod orchestrator;
pub mod plan;
pub mod planner;
pub mod verifier;

pub use executor::{ExecutionResult, Executor, ExecutorSettings, StepOutcome, StepOutput};
pub use ledger::{Pricing, SessionLedger};
pub use orchestrator::{Assistant, AssistantReply};
pub use plan::{Plan, PlanOutcome, PlanStep};
pub use planner::Planner;
pub use verifier::{Verdict, VerificationOutcome, VerificationStatus, Verifier, VerifierReply};
