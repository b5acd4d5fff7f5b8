//! Multi-agent QA pipeline
//!
//! Four stages run in order over a shared `QaState`:
//! - Planning: split the question into retrieval queries
//! - Retrieval: collect and deduplicate supporting passages
//! - Summarization: draft an answer from the passages
//! - Verification: remove claims the passages do not support
//!
//! Each stage reads the state and returns a `StateUpdate`; `QaGraph` merges
//! the updates and exposes synchronous and streaming runs.

mod graph;
mod planning;
pub mod prompts;
mod retrieval;
mod state;
mod summarization;
mod verification;

pub use graph::QaGraph;
pub use planning::{parse_plan, PlanningAgent, PLAN_FALLBACK};
pub use retrieval::{ContextAccumulator, RetrievalAgent, CONTEXT_SEPARATOR};
pub use state::{QaState, StateUpdate};
pub use summarization::SummarizationAgent;
pub use verification::VerificationAgent;

use crate::errors::Result;
use async_trait::async_trait;

/// One step of the pipeline
#[async_trait]
pub trait PipelineStage: Send + Sync {
    /// Stage name used in logs and metrics
    fn name(&self) -> &'static str;

    async fn run(&self, state: &QaState) -> Result<StateUpdate>;
}
