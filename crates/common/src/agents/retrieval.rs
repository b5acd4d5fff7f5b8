//! Retrieval stage: per-query tool calls with deduplication

use super::{PipelineStage, QaState, StateUpdate};
use crate::errors::Result;
use crate::llm::{last_tool_content, Agent};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Separator between retrieved blocks in the context
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Collects tool outputs in first-seen order, dropping exact repeats
#[derive(Debug, Default)]
pub struct ContextAccumulator {
    seen: HashSet<String>,
    blocks: Vec<String>,
}

impl ContextAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if `block` was already collected
    pub fn push(&mut self, block: &str) -> bool {
        if self.seen.contains(block) {
            return false;
        }
        self.seen.insert(block.to_string());
        self.blocks.push(block.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn finish(self) -> String {
        self.blocks.join(CONTEXT_SEPARATOR)
    }
}

/// Runs the retrieval agent once per sub-question, in order
pub struct RetrievalAgent {
    agent: Arc<dyn Agent>,
}

impl RetrievalAgent {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl PipelineStage for RetrievalAgent {
    fn name(&self) -> &'static str {
        "retrieval"
    }

    async fn run(&self, state: &QaState) -> Result<StateUpdate> {
        let queries: Vec<&str> = match state.sub_questions.as_deref() {
            Some(sub_questions) if !sub_questions.is_empty() => {
                sub_questions.iter().map(String::as_str).collect()
            }
            _ => vec![state.question.as_str()],
        };

        let mut accumulator = ContextAccumulator::new();
        let mut duplicates = 0usize;

        for query in queries {
            let transcript = self.agent.invoke(query).await?;

            match last_tool_content(&transcript) {
                Some(block) => {
                    if !accumulator.push(block) {
                        duplicates += 1;
                    }
                }
                None => tracing::debug!(query = %query, "Retrieval agent made no tool call"),
            }
        }

        crate::metrics::record_passages(accumulator.len(), duplicates);
        tracing::debug!(blocks = accumulator.len(), duplicates = duplicates, "Context assembled");

        Ok(StateUpdate::context(accumulator.finish()))
    }
}
