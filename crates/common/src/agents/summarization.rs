//! Summarization stage: draft an answer from the context

use super::{PipelineStage, QaState, StateUpdate};
use crate::errors::Result;
use crate::llm::{last_assistant_content, Agent};
use async_trait::async_trait;
use std::sync::Arc;

pub struct SummarizationAgent {
    agent: Arc<dyn Agent>,
}

impl SummarizationAgent {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }

    pub(crate) fn prompt(state: &QaState) -> String {
        format!(
            "Question: {}\n\nContext:\n{}",
            state.question,
            state.context.as_deref().unwrap_or_default()
        )
    }
}

#[async_trait]
impl PipelineStage for SummarizationAgent {
    fn name(&self) -> &'static str {
        "summarization"
    }

    async fn run(&self, state: &QaState) -> Result<StateUpdate> {
        let transcript = self.agent.invoke(&Self::prompt(state)).await?;
        Ok(StateUpdate::draft_answer(last_assistant_content(&transcript)))
    }
}
