//! Planning stage: question decomposition

use super::{PipelineStage, QaState, StateUpdate};
use crate::errors::Result;
use crate::llm::{last_assistant_content, Agent};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Plan recorded when the model's output is not a JSON object
pub const PLAN_FALLBACK: &str = "Unable to parse plan. Using original question for retrieval.";

/// Asks the model for `{plan, sub_questions}` and normalizes the result
pub struct PlanningAgent {
    agent: Arc<dyn Agent>,
}

impl PlanningAgent {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }
}

/// Parse the planning output.
///
/// Returns `(plan, sub_questions, parsed)`. `sub_questions` is never empty:
/// it falls back to `[question]` when the output is not a JSON object or
/// names no usable queries.
pub fn parse_plan(output: &str, question: &str) -> (String, Vec<String>, bool) {
    let object = match serde_json::from_str::<Value>(output) {
        Ok(Value::Object(object)) => object,
        _ => return (PLAN_FALLBACK.to_string(), vec![question.to_string()], false),
    };

    let plan = object
        .get("plan")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut sub_questions: Vec<String> = object
        .get("sub_questions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter(|q| !q.trim().is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if sub_questions.is_empty() {
        sub_questions.push(question.to_string());
    }

    (plan, sub_questions, true)
}

#[async_trait]
impl PipelineStage for PlanningAgent {
    fn name(&self) -> &'static str {
        "planning"
    }

    async fn run(&self, state: &QaState) -> Result<StateUpdate> {
        let transcript = self.agent.invoke(&state.question).await?;
        let output = last_assistant_content(&transcript);

        let (plan, sub_questions, parsed) = parse_plan(&output, &state.question);
        if !parsed {
            tracing::warn!(output = %output, "Planning output is not a JSON object, using the question as the only query");
            crate::metrics::record_planning_fallback();
        }

        tracing::debug!(sub_questions = sub_questions.len(), "Plan ready");
        Ok(StateUpdate::plan(plan, sub_questions))
    }
}
