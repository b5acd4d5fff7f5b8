//! Pipeline state threaded through the QA stages

use serde::{Deserialize, Serialize};

/// State of one question as it moves through the pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaState {
    /// The question as submitted
    pub question: String,

    /// Search strategy from planning
    pub plan: Option<String>,

    /// Retrieval queries from planning, never empty once set
    pub sub_questions: Option<Vec<String>>,

    /// Deduplicated retrieved passages
    pub context: Option<String>,

    /// Answer before verification
    pub draft_answer: Option<String>,

    /// Verified answer
    pub answer: Option<String>,
}

impl QaState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    /// Merge a stage's partial update. Fields the update leaves as `None`
    /// keep their current value.
    pub fn apply(&mut self, update: StateUpdate) {
        if let Some(plan) = update.plan {
            self.plan = Some(plan);
        }
        if let Some(sub_questions) = update.sub_questions {
            self.sub_questions = Some(sub_questions);
        }
        if let Some(context) = update.context {
            self.context = Some(context);
        }
        if let Some(draft_answer) = update.draft_answer {
            self.draft_answer = Some(draft_answer);
        }
        if let Some(answer) = update.answer {
            self.answer = Some(answer);
        }
    }
}

/// Fields produced by a single stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateUpdate {
    pub plan: Option<String>,
    pub sub_questions: Option<Vec<String>>,
    pub context: Option<String>,
    pub draft_answer: Option<String>,
    pub answer: Option<String>,
}

impl StateUpdate {
    pub fn plan(plan: String, sub_questions: Vec<String>) -> Self {
        Self {
            plan: Some(plan),
            sub_questions: Some(sub_questions),
            ..Self::default()
        }
    }

    pub fn context(context: String) -> Self {
        Self {
            context: Some(context),
            ..Self::default()
        }
    }

    pub fn draft_answer(draft_answer: String) -> Self {
        Self {
            draft_answer: Some(draft_answer),
            ..Self::default()
        }
    }

    pub fn answer(answer: String) -> Self {
        Self {
            answer: Some(answer),
            ..Self::default()
        }
    }
}
