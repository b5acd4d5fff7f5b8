//! Verification stage
//!
//! Talks to the chat model directly rather than through an agent so the
//! final answer can be streamed.

use super::prompts::VERIFICATION_PROMPT;
use super::{PipelineStage, QaState, StateUpdate};
use crate::errors::Result;
use crate::llm::{ChatMessage, ChatModel, TokenStream};
use async_trait::async_trait;
use std::sync::Arc;

pub struct VerificationAgent {
    model: Arc<dyn ChatModel>,
}

impl VerificationAgent {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub(crate) fn prompt(state: &QaState) -> String {
        format!(
            "Question: {}\n\nContext:\n{}\n\nDraft Answer:\n{}\n\n\
             Please verify and correct the draft answer, removing any unsupported claims.",
            state.question,
            state.context.as_deref().unwrap_or_default(),
            state.draft_answer.as_deref().unwrap_or_default()
        )
    }

    /// Stream the verified answer fragment by fragment
    pub async fn stream(&self, state: &QaState) -> Result<TokenStream> {
        let conversation = [ChatMessage::user(Self::prompt(state))];
        self.model.stream(VERIFICATION_PROMPT, &conversation).await
    }
}

#[async_trait]
impl PipelineStage for VerificationAgent {
    fn name(&self) -> &'static str {
        "verification"
    }

    async fn run(&self, state: &QaState) -> Result<StateUpdate> {
        let conversation = [ChatMessage::user(Self::prompt(state))];
        let reply = self.model.generate(VERIFICATION_PROMPT, &conversation, &[]).await?;
        Ok(StateUpdate::answer(reply.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{GeneratedMessage, MockChatModel};
    use futures::TryStreamExt;

    fn state() -> QaState {
        QaState {
            context: Some("HNSW is a graph index.".to_string()),
            draft_answer: Some("HNSW is a graph index invented in 1990.".to_string()),
            ..QaState::new("What is HNSW?")
        }
    }

    #[test]
    fn test_prompt_layout() {
        assert_eq!(
            VerificationAgent::prompt(&state()),
            "Question: What is HNSW?\n\nContext:\nHNSW is a graph index.\n\n\
             Draft Answer:\nHNSW is a graph index invented in 1990.\n\n\
             Please verify and correct the draft answer, removing any unsupported claims."
        );
    }

    #[tokio::test]
    async fn test_uses_verification_instruction() {
        let model = MockChatModel::new(|system, conversation| {
            assert_eq!(system, VERIFICATION_PROMPT);
            assert_eq!(conversation.len(), 1);
            GeneratedMessage::text("HNSW is a graph index.")
        });
        let stage = VerificationAgent::new(Arc::new(model));

        let update = stage.run(&state()).await.unwrap();
        assert_eq!(update.answer.as_deref(), Some("HNSW is a graph index."));
    }

    #[tokio::test]
    async fn test_stream_concatenates_to_answer() {
        let stage = VerificationAgent::new(Arc::new(MockChatModel::constant("HNSW is a graph index.")));

        let fragments: Vec<String> = stage.stream(&state()).await.unwrap().try_collect().await.unwrap();
        let update = stage.run(&state()).await.unwrap();

        assert_eq!(Some(fragments.concat()), update.answer);
    }
}
