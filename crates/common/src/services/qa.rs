//! Question answering facade
//!
//! Validates the question, runs the pipeline and exposes only the fields
//! callers care about.

use crate::agents::QaGraph;
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::llm::{ModelRegistry, TokenStream};
use crate::retrieval::create_retrieval_tool;
use futures::{future, stream, StreamExt, TryStreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Final answer and the context it was verified against
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QaAnswer {
    pub answer: String,
    pub context: String,
}

/// Entry point for answering questions
#[derive(Clone)]
pub struct QaService {
    graph: Arc<QaGraph>,
}

impl QaService {
    pub fn new(graph: Arc<QaGraph>) -> Self {
        Self { graph }
    }

    /// Build the model registry, retriever and pipeline from configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let registry = ModelRegistry::from_config(&config.llm)?;
        let retriever = create_retrieval_tool(config)?;
        let graph = QaGraph::from_registry(&registry, retriever, config.llm.max_tool_rounds)?;
        Ok(Self::new(Arc::new(graph)))
    }

    fn validate(question: &str) -> Result<()> {
        if question.trim().is_empty() {
            return Err(AppError::Validation {
                message: "question must be a non-empty string".to_string(),
                field: Some("question".to_string()),
            });
        }
        Ok(())
    }

    /// Answer a question synchronously
    pub async fn answer_question(&self, question: &str) -> Result<QaAnswer> {
        Self::validate(question)?;

        let result = self.graph.run(question).await;
        crate::metrics::record_qa("sync", result.is_ok());

        let state = result?;
        Ok(QaAnswer {
            answer: state.answer.unwrap_or_default(),
            context: state.context.unwrap_or_default(),
        })
    }

    /// Answer a question as a stream of text fragments.
    ///
    /// A blank question yields a single validation error.
    pub fn stream_answer(&self, question: String) -> TokenStream {
        if let Err(e) = Self::validate(&question) {
            return stream::once(future::ready(Err(e))).boxed();
        }

        let succeeded = Arc::new(AtomicBool::new(true));
        let on_error = succeeded.clone();

        let completion = stream::once(async move {
            crate::metrics::record_qa("stream", succeeded.load(Ordering::Relaxed));
        })
        .filter_map(|()| future::ready(None::<Result<String>>));

        self.graph
            .clone()
            .stream(question)
            .inspect_err(move |_| on_error.store(false, Ordering::Relaxed))
            .chain(completion)
            .boxed()
    }
}
