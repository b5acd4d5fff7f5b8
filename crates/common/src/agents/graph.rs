//! Pipeline controller
//!
//! Runs Planning → Retrieval → Summarization → Verification, merging each
//! stage's update into the state before the next stage sees it.

use super::prompts::{PLANNING_PROMPT, RETRIEVAL_PROMPT, SUMMARIZATION_PROMPT};
use super::{
    PipelineStage, PlanningAgent, QaState, RetrievalAgent, SummarizationAgent, VerificationAgent,
};
use crate::errors::Result;
use crate::llm::{AgentRole, ModelRegistry, TokenStream, Tool, ToolCallingAgent};
use crate::retrieval::{RetrievalTool, RetrievalToolAdapter};
use futures::{future, stream, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

/// The four-stage QA pipeline
pub struct QaGraph {
    planning: PlanningAgent,
    retrieval: RetrievalAgent,
    summarization: SummarizationAgent,
    verification: VerificationAgent,
}

impl QaGraph {
    pub fn new(
        planning: PlanningAgent,
        retrieval: RetrievalAgent,
        summarization: SummarizationAgent,
        verification: VerificationAgent,
    ) -> Self {
        Self {
            planning,
            retrieval,
            summarization,
            verification,
        }
    }

    /// Wire every stage to its model from the registry. Only the retrieval
    /// agent is given a tool.
    pub fn from_registry(
        registry: &ModelRegistry,
        retriever: Arc<dyn RetrievalTool>,
        max_tool_rounds: usize,
    ) -> Result<Self> {
        let planning = ToolCallingAgent::new(
            registry.for_role(AgentRole::Planning)?,
            PLANNING_PROMPT,
            Vec::new(),
            max_tool_rounds,
        );
        let retrieval_tool: Arc<dyn Tool> = Arc::new(RetrievalToolAdapter::new(retriever));
        let retrieval = ToolCallingAgent::new(
            registry.for_role(AgentRole::Retrieval)?,
            RETRIEVAL_PROMPT,
            vec![retrieval_tool],
            max_tool_rounds,
        );
        let summarization = ToolCallingAgent::new(
            registry.for_role(AgentRole::Summarization)?,
            SUMMARIZATION_PROMPT,
            Vec::new(),
            max_tool_rounds,
        );

        Ok(Self::new(
            PlanningAgent::new(Arc::new(planning)),
            RetrievalAgent::new(Arc::new(retrieval)),
            SummarizationAgent::new(Arc::new(summarization)),
            VerificationAgent::new(registry.for_role(AgentRole::Verification)?),
        ))
    }

    #[instrument(skip_all, fields(stage = stage.name()))]
    async fn run_stage(stage: &dyn PipelineStage, state: &mut QaState) -> Result<()> {
        let start = Instant::now();
        let update = stage.run(state).await?;
        let elapsed = start.elapsed();

        crate::metrics::record_stage(stage.name(), elapsed.as_secs_f64());
        debug!(stage = stage.name(), elapsed_ms = elapsed.as_millis() as u64, "Stage complete");

        state.apply(update);
        Ok(())
    }

    /// Run every stage up to, but not including, verification
    async fn prepare(&self, question: &str) -> Result<QaState> {
        let mut state = QaState::new(question);
        Self::run_stage(&self.planning, &mut state).await?;
        Self::run_stage(&self.retrieval, &mut state).await?;
        Self::run_stage(&self.summarization, &mut state).await?;
        Ok(state)
    }

    /// Run the whole pipeline and return the final state
    #[instrument(skip(self, question), fields(question_len = question.len()))]
    pub async fn run(&self, question: &str) -> Result<QaState> {
        let mut state = self.prepare(question).await?;
        Self::run_stage(&self.verification, &mut state).await?;
        Ok(state)
    }

    /// Run the pipeline, streaming the verified answer.
    ///
    /// Nothing runs until the stream is first polled. An error in any stage
    /// ends the stream with that error.
    pub fn stream(self: Arc<Self>, question: String) -> TokenStream {
        stream::once(async move {
            let state = self.prepare(&question).await?;
            let stage = self.verification.name();
            let start = Instant::now();
            let tokens = self.verification.stream(&state).await?;

            // Verification ends with the last fragment, not when the stream opens
            let completion = stream::once(async move {
                crate::metrics::record_stage(stage, start.elapsed().as_secs_f64());
            })
            .filter_map(|()| future::ready(None::<Result<String>>));

            Ok::<_, crate::errors::AppError>(tokens.chain(completion))
        })
        .try_flatten()
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use crate::llm::{ChatMessage, GeneratedMessage, MockChatModel, Role, ScriptedAgent, ToolCall};
    use crate::retrieval::{Passage, StaticRetrievalTool};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const HNSW_PLAN: &str = r#"{"plan": "Single definitional search.", "sub_questions": ["HNSW hierarchical navigable small world algorithm definition"]}"#;
    const HNSW_ANSWER: &str = "HNSW is a graph-based approximate nearest neighbour index.";

    /// Mock backend that behaves like each stage's model, keyed on the
    /// system instruction it receives.
    fn backend(plan_output: &'static str) -> MockChatModel {
        MockChatModel::new(move |system, conversation| {
            if system == PLANNING_PROMPT {
                GeneratedMessage::text(plan_output)
            } else if system == RETRIEVAL_PROMPT {
                match conversation.last() {
                    Some(m) if m.role == Role::Tool => GeneratedMessage::text("Context gathered."),
                    Some(m) => GeneratedMessage {
                        content: String::new(),
                        tool_calls: vec![ToolCall {
                            id: "call_1".to_string(),
                            name: "retrieval_tool".to_string(),
                            arguments: serde_json::json!({ "query": m.content }).to_string(),
                        }],
                    },
                    None => GeneratedMessage::default(),
                }
            } else if system == SUMMARIZATION_PROMPT {
                GeneratedMessage::text("Draft: HNSW is a graph index.")
            } else {
                GeneratedMessage::text(HNSW_ANSWER)
            }
        })
    }

    fn graph(model: MockChatModel, passages: Vec<Passage>) -> QaGraph {
        let registry = ModelRegistry::with_model(Arc::new(model));
        QaGraph::from_registry(&registry, Arc::new(StaticRetrievalTool::new(passages)), 5).unwrap()
    }

    fn hnsw_passages() -> Vec<Passage> {
        vec![Passage::new("HNSW builds a hierarchy of proximity graphs.", Some(4))]
    }

    #[tokio::test]
    async fn test_hnsw_question() {
        let graph = graph(backend(HNSW_PLAN), hnsw_passages());
        let state = graph.run("What is HNSW?").await.unwrap();

        assert_eq!(state.plan.as_deref(), Some("Single definitional search."));
        assert_eq!(
            state.sub_questions,
            Some(vec!["HNSW hierarchical navigable small world algorithm definition".to_string()])
        );
        assert_eq!(
            state.context.as_deref(),
            Some("Chunk 1 (page=4):\nHNSW builds a hierarchy of proximity graphs.")
        );
        assert_eq!(state.draft_answer.as_deref(), Some("Draft: HNSW is a graph index."));
        assert_eq!(state.answer.as_deref(), Some(HNSW_ANSWER));
    }

    #[tokio::test]
    async fn test_malformed_plan_uses_question() {
        let graph = graph(backend("not json"), hnsw_passages());
        let state = graph.run("What is HNSW?").await.unwrap();

        assert_eq!(state.plan.as_deref(), Some(crate::agents::PLAN_FALLBACK));
        assert_eq!(state.sub_questions, Some(vec!["What is HNSW?".to_string()]));
        assert!(state.answer.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_retrievals_collapse() {
        let plan = r#"{"plan": "Two searches.", "sub_questions": ["vector database advantages", "vector database benefits"]}"#;
        let graph = graph(backend(plan), vec![Passage::new("Same chunk.", None)]);
        let state = graph.run("Why use a vector database?").await.unwrap();

        assert_eq!(state.context.as_deref(), Some("Chunk 1 (page=unknown):\nSame chunk."));
    }

    #[tokio::test]
    async fn test_empty_index_gives_empty_context() {
        let graph = graph(backend(HNSW_PLAN), Vec::new());
        let state = graph.run("What is HNSW?").await.unwrap();

        assert_eq!(state.context.as_deref(), Some(""));
        assert!(state.answer.is_some());
    }

    #[tokio::test]
    async fn test_stream_matches_run() {
        let graph = Arc::new(graph(backend(HNSW_PLAN), hnsw_passages()));

        let fragments: Vec<String> = graph
            .clone()
            .stream("What is HNSW?".to_string())
            .try_collect()
            .await
            .unwrap();
        let state = graph.run("What is HNSW?").await.unwrap();

        assert!(fragments.len() > 1);
        assert_eq!(Some(fragments.concat()), state.answer);
    }

    #[tokio::test]
    async fn test_stream_is_lazy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let model = MockChatModel::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            GeneratedMessage::text("answer")
        });
        let graph = Arc::new(graph(model, Vec::new()));

        let stream = graph.stream("q".to_string());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let fragments: Vec<String> = stream.try_collect().await.unwrap();
        assert_eq!(fragments.concat(), "answer");
        assert!(calls.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn test_stage_errors_propagate() {
        let model = MockChatModel::new(|_, _| GeneratedMessage::default());
        let failing = ScriptedAgent::from_fn(|_| {
            Err(AppError::GenerationError {
                message: "upstream down".to_string(),
            })
        });
        let graph = QaGraph::new(
            PlanningAgent::new(Arc::new(failing)),
            RetrievalAgent::new(Arc::new(ScriptedAgent::replying(""))),
            SummarizationAgent::new(Arc::new(ScriptedAgent::replying(""))),
            VerificationAgent::new(Arc::new(model)),
        );
        let graph = Arc::new(graph);

        assert!(matches!(
            graph.run("q").await,
            Err(AppError::GenerationError { .. })
        ));

        let items: Vec<Result<String>> = graph.stream("q".to_string()).collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }

    #[tokio::test]
    async fn test_hnsw_passthrough_scenario() {
        let planning = ScriptedAgent::replying(
            r#"{"plan": "Look up the definition.", "sub_questions": ["HNSW definition"]}"#,
        );
        let retrieval = ScriptedAgent::from_fn(|input| {
            Ok(vec![
                ChatMessage::user(input),
                ChatMessage::tool("call_1", "HNSW is a graph-based index."),
                ChatMessage::assistant("Done."),
            ])
        });
        // Summarization echoes the context it was given
        let summarization = ScriptedAgent::from_fn(|input| {
            let context = input.split_once("Context:\n").map(|(_, c)| c).unwrap_or_default();
            Ok(vec![ChatMessage::user(input), ChatMessage::assistant(context)])
        });
        // Verification passes the draft through unchanged
        let verification = MockChatModel::new(|_, conversation| {
            let prompt = conversation.last().map(|m| m.content.as_str()).unwrap_or_default();
            let draft = prompt
                .split_once("Draft Answer:\n")
                .and_then(|(_, rest)| rest.split_once("\n\nPlease verify"))
                .map(|(draft, _)| draft)
                .unwrap_or_default();
            GeneratedMessage::text(draft)
        });

        let graph = QaGraph::new(
            PlanningAgent::new(Arc::new(planning)),
            RetrievalAgent::new(Arc::new(retrieval)),
            SummarizationAgent::new(Arc::new(summarization)),
            VerificationAgent::new(Arc::new(verification)),
        );
        let state = graph.run("What is HNSW?").await.unwrap();

        assert_eq!(state.sub_questions, Some(vec!["HNSW definition".to_string()]));
        assert_eq!(state.context.as_deref(), Some("HNSW is a graph-based index."));
        assert_eq!(state.answer.as_deref(), Some("HNSW is a graph-based index."));
    }

    /// Records which stages reported a latency sample, in order
    #[derive(Default)]
    struct StageRecorder {
        stages: Arc<Mutex<Vec<String>>>,
    }

    struct StageHistogram {
        stage: Option<String>,
        stages: Arc<Mutex<Vec<String>>>,
    }

    impl ::metrics::HistogramFn for StageHistogram {
        fn record(&self, _value: f64) {
            if let Some(stage) = &self.stage {
                self.stages.lock().unwrap().push(stage.clone());
            }
        }
    }

    impl ::metrics::Recorder for StageRecorder {
        fn describe_counter(&self, _: ::metrics::KeyName, _: Option<::metrics::Unit>, _: ::metrics::SharedString) {}
        fn describe_gauge(&self, _: ::metrics::KeyName, _: Option<::metrics::Unit>, _: ::metrics::SharedString) {}
        fn describe_histogram(&self, _: ::metrics::KeyName, _: Option<::metrics::Unit>, _: ::metrics::SharedString) {}

        fn register_counter(&self, _: &::metrics::Key, _: &::metrics::Metadata<'_>) -> ::metrics::Counter {
            ::metrics::Counter::noop()
        }

        fn register_gauge(&self, _: &::metrics::Key, _: &::metrics::Metadata<'_>) -> ::metrics::Gauge {
            ::metrics::Gauge::noop()
        }

        fn register_histogram(&self, key: &::metrics::Key, _: &::metrics::Metadata<'_>) -> ::metrics::Histogram {
            let stage = key
                .labels()
                .find(|label| label.key() == "stage")
                .map(|label| label.value().to_string());
            ::metrics::Histogram::from_arc(Arc::new(StageHistogram {
                stage,
                stages: self.stages.clone(),
            }))
        }
    }

    #[test]
    fn test_streamed_verification_is_timed_to_last_fragment() {
        let recorder = StageRecorder::default();
        let stages = recorder.stages.clone();
        let graph = Arc::new(graph(backend(HNSW_PLAN), hnsw_passages()));

        ::metrics::with_local_recorder(&recorder, || {
            futures::executor::block_on(async {
                let mut tokens = graph.stream("What is HNSW?".to_string());

                assert!(tokens.next().await.is_some());
                assert_eq!(
                    *stages.lock().unwrap(),
                    vec!["planning", "retrieval", "summarization"]
                );

                while tokens.next().await.is_some() {}
                assert_eq!(
                    *stages.lock().unwrap(),
                    vec!["planning", "retrieval", "summarization", "verification"]
                );
            })
        });
    }
}
