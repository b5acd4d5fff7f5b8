//! Question answering handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{stream, Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Instant;
use validator::Validate;

use crate::AppState;
use ikms_common::{
    errors::{AppError, Result},
    llm::TokenStream,
    QaAnswer,
};

/// Question request
#[derive(Debug, Deserialize, Validate)]
pub struct QuestionRequest {
    #[validate(length(min = 1, max = 2000))]
    pub question: String,
}

/// Trim the question and reject blank or oversized input
fn extract_question(payload: std::result::Result<Json<QuestionRequest>, JsonRejection>) -> Result<String> {
    let Json(request) = payload.map_err(|e| AppError::InvalidFormat {
        message: e.body_text(),
    })?;

    let request = QuestionRequest {
        question: request.question.trim().to_string(),
    };
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("question".to_string()),
    })?;

    Ok(request.question)
}

/// Answer a question
pub async fn answer(
    State(state): State<AppState>,
    payload: std::result::Result<Json<QuestionRequest>, JsonRejection>,
) -> Result<Json<QaAnswer>> {
    let start = Instant::now();
    let question = extract_question(payload)?;

    let answer = state.qa.answer_question(&question).await?;

    tracing::info!(
        question_len = question.len(),
        answer_len = answer.answer.len(),
        context_len = answer.context.len(),
        latency_ms = start.elapsed().as_millis() as u64,
        "Question answered"
    );

    Ok(Json(answer))
}

/// Answer a question as Server-Sent Events
///
/// One `data` event per fragment, then a `done` event. A failure ends the
/// stream with an `error` event instead.
pub async fn answer_stream(
    State(state): State<AppState>,
    payload: std::result::Result<Json<QuestionRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let question = extract_question(payload)?;
    tracing::info!(question_len = question.len(), "Streaming answer");

    let tokens = state.qa.stream_answer(question);
    Ok(Sse::new(sse_events(tokens)).keep_alive(KeepAlive::default()))
}

fn sse_events(tokens: TokenStream) -> impl Stream<Item = std::result::Result<Event, Infallible>> {
    stream::unfold(Some((tokens, false)), |state| async move {
        let (mut tokens, mut after_cr) = state?;
        match tokens.next().await {
            Some(Ok(fragment)) => {
                let data = normalize_newlines(&fragment, &mut after_cr);
                Some((Event::default().data(data), Some((tokens, after_cr))))
            }
            Some(Err(e)) => {
                e.log();
                Some((Event::default().event("error").data(e.public_message()), None))
            }
            None => Some((Event::default().event("done").data(""), None)),
        }
    })
    .map(Ok)
}

/// SSE only splits `data` lines on `\n`, so a bare `\r` would corrupt the
/// framing. `\r\n` and `\r` become `\n`, including a pair split across
/// two fragments.
fn normalize_newlines(fragment: &str, after_cr: &mut bool) -> String {
    let mut out = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        match c {
            '\r' => {
                out.push('\n');
                *after_cr = true;
            }
            '\n' if *after_cr => *after_cr = false,
            c => {
                out.push(c);
                *after_cr = false;
            }
        }
    }
    out
}
