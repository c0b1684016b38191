use axum::{Json, extract::{Path, State}};
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

use crate::error::Error;
use crate::models::{
    Conversation, CreateConversationRequest, GenerationRecord, GenerateRequest, GenerateResponse,
    RenameConversationRequest, RetryResponse,
};
use crate::pipeline::{Pipeline, RunReport};
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub pipeline: Arc<Pipeline>,
}

pub async fn create_conversation(
    State(state): State<AppState>,
    Json(body): Json<CreateConversationRequest>,
) -> Result<Json<Conversation>, Error> {
    if body.title.trim().is_empty() {
        return Err(Error::Validation("title must not be empty".into()));
    }
    let conversation = state.store.create_conversation(body.title.trim().to_string());
    tracing::info!(conversation_id = %conversation.id, "Created conversation: {}", conversation.title);
    Ok(Json(conversation))
}

pub async fn list_conversations(State(state): State<AppState>) -> Json<Vec<Conversation>> {
    Json(state.store.list_conversations())
}

pub async fn rename_conversation(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<RenameConversationRequest>,
) -> Result<Json<Conversation>, Error> {
    if body.title.trim().is_empty() {
        return Err(Error::Validation("title must not be empty".into()));
    }
    let conversation = state.store.rename_conversation(id, body.title.trim().to_string())?;
    Ok(Json(conversation))
}

pub async fn delete_conversation(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, Error> {
    state.store.delete_conversation(id)?;
    tracing::info!(conversation_id = %id, "Deleted conversation and its records");
    Ok(Json(serde_json::json!({ "deleted": true })))
}

pub async fn conversation_records(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Vec<GenerationRecord>>, Error> {
    state.store.get_conversation(id)?;
    Ok(Json(state.store.records_by_conversation(id)))
}

/// Runs the full pipeline for one question and returns after the record is
/// terminal. Transient failures (network, timeout) are re-driven through the
/// retry path with increasing delay, up to the configured attempt budget.
pub async fn generate(
    Path(conversation_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, Error> {
    let mut report = state.pipeline.generate(conversation_id, &body.question).await?;
    report = drive_transient_retries(&state.pipeline, report).await?;
    Ok(Json(GenerateResponse { record_id: report.record_id, success: report.success() }))
}

/// User-initiated retry of an existing (typically failed) record.
pub async fn retry_generation(
    Path(record_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<RetryResponse>, Error> {
    let report = state.pipeline.retry(record_id).await?;
    Ok(Json(RetryResponse { success: report.success() }))
}

/// Status projection for polling UIs: current state plus whatever fields the
/// completed stages have produced so far.
pub async fn get_record(
    Path(record_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<GenerationRecord>, Error> {
    Ok(Json(state.pipeline.observe_status(record_id)?))
}

async fn drive_transient_retries(pipeline: &Pipeline, mut report: RunReport) -> Result<RunReport, Error> {
    let budget = pipeline.config().max_attempts;
    let mut attempt = 1;
    while let Some((kind, cause)) = &report.failure {
        if !kind.is_transient() || attempt >= budget {
            break;
        }
        tracing::info!(
            record_id = %report.record_id,
            attempt = attempt + 1,
            "Transient failure ({kind}): {cause}; retrying"
        );
        tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
        report = pipeline.retry(report.record_id).await?;
        attempt += 1;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::error::FailureKind;
    use crate::models::GenerationStatus;
    use crate::openrouter::CompletionModel;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Reply {
        Text(String),
        Fail(FailureKind, &'static str),
    }

    /// Scripted model that also counts how often the edge drove it.
    struct CountingModel {
        replies: Mutex<VecDeque<Reply>>,
        calls: AtomicUsize,
    }

    impl CountingModel {
        fn new(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self { replies: Mutex::new(replies.into()), calls: AtomicUsize::new(0) })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl CompletionModel for CountingModel {
        async fn complete(&self, _prompt: &str, _temperature: f32) -> Result<String, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.replies.lock().pop_front().expect("script exhausted") {
                Reply::Text(text) => Ok(text),
                Reply::Fail(kind, cause) => Err(Error::generation(kind, cause)),
            }
        }
    }

    fn content_reply() -> Reply {
        Reply::Text(
            serde_json::json!({
                "explanation": "Sunlight scatters off air molecules and the short blue wavelengths scatter the most strongly.",
                "related_phenomena": ["Red sunsets", "Blue mountains", "White clouds"],
                "further_questions": ["Why red sunsets?", "Why blue ocean?", "Where is this used?"]
            })
            .to_string(),
        )
    }

    fn setup(replies: Vec<Reply>) -> (Arc<Store>, Arc<CountingModel>, Pipeline) {
        let store = Arc::new(Store::new());
        let model = CountingModel::new(replies);
        // Content stage only, so each attempt costs exactly one model call.
        let config = PipelineConfig { svg_stage: false, max_attempts: 3 };
        let pipeline = Pipeline::new(store.clone(), model.clone(), config);
        (store, model, pipeline)
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_redriven_to_success_within_budget() {
        let (store, model, pipeline) = setup(vec![
            Reply::Fail(FailureKind::Network, "connection reset"),
            Reply::Fail(FailureKind::Network, "connection reset"),
            content_reply(),
        ]);
        let conversation = store.create_conversation("flaky".into());

        let report = pipeline.generate(conversation.id, "why is the sky blue?").await.unwrap();
        let report = drive_transient_retries(&pipeline, report).await.unwrap();

        assert!(report.success());
        assert_eq!(model.calls(), 3);
        let record = pipeline.observe_status(report.record_id).unwrap();
        assert_eq!(record.status, GenerationStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_surfaces_terminal_failure() {
        let (store, model, pipeline) = setup(vec![
            Reply::Fail(FailureKind::Timeout, "deadline exceeded"),
            Reply::Fail(FailureKind::Timeout, "deadline exceeded"),
            Reply::Fail(FailureKind::Timeout, "deadline exceeded"),
        ]);
        let conversation = store.create_conversation("down".into());

        let report = pipeline.generate(conversation.id, "why do tides exist?").await.unwrap();
        let report = drive_transient_retries(&pipeline, report).await.unwrap();

        assert!(!report.success());
        assert_eq!(model.calls(), 3, "three total attempts, no more");
        let record = pipeline.observe_status(report.record_id).unwrap();
        assert_eq!(record.status, GenerationStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_failures_are_not_redriven() {
        let bad_shape = Reply::Text(
            serde_json::json!({
                "explanation": "An explanation easily longer than the required fifty characters in total.",
                "related_phenomena": ["only", "two"],
                "further_questions": ["a?", "b?", "c?"]
            })
            .to_string(),
        );
        let (store, model, pipeline) = setup(vec![bad_shape]);
        let conversation = store.create_conversation("malformed".into());

        let report = pipeline.generate(conversation.id, "why do magnets attract?").await.unwrap();
        let report = drive_transient_retries(&pipeline, report).await.unwrap();

        assert!(!report.success());
        assert_eq!(report.failure.as_ref().unwrap().0, FailureKind::Schema);
        assert_eq!(model.calls(), 1, "schema failures burn no retry budget");
    }
}
