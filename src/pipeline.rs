use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{Error, FailureKind};
use crate::models::{ContentFields, GenerationRecord, GenerationStatus};
use crate::openrouter::CompletionModel;
use crate::prompt;
use crate::store::{RecordPatch, Store};
use crate::structured;

/// Result of one completed pipeline stage, fed to `advance`.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    Content(ContentFields),
    SvgStarted,
    Svg(String),
    Failed(String),
}

/// Terminal report of one pipeline run. A generation failure is captured here
/// after the `failed` status write; it does not propagate as an error.
#[derive(Debug)]
pub struct RunReport {
    pub record_id: Uuid,
    pub failure: Option<(FailureKind, String)>,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Each stage outcome is legal from exactly one source state, except failure,
/// which is legal from any non-terminal state.
fn transition_allowed(from: GenerationStatus, outcome: &StageOutcome) -> bool {
    use GenerationStatus::*;
    match outcome {
        StageOutcome::Content(_) => from == Generating,
        StageOutcome::SvgStarted => from == ContentCompleted,
        StageOutcome::Svg(_) => from == SvgGenerating,
        StageOutcome::Failed(_) => !from.is_terminal(),
    }
}

/// Drives one record through the generation state machine:
/// `generating -> content_completed -> svg_generating -> completed`, with
/// `failed` reachable from any non-terminal state.
pub struct Pipeline {
    store: Arc<Store>,
    model: Arc<dyn CompletionModel>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(store: Arc<Store>, model: Arc<dyn CompletionModel>, config: PipelineConfig) -> Self {
        Self { store, model, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Creates a fresh record in `generating` state. Not idempotent: every
    /// call creates a new record, duplicate submissions are the edge's
    /// problem to debounce.
    pub fn begin_generation(&self, conversation_id: Uuid, question: &str) -> Result<GenerationRecord, Error> {
        let question = prompt::validate_question(question)?;
        self.store.get_conversation(conversation_id)?;
        let record = self.store.insert_record(conversation_id, question.to_string());
        info!(record_id = %record.id, %conversation_id, "🚀 Generation started: {}", question);
        Ok(record)
    }

    /// Read-only status projection, safe to poll.
    pub fn observe_status(&self, record_id: Uuid) -> Result<GenerationRecord, Error> {
        self.store.get_record(record_id)
    }

    fn target_status(&self, outcome: &StageOutcome) -> GenerationStatus {
        match outcome {
            StageOutcome::Content(_) if self.config.svg_stage => GenerationStatus::ContentCompleted,
            // Without a visual stage the content stage completes the record.
            StageOutcome::Content(_) => GenerationStatus::Completed,
            StageOutcome::SvgStarted => GenerationStatus::SvgGenerating,
            StageOutcome::Svg(_) => GenerationStatus::Completed,
            StageOutcome::Failed(_) => GenerationStatus::Failed,
        }
    }

    /// Applies one legal stage transition, persisting stage output atomically
    /// with the status write. Anything else is an `InvalidTransition`.
    pub fn advance(&self, record_id: Uuid, outcome: StageOutcome) -> Result<GenerationRecord, Error> {
        let record = self.store.get_record(record_id)?;
        let target = self.target_status(&outcome);
        if !transition_allowed(record.status, &outcome) {
            return Err(Error::InvalidTransition { from: record.status, to: target });
        }

        let patch = match outcome {
            StageOutcome::Content(content) => {
                RecordPatch { status: Some(target), content: Some(content), ..Default::default() }
            }
            StageOutcome::Svg(code) => {
                RecordPatch { status: Some(target), svg_code: Some(code), ..Default::default() }
            }
            // Failure retains prior stage output; only the status moves.
            StageOutcome::SvgStarted | StageOutcome::Failed(_) => {
                RecordPatch { status: Some(target), ..Default::default() }
            }
        };
        self.store.patch_record(record_id, patch)
    }

    /// Runs the full pipeline once, end to end. Returns only after the record
    /// reached a terminal state. Boundary errors (bad question, unknown
    /// conversation) surface before any record exists.
    pub async fn generate(&self, conversation_id: Uuid, question: &str) -> Result<RunReport, Error> {
        let record = self.begin_generation(conversation_id, question)?;
        self.run_stages(&record).await
    }

    /// User-initiated retry: resets the record to `generating`, clearing all
    /// stage output while keeping the original question, then re-runs the
    /// stages against the history as of this moment.
    pub async fn retry(&self, record_id: Uuid) -> Result<RunReport, Error> {
        let record = self.store.get_record(record_id)?;
        info!(record_id = %record.id, "🔄 Retrying generation: {}", record.question);
        let record = self.store.patch_record(
            record_id,
            RecordPatch {
                status: Some(GenerationStatus::Generating),
                clear_content: true,
                clear_svg: true,
                ..Default::default()
            },
        )?;
        self.run_stages(&record).await
    }

    async fn run_stages(&self, record: &GenerationRecord) -> Result<RunReport, Error> {
        match self.drive(record).await {
            Ok(()) => {
                info!(record_id = %record.id, "✅ Generation completed");
                Ok(RunReport { record_id: record.id, failure: None })
            }
            Err(Error::Generation { kind, cause }) => {
                error!(record_id = %record.id, %kind, "❌ Generation failed: {}", cause);
                self.advance(record.id, StageOutcome::Failed(cause.clone()))?;
                Ok(RunReport { record_id: record.id, failure: Some((kind, cause)) })
            }
            // InvalidTransition and friends are caller bugs, not generation
            // failures; they surface directly.
            Err(other) => Err(other),
        }
    }

    async fn drive(&self, record: &GenerationRecord) -> Result<(), Error> {
        // History is a snapshot taken at run start; concurrent completions in
        // the same conversation are not picked up mid-run.
        let history = self.store.conversation_history(record.conversation_id);

        let content_prompt = prompt::build_content_prompt(&record.question, &history);
        let content = structured::invoke_content(self.model.as_ref(), &content_prompt).await?;
        self.advance(record.id, StageOutcome::Content(content.clone()))?;

        if !self.config.svg_stage {
            return Ok(());
        }

        self.advance(record.id, StageOutcome::SvgStarted)?;
        let svg_prompt =
            prompt::build_svg_prompt(&record.question, &content.explanation, &content.related_phenomena);
        let svg = structured::invoke_svg(self.model.as_ref(), &svg_prompt).await?;
        self.advance(record.id, StageOutcome::Svg(svg))?;
        Ok(())
    }
}
