use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A named grouping of sequential question/answer exchanges.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Generating,
    ContentCompleted,
    SvgGenerating,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, GenerationStatus::Completed | GenerationStatus::Failed)
    }
}

impl std::fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GenerationStatus::Generating => "generating",
            GenerationStatus::ContentCompleted => "content_completed",
            GenerationStatus::SvgGenerating => "svg_generating",
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Output of the content stage. Grouped in one struct so the three fields are
/// always persisted together or not at all.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ContentFields {
    pub explanation: String,
    pub related_phenomena: Vec<String>,
    pub further_questions: Vec<String>,
}

/// The persisted result (and in-progress state) of answering one question.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerationRecord {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub question: String,
    pub status: GenerationStatus,
    pub content: Option<ContentFields>,
    pub svg_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the derived conversation history fed to the prompt builder.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
}

// --- Request / response bodies ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreateConversationRequest {
    pub title: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RenameConversationRequest {
    pub title: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerateRequest {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerateResponse {
    pub record_id: Uuid,
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryResponse {
    pub success: bool,
}
