use std::collections::HashMap;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::Error;
use crate::models::{
    Conversation, ContentFields, GenerationRecord, GenerationStatus, HistoryMessage, Role,
};

/// A field-level patch applied to one record in a single write. `None` leaves
/// the field untouched; the `clear_*` flags reset stage output on retry.
#[derive(Debug, Default, Clone)]
pub struct RecordPatch {
    pub status: Option<GenerationStatus>,
    pub content: Option<ContentFields>,
    pub svg_code: Option<String>,
    pub clear_content: bool,
    pub clear_svg: bool,
}

/// In-memory store for conversations and generation records. Each method takes
/// the lock once, so a patch is atomic per record; there is no multi-record
/// transaction.
#[derive(Default)]
pub struct Store {
    conversations: RwLock<HashMap<Uuid, Conversation>>,
    records: RwLock<HashMap<Uuid, GenerationRecord>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Conversations ---

    pub fn create_conversation(&self, title: String) -> Conversation {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            title,
            created_at: now,
            updated_at: now,
        };
        self.conversations.write().insert(conversation.id, conversation.clone());
        conversation
    }

    pub fn get_conversation(&self, id: Uuid) -> Result<Conversation, Error> {
        self.conversations
            .read()
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound("conversation"))
    }

    pub fn list_conversations(&self) -> Vec<Conversation> {
        let mut all: Vec<_> = self.conversations.read().values().cloned().collect();
        all.sort_by_key(|c| c.created_at);
        all
    }

    pub fn rename_conversation(&self, id: Uuid, title: String) -> Result<Conversation, Error> {
        let mut guard = self.conversations.write();
        let conversation = guard.get_mut(&id).ok_or(Error::NotFound("conversation"))?;
        conversation.title = title;
        conversation.updated_at = Utc::now();
        Ok(conversation.clone())
    }

    /// Deletes a conversation and every record it owns.
    pub fn delete_conversation(&self, id: Uuid) -> Result<(), Error> {
        self.conversations
            .write()
            .remove(&id)
            .ok_or(Error::NotFound("conversation"))?;
        self.records.write().retain(|_, r| r.conversation_id != id);
        Ok(())
    }

    // --- Records ---

    pub fn insert_record(&self, conversation_id: Uuid, question: String) -> GenerationRecord {
        let now = Utc::now();
        let record = GenerationRecord {
            id: Uuid::new_v4(),
            conversation_id,
            question,
            status: GenerationStatus::Generating,
            content: None,
            svg_code: None,
            created_at: now,
            updated_at: now,
        };
        self.records.write().insert(record.id, record.clone());
        record
    }

    pub fn get_record(&self, id: Uuid) -> Result<GenerationRecord, Error> {
        self.records
            .read()
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound("record"))
    }

    pub fn patch_record(&self, id: Uuid, patch: RecordPatch) -> Result<GenerationRecord, Error> {
        let mut guard = self.records.write();
        let record = guard.get_mut(&id).ok_or(Error::NotFound("record"))?;
        if patch.clear_content {
            record.content = None;
        }
        if patch.clear_svg {
            record.svg_code = None;
        }
        if let Some(status) = patch.status {
            record.status = status;
        }
        if let Some(content) = patch.content {
            record.content = Some(content);
        }
        if let Some(svg) = patch.svg_code {
            record.svg_code = Some(svg);
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    pub fn records_by_conversation(&self, conversation_id: Uuid) -> Vec<GenerationRecord> {
        let mut records: Vec<_> = self
            .records
            .read()
            .values()
            .filter(|r| r.conversation_id == conversation_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    pub fn delete_record(&self, id: Uuid) -> Result<(), Error> {
        self.records
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or(Error::NotFound("record"))
    }

    /// Derived conversation history: a user/assistant message pair per
    /// completed record, oldest first. Only the core explanation text is fed
    /// back; in-flight and failed records are skipped.
    pub fn conversation_history(&self, conversation_id: Uuid) -> Vec<HistoryMessage> {
        let mut messages = Vec::new();
        for record in self.records_by_conversation(conversation_id) {
            if record.status != GenerationStatus::Completed {
                continue;
            }
            if let Some(content) = &record.content {
                messages.push(HistoryMessage {
                    role: Role::User,
                    content: record.question.clone(),
                });
                messages.push(HistoryMessage {
                    role: Role::Assistant,
                    content: content.explanation.clone(),
                });
            }
        }
        messages
    }
}
