//! Conversation message types

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// Payload kind of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Audio,
}

impl MessageKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Audio => "audio",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "audio" => Some(Self::Audio),
            _ => None,
        }
    }
}

/// One entry in the conversation log
///
/// `content` holds the text payload for text messages and the
/// transcript for audio messages (empty while transcription is
/// pending). Audio messages additionally carry their WAV bytes.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub kind: MessageKind,
    pub content: String,
    /// Encoded WAV bytes, present only for `MessageKind::Audio`
    pub audio: Option<Vec<u8>>,
    /// Milliseconds since epoch; the sole sort key for the log
    pub timestamp: i64,
    /// Whether this message has landed in the store. Cleared whenever
    /// content changes so the reconciliation sweep rewrites the record.
    pub persisted: bool,
}

impl Message {
    /// Create a message with a fresh id and the current timestamp
    #[must_use]
    pub fn new(role: Role, kind: MessageKind, content: String, audio: Option<Vec<u8>>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            kind,
            content,
            audio,
            timestamp: now_millis(),
            persisted: false,
        }
    }

    /// Wire form sent to the backend as part of `messageHistory`
    #[must_use]
    pub fn history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            role: self.role.as_str().to_string(),
            content: self.content.clone(),
        }
    }
}

/// `{role, content}` pair serialized into the `messageHistory` field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

/// Current wall-clock time in milliseconds since epoch
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Timestamp for a reply, strictly after the message it answers
///
/// Falls back to `user_timestamp + 1` when the clock has not advanced,
/// so a reply never sorts at or before its prompt.
#[must_use]
pub fn reply_timestamp(user_timestamp: i64) -> i64 {
    now_millis().max(user_timestamp + 1)
}
