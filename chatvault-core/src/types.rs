//! Core domain types for chatvault
//!
//! These types represent the normalized data model that every supported log
//! format is converted into before storage.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Conversation** | A titled, dated exchange of messages |
//! | **Message** | One turn in a conversation, authored by a user or an assistant |
//! | **Log** | A raw transcript document supplied by the caller (HTML, JSON, or LINE text) |
//! | **Source** | Provenance linking an imported conversation back to its log |
//! | **Setting** | A persisted key/value preference |
//!
//! Serde attributes on these types define the import/export wire shapes, so
//! field renames here are load-bearing: exported JSON must round-trip through
//! other instances of the application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================
// Roles and message kinds
// ============================================

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// Message content kind. Only plain text today; attachments and rich
/// content would extend this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
        }
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageKind::Text),
            _ => Err(format!("unknown message kind: {}", s)),
        }
    }
}

// ============================================
// Log formats
// ============================================

/// Supported raw log formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// An HTML transcript page (or plain text wrapped into one)
    HtmlTranscript,
    /// A structured JSON export with a top-level messages array
    JsonExport,
    /// A LINE-style tab-separated text log
    LineText,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::HtmlTranscript => "html-transcript",
            LogFormat::JsonExport => "json-export",
            LogFormat::LineText => "line-text",
        }
    }

    /// Guess the format from a file path's extension.
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())?
            .to_ascii_lowercase();
        match ext.as_str() {
            "html" | "htm" => Some(LogFormat::HtmlTranscript),
            "json" => Some(LogFormat::JsonExport),
            "txt" | "log" => Some(LogFormat::LineText),
            _ => None,
        }
    }

    /// Guess the format from document content.
    ///
    /// JSON is recognized by a leading brace, markup by a leading angle
    /// bracket. Anything else is treated as text: a LINE log if an early
    /// line carries a `YYYY/M/D` date or `H:MM<TAB>` prefix, otherwise an
    /// HTML transcript (whose parser wraps plain text in a synthetic page).
    pub fn sniff(content: &str) -> Self {
        let trimmed = content.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            return LogFormat::JsonExport;
        }
        if trimmed.starts_with('<') {
            return LogFormat::HtmlTranscript;
        }
        for line in trimmed.lines().take(20) {
            if looks_like_line_log(line) {
                return LogFormat::LineText;
            }
        }
        LogFormat::HtmlTranscript
    }
}

fn looks_like_line_log(line: &str) -> bool {
    let bytes = line.as_bytes();
    // YYYY/M/D date header
    if bytes.len() >= 6 && bytes[..4].iter().all(|b| b.is_ascii_digit()) && bytes[4] == b'/' {
        return true;
    }
    // H:MM<TAB> message line
    if let Some(tab) = line.find('\t') {
        let stamp = &line[..tab];
        return stamp.contains(':')
            && stamp
                .chars()
                .all(|c| c.is_ascii_digit() || c == ':');
    }
    false
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "html-transcript" => Ok(LogFormat::HtmlTranscript),
            "json-export" => Ok(LogFormat::JsonExport),
            "line-text" => Ok(LogFormat::LineText),
            _ => Err(format!("unknown log format: {}", s)),
        }
    }
}

// ============================================
// Conversation
// ============================================

/// Provenance of an imported conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSource {
    /// Format label of the originating log (e.g. "html-transcript")
    #[serde(rename = "type")]
    pub kind: String,
    /// Id of the log record this conversation was imported from
    pub log_id: String,
    /// Path of the original file
    pub path: String,
    /// Filename of the original file
    pub filename: String,
}

/// A titled, dated exchange of messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier (UUID v4, minted on save when empty)
    pub id: String,
    /// Display title; never empty once stored
    pub title: String,
    /// Conversation date (creation or import time)
    pub date: DateTime<Utc>,
    /// Provenance, present only for imported conversations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<LogSource>,
}

impl Conversation {
    /// Create a new conversation with a fresh id, dated now.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            date: Utc::now(),
            source: None,
        }
    }
}

// ============================================
// Message
// ============================================

/// One turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identifier (UUID v4, minted on save when empty)
    pub id: String,
    /// Owning conversation
    pub conversation_id: String,
    /// Author role
    pub role: Role,
    /// Content kind
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Message body
    pub content: String,
    /// When the message was sent
    pub timestamp: DateTime<Utc>,
}

// ============================================
// Log records
// ============================================

/// A record of a raw log document the caller has registered.
///
/// The document's content is not stored; the record tracks identity,
/// provenance, and which conversation (if any) it was imported into.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// Unique identifier (UUID v4, minted on save when empty)
    pub id: String,
    /// Path the document came from
    pub path: String,
    /// Filename (used for titles and extension-based format detection)
    pub filename: String,
    /// Declared format, when the caller knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<LogFormat>,
    /// When the record was created
    pub timestamp: DateTime<Utc>,
    /// Conversation this log was imported into, once ingested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl LogRecord {
    /// Create a record for a document at `path`, deriving the filename and
    /// guessing the format from the extension.
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        let filename = filename_of(&path);
        let format = LogFormat::from_path(&path);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            path,
            filename,
            format,
            timestamp: Utc::now(),
            conversation_id: None,
        }
    }
}

/// Last component of a path, accepting both slash styles.
pub fn filename_of(path: &str) -> String {
    path.rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
        .to_string()
}

// ============================================
// Settings
// ============================================

/// A persisted key/value preference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub id: String,
    pub value: serde_json::Value,
}

// ============================================
// Import/export payloads
// ============================================

const EXPORT_VERSION: &str = "1.0";

/// Single-conversation export payload: `{conversation, messages}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationBundle {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

impl ConversationBundle {
    /// Parse a bundle from JSON, mapping shape mismatches to
    /// [`Error::InvalidFormat`](crate::Error::InvalidFormat).
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| crate::Error::InvalidFormat(format!("conversation bundle: {}", e)))
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Full-store export payload: `{conversations, messages, version, date}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreExport {
    pub conversations: Vec<Conversation>,
    pub messages: Vec<Message>,
    pub version: String,
    pub date: DateTime<Utc>,
}

impl StoreExport {
    pub fn new(conversations: Vec<Conversation>, messages: Vec<Message>) -> Self {
        Self {
            conversations,
            messages,
            version: EXPORT_VERSION.to_string(),
            date: Utc::now(),
        }
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| crate::Error::InvalidFormat(format!("store export: {}", e)))
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Backup payload for a single conversation:
/// `{conversation, messages, backupDate, version}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupBundle {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
    pub backup_date: DateTime<Utc>,
    pub version: String,
}

impl BackupBundle {
    pub fn new(conversation: Conversation, messages: Vec<Message>) -> Self {
        Self {
            conversation,
            messages,
            backup_date: Utc::now(),
            version: EXPORT_VERSION.to_string(),
        }
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| crate::Error::InvalidFormat(format!("backup bundle: {}", e)))
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_role_round_trip() {
        assert_eq!(Role::from_str("user").unwrap(), Role::User);
        assert_eq!(Role::from_str("assistant").unwrap(), Role::Assistant);
        assert_eq!(Role::Assistant.as_str(), "assistant");
        assert!(Role::from_str("claude").is_err());
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            LogFormat::from_path("/logs/chat.html"),
            Some(LogFormat::HtmlTranscript)
        );
        assert_eq!(
            LogFormat::from_path("C:\\Users\\me\\export.JSON"),
            Some(LogFormat::JsonExport)
        );
        assert_eq!(
            LogFormat::from_path("talk.txt"),
            Some(LogFormat::LineText)
        );
        assert_eq!(LogFormat::from_path("noext"), None);
    }

    #[test]
    fn test_format_sniff() {
        assert_eq!(
            LogFormat::sniff("{\"messages\": []}"),
            LogFormat::JsonExport
        );
        assert_eq!(
            LogFormat::sniff("<!DOCTYPE html><html></html>"),
            LogFormat::HtmlTranscript
        );
        assert_eq!(
            LogFormat::sniff("2024/3/5(Tue)\n9:00\tClaude\thello"),
            LogFormat::LineText
        );
        assert_eq!(LogFormat::sniff("just some prose"), LogFormat::HtmlTranscript);
    }

    #[test]
    fn test_filename_of() {
        assert_eq!(filename_of("/a/b/c.html"), "c.html");
        assert_eq!(filename_of("C:\\logs\\talk.txt"), "talk.txt");
        assert_eq!(filename_of("bare.json"), "bare.json");
    }

    #[test]
    fn test_message_wire_names() {
        let msg = Message {
            id: "m1".into(),
            conversation_id: "c1".into(),
            role: Role::Assistant,
            kind: MessageKind::Text,
            content: "hi".into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("conversationId").is_some());
        assert_eq!(json.get("type").unwrap(), "text");
        assert_eq!(json.get("role").unwrap(), "assistant");
    }

    #[test]
    fn test_source_wire_names() {
        let source = LogSource {
            kind: "html-transcript".into(),
            log_id: "l1".into(),
            path: "/tmp/a.html".into(),
            filename: "a.html".into(),
        };
        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json.get("type").unwrap(), "html-transcript");
        assert!(json.get("logId").is_some());
    }
}
