//! Document store over SQLite
//!
//! [`Store`] exposes the named collections (`conversations`, `messages`,
//! `logs`, `settings`) with primary-key upsert, point get, full scan,
//! secondary-index scan, delete, and clear. It holds a single connection
//! behind a mutex; the mutex serializes access, so operations complete in
//! issuance order.
//!
//! A store is not usable until [`Store::migrate`] has run; every operation
//! before that returns [`Error::StorageNotReady`].

use crate::error::{Error, Result};
use crate::types::{Conversation, LogFormat, LogRecord, LogSource, Message, MessageKind, Role, Setting};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Store handle (single connection)
pub struct Store {
    conn: Mutex<Connection>,
    ready: AtomicBool,
}

impl Store {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(Error::storage("open"))?;

        // Foreign keys and WAL for better concurrency
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )
        .map_err(Error::storage("open"))?;

        Ok(Self {
            conn: Mutex::new(conn),
            ready: AtomicBool::new(false),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::storage("open_in_memory"))?;
        conn.execute("PRAGMA foreign_keys = ON", [])
            .map_err(Error::storage("open_in_memory"))?;
        Ok(Self {
            conn: Mutex::new(conn),
            ready: AtomicBool::new(false),
        })
    }

    /// Run migrations and mark the store ready for use
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)?;
        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        if !self.ready.load(Ordering::Acquire) {
            return Err(Error::StorageNotReady);
        }
        Ok(self.conn.lock().unwrap())
    }

    // ============================================
    // Conversations
    // ============================================

    /// Insert or update a conversation by id
    pub fn upsert_conversation(&self, conversation: &Conversation) -> Result<()> {
        let conn = self.lock()?;
        let source_json = conversation
            .source
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        conn.execute(
            r#"
            INSERT INTO conversations (id, title, date, source)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                date = excluded.date,
                source = excluded.source
            "#,
            params![
                conversation.id,
                conversation.title,
                conversation.date.to_rfc3339(),
                source_json,
            ],
        )
        .map_err(Error::storage("upsert_conversation"))?;
        Ok(())
    }

    /// Get a conversation by id
    pub fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT * FROM conversations WHERE id = ?",
            [id],
            row_to_conversation,
        )
        .optional()
        .map_err(Error::storage("get_conversation"))
    }

    /// All conversations, newest first
    pub fn all_conversations(&self) -> Result<Vec<Conversation>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT * FROM conversations ORDER BY date DESC")
            .map_err(Error::storage("all_conversations"))?;
        let rows = stmt
            .query_map([], row_to_conversation)
            .map_err(Error::storage("all_conversations"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::storage("all_conversations"))
    }

    /// Delete a conversation row. Returns whether a row existed.
    pub fn delete_conversation(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute("DELETE FROM conversations WHERE id = ?", [id])
            .map_err(Error::storage("delete_conversation"))?;
        Ok(n > 0)
    }

    /// Remove every conversation
    pub fn clear_conversations(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM conversations", [])
            .map_err(Error::storage("clear_conversations"))?;
        Ok(())
    }

    // ============================================
    // Messages
    // ============================================

    /// Insert or update a message by id
    pub fn upsert_message(&self, message: &Message) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO messages (id, conversation_id, role, kind, content, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                conversation_id = excluded.conversation_id,
                role = excluded.role,
                kind = excluded.kind,
                content = excluded.content,
                timestamp = excluded.timestamp
            "#,
            params![
                message.id,
                message.conversation_id,
                message.role.as_str(),
                message.kind.as_str(),
                message.content,
                message.timestamp.to_rfc3339(),
            ],
        )
        .map_err(Error::storage("upsert_message"))?;
        Ok(())
    }

    /// Get a message by id
    pub fn get_message(&self, id: &str) -> Result<Option<Message>> {
        let conn = self.lock()?;
        conn.query_row("SELECT * FROM messages WHERE id = ?", [id], row_to_message)
            .optional()
            .map_err(Error::storage("get_message"))
    }

    /// Messages of one conversation, by timestamp with insertion order as
    /// the tiebreaker
    pub fn messages_for_conversation(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT * FROM messages WHERE conversation_id = ? ORDER BY timestamp ASC, rowid ASC",
            )
            .map_err(Error::storage("messages_for_conversation"))?;
        let rows = stmt
            .query_map([conversation_id], row_to_message)
            .map_err(Error::storage("messages_for_conversation"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::storage("messages_for_conversation"))
    }

    /// Every message in the store, grouped by conversation
    pub fn all_messages(&self) -> Result<Vec<Message>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT * FROM messages ORDER BY conversation_id, timestamp ASC, rowid ASC")
            .map_err(Error::storage("all_messages"))?;
        let rows = stmt
            .query_map([], row_to_message)
            .map_err(Error::storage("all_messages"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::storage("all_messages"))
    }

    /// Delete a message. Returns whether a row existed.
    pub fn delete_message(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute("DELETE FROM messages WHERE id = ?", [id])
            .map_err(Error::storage("delete_message"))?;
        Ok(n > 0)
    }

    /// Remove every message
    pub fn clear_messages(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM messages", [])
            .map_err(Error::storage("clear_messages"))?;
        Ok(())
    }

    // ============================================
    // Log records
    // ============================================

    /// Insert or update a log record by id
    pub fn upsert_log(&self, log: &LogRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO logs (id, path, filename, format, timestamp, conversation_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                path = excluded.path,
                filename = excluded.filename,
                format = excluded.format,
                timestamp = excluded.timestamp,
                conversation_id = excluded.conversation_id
            "#,
            params![
                log.id,
                log.path,
                log.filename,
                log.format.map(|f| f.as_str()),
                log.timestamp.to_rfc3339(),
                log.conversation_id,
            ],
        )
        .map_err(Error::storage("upsert_log"))?;
        Ok(())
    }

    /// Get a log record by id
    pub fn get_log(&self, id: &str) -> Result<Option<LogRecord>> {
        let conn = self.lock()?;
        conn.query_row("SELECT * FROM logs WHERE id = ?", [id], row_to_log)
            .optional()
            .map_err(Error::storage("get_log"))
    }

    /// Most recent log record for a path
    pub fn log_for_path(&self, path: &str) -> Result<Option<LogRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT * FROM logs WHERE path = ? ORDER BY timestamp DESC LIMIT 1",
            [path],
            row_to_log,
        )
        .optional()
        .map_err(Error::storage("log_for_path"))
    }

    /// All log records, newest first
    pub fn all_logs(&self) -> Result<Vec<LogRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT * FROM logs ORDER BY timestamp DESC")
            .map_err(Error::storage("all_logs"))?;
        let rows = stmt
            .query_map([], row_to_log)
            .map_err(Error::storage("all_logs"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::storage("all_logs"))
    }

    /// Delete a log record. Returns whether a row existed.
    pub fn delete_log(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute("DELETE FROM logs WHERE id = ?", [id])
            .map_err(Error::storage("delete_log"))?;
        Ok(n > 0)
    }

    // ============================================
    // Settings
    // ============================================

    /// Set one setting
    pub fn put_setting(&self, id: &str, value: &serde_json::Value) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO settings (id, value) VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET value = excluded.value
            "#,
            params![id, value.to_string()],
        )
        .map_err(Error::storage("put_setting"))?;
        Ok(())
    }

    /// Get one setting
    pub fn get_setting(&self, id: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row("SELECT value FROM settings WHERE id = ?", [id], |r| {
                r.get(0)
            })
            .optional()
            .map_err(Error::storage("get_setting"))?;
        Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
    }

    /// All settings
    pub fn all_settings(&self) -> Result<Vec<Setting>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, value FROM settings")
            .map_err(Error::storage("all_settings"))?;
        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let raw: String = row.get(1)?;
                Ok(Setting {
                    id,
                    value: serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null),
                })
            })
            .map_err(Error::storage("all_settings"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::storage("all_settings"))
    }

    /// Delete one setting. Returns whether a row existed.
    pub fn delete_setting(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute("DELETE FROM settings WHERE id = ?", [id])
            .map_err(Error::storage("delete_setting"))?;
        Ok(n > 0)
    }
}

// ============================================
// Row mappers
// ============================================

fn row_to_conversation(row: &Row) -> rusqlite::Result<Conversation> {
    let date_str: String = row.get("date")?;
    let source_str: Option<String> = row.get("source")?;

    Ok(Conversation {
        id: row.get("id")?,
        title: row.get("title")?,
        date: parse_stored_timestamp(&date_str),
        source: source_str.and_then(|s| serde_json::from_str::<LogSource>(&s).ok()),
    })
}

fn row_to_message(row: &Row) -> rusqlite::Result<Message> {
    let role_str: String = row.get("role")?;
    let kind_str: String = row.get("kind")?;
    let ts_str: String = row.get("timestamp")?;

    Ok(Message {
        id: row.get("id")?,
        conversation_id: row.get("conversation_id")?,
        role: Role::from_str(&role_str).unwrap_or(Role::User),
        kind: MessageKind::from_str(&kind_str).unwrap_or(MessageKind::Text),
        content: row.get("content")?,
        timestamp: parse_stored_timestamp(&ts_str),
    })
}

fn row_to_log(row: &Row) -> rusqlite::Result<LogRecord> {
    let ts_str: String = row.get("timestamp")?;
    let format_str: Option<String> = row.get("format")?;

    Ok(LogRecord {
        id: row.get("id")?,
        path: row.get("path")?,
        filename: row.get("filename")?,
        format: format_str.and_then(|s| LogFormat::from_str(&s).ok()),
        timestamp: parse_stored_timestamp(&ts_str),
        conversation_id: row.get("conversation_id")?,
    })
}

fn parse_stored_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store.migrate().unwrap();
        store
    }

    fn conversation(id: &str, title: &str) -> Conversation {
        Conversation {
            id: id.to_string(),
            title: title.to_string(),
            date: Utc::now(),
            source: None,
        }
    }

    fn message(id: &str, conversation_id: &str, content: &str) -> Message {
        Message {
            id: id.to_string(),
            conversation_id: conversation_id.to_string(),
            role: Role::User,
            kind: MessageKind::Text,
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_not_ready_before_migrate() {
        let store = Store::open_in_memory().unwrap();
        let err = store.all_conversations().unwrap_err();
        assert!(matches!(err, Error::StorageNotReady));
    }

    #[test]
    fn test_conversation_round_trip() {
        let store = store();
        let mut conv = conversation("c1", "hello");
        conv.source = Some(LogSource {
            kind: "line-text".into(),
            log_id: "l1".into(),
            path: "/tmp/a.txt".into(),
            filename: "a.txt".into(),
        });
        store.upsert_conversation(&conv).unwrap();

        let got = store.get_conversation("c1").unwrap().unwrap();
        assert_eq!(got.title, "hello");
        assert_eq!(got.source.unwrap().log_id, "l1");
        assert!(store.get_conversation("nope").unwrap().is_none());
    }

    #[test]
    fn test_upsert_overwrites() {
        let store = store();
        store.upsert_conversation(&conversation("c1", "old")).unwrap();
        store.upsert_conversation(&conversation("c1", "new")).unwrap();
        let got = store.get_conversation("c1").unwrap().unwrap();
        assert_eq!(got.title, "new");
        assert_eq!(store.all_conversations().unwrap().len(), 1);
    }

    #[test]
    fn test_message_order_ties_broken_by_insertion() {
        let store = store();
        store.upsert_conversation(&conversation("c1", "t")).unwrap();
        let ts = Utc::now();
        for (id, content) in [("m1", "first"), ("m2", "second"), ("m3", "third")] {
            let mut m = message(id, "c1", content);
            m.timestamp = ts;
            store.upsert_message(&m).unwrap();
        }
        let got = store.messages_for_conversation("c1").unwrap();
        let contents: Vec<_> = got.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["first", "second", "third"]);
    }

    #[test]
    fn test_all_messages_grouped_by_conversation() {
        let store = store();
        store.upsert_conversation(&conversation("c1", "t")).unwrap();
        store.upsert_conversation(&conversation("c2", "u")).unwrap();
        store.upsert_message(&message("m1", "c2", "late")).unwrap();
        store.upsert_message(&message("m2", "c1", "early")).unwrap();
        let all = store.all_messages().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].conversation_id, "c1");
        assert_eq!(all[1].conversation_id, "c2");
    }

    #[test]
    fn test_log_record_round_trip_and_path_lookup() {
        let store = store();
        let log = LogRecord::new("/var/log/chat.html");
        store.upsert_log(&log).unwrap();

        let got = store.log_for_path("/var/log/chat.html").unwrap().unwrap();
        assert_eq!(got.id, log.id);
        assert_eq!(got.filename, "chat.html");
        assert_eq!(got.format, Some(LogFormat::HtmlTranscript));
        assert!(got.conversation_id.is_none());
    }

    #[test]
    fn test_settings_round_trip() {
        let store = store();
        store
            .put_setting("ui.theme", &serde_json::json!("dark"))
            .unwrap();
        store
            .put_setting("ui.theme", &serde_json::json!("light"))
            .unwrap();
        assert_eq!(
            store.get_setting("ui.theme").unwrap(),
            Some(serde_json::json!("light"))
        );
        assert_eq!(store.all_settings().unwrap().len(), 1);
        assert!(store.delete_setting("ui.theme").unwrap());
        assert!(store.get_setting("ui.theme").unwrap().is_none());
    }

    #[test]
    fn test_delete_returns_existence() {
        let store = store();
        store.upsert_conversation(&conversation("c1", "t")).unwrap();
        assert!(store.delete_conversation("c1").unwrap());
        assert!(!store.delete_conversation("c1").unwrap());
    }
}
