//! Conversation repository
//!
//! Semantic operations layered over [`Store`]: saving with id minting,
//! cascade deletion, search, export/import, and backup/restore. The store
//! handle is injected at construction, so several repositories (and the
//! ingestor) can share one database.

use crate::db::Store;
use crate::error::{Error, Result};
use crate::types::{
    BackupBundle, Conversation, ConversationBundle, LogRecord, Message, Setting, StoreExport,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Title given to conversations saved without one
const UNTITLED: &str = "Untitled conversation";

/// Suffix appended to restored conversation titles
const RESTORED_SUFFIX: &str = " (restored)";

/// Result of restoring a conversation from a backup
#[derive(Debug, Clone)]
pub struct RestoreSummary {
    /// Id the conversation had inside the backup
    pub original_id: String,
    /// Freshly minted id of the restored copy
    pub conversation_id: String,
    /// Number of messages restored
    pub message_count: usize,
}

/// Counts from a full-store import
#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    pub conversations: usize,
    pub messages: usize,
}

/// Repository over an injected store handle
#[derive(Clone)]
pub struct Repository {
    store: Arc<Store>,
}

impl Repository {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// The underlying store (for advanced use)
    pub fn store(&self) -> &Store {
        &self.store
    }

    // ============================================
    // Conversations
    // ============================================

    /// Save a conversation, minting an id and defaulting the title when
    /// they are empty. Returns the stored record.
    pub fn save_conversation(&self, mut conversation: Conversation) -> Result<Conversation> {
        if conversation.id.trim().is_empty() {
            conversation.id = Uuid::new_v4().to_string();
        }
        if conversation.title.trim().is_empty() {
            conversation.title = UNTITLED.to_string();
        }
        self.store.upsert_conversation(&conversation)?;
        Ok(conversation)
    }

    /// Get a conversation by id
    pub fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        self.store.get_conversation(id)
    }

    /// All conversations, newest first
    pub fn all_conversations(&self) -> Result<Vec<Conversation>> {
        self.store.all_conversations()
    }

    /// Messages of a conversation in display order
    pub fn messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.store.messages_for_conversation(conversation_id)
    }

    /// Save a message, minting an id when empty. The message must carry a
    /// conversation id.
    pub fn save_message(&self, mut message: Message) -> Result<Message> {
        if message.conversation_id.trim().is_empty() {
            return Err(Error::InvalidFormat(
                "message without a conversationId".to_string(),
            ));
        }
        if message.id.trim().is_empty() {
            message.id = Uuid::new_v4().to_string();
        }
        self.store.upsert_message(&message)?;
        Ok(message)
    }

    /// Delete a conversation and its messages.
    ///
    /// Deletion is best effort: every message is attempted even after a
    /// failure, and the first error is returned once the sweep finishes,
    /// so a partial failure (orphaned messages) is never silent.
    pub fn delete_conversation(&self, id: &str) -> Result<()> {
        self.store.delete_conversation(id)?;

        let messages = self.store.messages_for_conversation(id)?;
        let mut first_err: Option<Error> = None;
        for message in &messages {
            if let Err(err) = self.store.delete_message(&message.id) {
                tracing::warn!(
                    conversation_id = id,
                    message_id = %message.id,
                    %err,
                    "failed to delete message during cascade"
                );
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // ============================================
    // Search
    // ============================================

    /// Case-insensitive substring search over conversation titles and
    /// message content. Empty or whitespace-only text short-circuits to an
    /// empty result. Matches are deduplicated and sorted newest first.
    ///
    /// Comparison happens in Rust with Unicode lowercasing on both sides,
    /// so non-ASCII case ("CAFÉ" vs "café") still matches.
    pub fn search_conversations(&self, text: &str) -> Result<Vec<Conversation>> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let mut results: Vec<Conversation> = self
            .store
            .all_conversations()?
            .into_iter()
            .filter(|c| c.title.to_lowercase().contains(&needle))
            .collect();

        for message in self.store.all_messages()? {
            if !message.content.to_lowercase().contains(&needle) {
                continue;
            }
            if results.iter().any(|c| c.id == message.conversation_id) {
                continue;
            }
            if let Some(conversation) = self.store.get_conversation(&message.conversation_id)? {
                results.push(conversation);
            }
        }

        results.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(results)
    }

    // ============================================
    // Export / import
    // ============================================

    /// Export one conversation with its messages
    pub fn export_conversation(&self, id: &str) -> Result<ConversationBundle> {
        let conversation = self.store.get_conversation(id)?.ok_or_else(|| Error::NotFound {
            entity: "conversation",
            id: id.to_string(),
        })?;
        let messages = self.store.messages_for_conversation(id)?;
        Ok(ConversationBundle {
            conversation,
            messages,
        })
    }

    /// Import a conversation bundle, keeping its ids (minting only where
    /// they are empty). Returns the conversation id.
    pub fn import_conversation(&self, bundle: ConversationBundle) -> Result<String> {
        let conversation = self.save_conversation(bundle.conversation)?;
        for mut message in bundle.messages {
            message.conversation_id = conversation.id.clone();
            self.save_message(message)?;
        }
        Ok(conversation.id)
    }

    /// Export the entire store
    pub fn export_all(&self) -> Result<StoreExport> {
        Ok(StoreExport::new(
            self.store.all_conversations()?,
            self.store.all_messages()?,
        ))
    }

    /// Import a full-store export. With `clear_existing` the current
    /// conversations and messages are removed first.
    pub fn import_all(&self, export: StoreExport, clear_existing: bool) -> Result<ImportSummary> {
        if clear_existing {
            self.store.clear_messages()?;
            self.store.clear_conversations()?;
        }

        let mut summary = ImportSummary::default();
        for conversation in export.conversations {
            self.save_conversation(conversation)?;
            summary.conversations += 1;
        }
        for message in export.messages {
            if message.conversation_id.trim().is_empty() {
                tracing::warn!(message_id = %message.id, "skipping message without conversationId");
                continue;
            }
            self.save_message(message)?;
            summary.messages += 1;
        }
        tracing::info!(
            conversations = summary.conversations,
            messages = summary.messages,
            "store import complete"
        );
        Ok(summary)
    }

    // ============================================
    // Backup / restore
    // ============================================

    /// Build a backup bundle for one conversation
    pub fn backup_conversation(&self, id: &str) -> Result<BackupBundle> {
        let bundle = self.export_conversation(id)?;
        Ok(BackupBundle::new(bundle.conversation, bundle.messages))
    }

    /// Restore a conversation from a backup as a new copy.
    ///
    /// Fresh ids are always minted (restoring next to the original must
    /// not collide with it) and the title gains a "(restored)" suffix.
    /// Message timestamps are preserved.
    pub fn restore_conversation(&self, backup: &BackupBundle) -> Result<RestoreSummary> {
        let original_id = backup.conversation.id.clone();

        let mut conversation = backup.conversation.clone();
        conversation.id = Uuid::new_v4().to_string();
        conversation.title = format!("{}{}", conversation.title, RESTORED_SUFFIX);
        conversation.date = chrono::Utc::now();
        let conversation = self.save_conversation(conversation)?;

        let mut count = 0usize;
        for message in &backup.messages {
            let mut message = message.clone();
            message.id = Uuid::new_v4().to_string();
            message.conversation_id = conversation.id.clone();
            self.save_message(message)?;
            count += 1;
        }

        tracing::info!(
            original_id = %original_id,
            conversation_id = %conversation.id,
            messages = count,
            "conversation restored"
        );
        Ok(RestoreSummary {
            original_id,
            conversation_id: conversation.id,
            message_count: count,
        })
    }

    // ============================================
    // Log records
    // ============================================

    /// Save a log record, minting an id when empty
    pub fn save_log(&self, mut log: LogRecord) -> Result<LogRecord> {
        if log.id.trim().is_empty() {
            log.id = Uuid::new_v4().to_string();
        }
        self.store.upsert_log(&log)?;
        Ok(log)
    }

    /// Get a log record by id
    pub fn get_log(&self, id: &str) -> Result<Option<LogRecord>> {
        self.store.get_log(id)
    }

    /// Most recent log record for a path, so re-opening a file reuses its
    /// record
    pub fn log_for_path(&self, path: &str) -> Result<Option<LogRecord>> {
        self.store.log_for_path(path)
    }

    /// All log records, newest first
    pub fn all_logs(&self) -> Result<Vec<LogRecord>> {
        self.store.all_logs()
    }

    /// Delete a log record
    pub fn delete_log(&self, id: &str) -> Result<bool> {
        self.store.delete_log(id)
    }

    // ============================================
    // Settings
    // ============================================

    /// Persist one setting
    pub fn set_setting(&self, id: &str, value: serde_json::Value) -> Result<()> {
        self.store.put_setting(id, &value)
    }

    /// Fetch one setting
    pub fn setting(&self, id: &str) -> Result<Option<serde_json::Value>> {
        self.store.get_setting(id)
    }

    /// All settings as a map
    pub fn settings_map(&self) -> Result<HashMap<String, serde_json::Value>> {
        Ok(self
            .store
            .all_settings()?
            .into_iter()
            .map(|Setting { id, value }| (id, value))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageKind, Role};
    use chrono::{Duration, Utc};

    fn repo() -> Repository {
        let store = Store::open_in_memory().unwrap();
        store.migrate().unwrap();
        Repository::new(Arc::new(store))
    }

    fn saved_conversation(repo: &Repository, title: &str) -> Conversation {
        repo.save_conversation(Conversation::new(title)).unwrap()
    }

    fn saved_message(repo: &Repository, conversation_id: &str, content: &str) -> Message {
        repo.save_message(Message {
            id: String::new(),
            conversation_id: conversation_id.to_string(),
            role: Role::User,
            kind: MessageKind::Text,
            content: content.to_string(),
            timestamp: Utc::now(),
        })
        .unwrap()
    }

    #[test]
    fn test_save_mints_id_and_default_title() {
        let repo = repo();
        let conv = repo
            .save_conversation(Conversation {
                id: String::new(),
                title: "   ".to_string(),
                date: Utc::now(),
                source: None,
            })
            .unwrap();
        assert!(!conv.id.is_empty());
        assert_eq!(conv.title, UNTITLED);
        assert!(repo.get_conversation(&conv.id).unwrap().is_some());
    }

    #[test]
    fn test_save_message_requires_conversation_id() {
        let repo = repo();
        let err = repo
            .save_message(Message {
                id: String::new(),
                conversation_id: String::new(),
                role: Role::User,
                kind: MessageKind::Text,
                content: "x".to_string(),
                timestamp: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn test_cascade_delete() {
        let repo = repo();
        let conv = saved_conversation(&repo, "doomed");
        saved_message(&repo, &conv.id, "one");
        saved_message(&repo, &conv.id, "two");
        let other = saved_conversation(&repo, "survivor");
        saved_message(&repo, &other.id, "keep me");

        repo.delete_conversation(&conv.id).unwrap();

        assert!(repo.get_conversation(&conv.id).unwrap().is_none());
        assert!(repo.messages(&conv.id).unwrap().is_empty());
        assert_eq!(repo.messages(&other.id).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_missing_conversation_is_ok() {
        let repo = repo();
        repo.delete_conversation("never-existed").unwrap();
    }

    #[test]
    fn test_search_empty_text_short_circuits() {
        let repo = repo();
        saved_conversation(&repo, "findable");
        assert!(repo.search_conversations("").unwrap().is_empty());
        assert!(repo.search_conversations("   ").unwrap().is_empty());
    }

    #[test]
    fn test_search_title_and_content_union() {
        let repo = repo();
        let by_title = repo
            .save_conversation(Conversation {
                date: Utc::now() - Duration::days(1),
                ..Conversation::new("Kyoto travel notes")
            })
            .unwrap();
        let by_content = saved_conversation(&repo, "untitled scratch");
        saved_message(&repo, &by_content.id, "let's stay in KYOTO station area");
        let both = repo
            .save_conversation(Conversation {
                date: Utc::now() - Duration::days(2),
                ..Conversation::new("kyoto again")
            })
            .unwrap();
        saved_message(&repo, &both.id, "more kyoto talk");
        saved_conversation(&repo, "unrelated");

        let results = repo.search_conversations("Kyoto").unwrap();
        let ids: Vec<_> = results.iter().map(|c| c.id.as_str()).collect();

        // Deduplicated union, newest first
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], by_content.id);
        assert_eq!(ids[1], by_title.id);
        assert_eq!(ids[2], both.id);
    }

    #[test]
    fn test_search_folds_non_ascii_case() {
        let repo = repo();
        let by_title = saved_conversation(&repo, "CAFÉ PLANS");
        let by_content = saved_conversation(&repo, "scratch");
        saved_message(&repo, &by_content.id, "meet at the CAFÉ at noon");
        saved_conversation(&repo, "unrelated");

        let hits = repo.search_conversations("café").unwrap();
        let ids: Vec<_> = hits.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&by_title.id.as_str()));
        assert!(ids.contains(&by_content.id.as_str()));
    }

    #[test]
    fn test_export_missing_conversation_is_not_found() {
        let repo = repo();
        let err = repo.export_conversation("ghost").unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "conversation", .. }));
    }

    #[test]
    fn test_export_import_round_trip() {
        let source = repo();
        let conv = saved_conversation(&source, "travel plans");
        let m1 = saved_message(&source, &conv.id, "first");
        let m2 = saved_message(&source, &conv.id, "second");

        let json = source.export_conversation(&conv.id).unwrap().to_json().unwrap();

        let target = repo();
        let bundle = ConversationBundle::from_json(&json).unwrap();
        let imported_id = target.import_conversation(bundle).unwrap();

        assert_eq!(imported_id, conv.id);
        let messages = target.messages(&imported_id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, m1.id);
        assert_eq!(messages[0].content, "first");
        assert_eq!(messages[1].id, m2.id);
        assert_eq!(messages[1].content, "second");
    }

    #[test]
    fn test_import_rejects_malformed_payload() {
        let err = ConversationBundle::from_json(r#"{"conversation": {}}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn test_full_store_export_import_with_clear() {
        let source = repo();
        let c1 = saved_conversation(&source, "one");
        saved_message(&source, &c1.id, "hello");
        let c2 = saved_conversation(&source, "two");
        saved_message(&source, &c2.id, "world");

        let export = source.export_all().unwrap();
        assert_eq!(export.version, "1.0");

        let target = repo();
        saved_conversation(&target, "pre-existing");
        let summary = target.import_all(export, true).unwrap();

        assert_eq!(summary.conversations, 2);
        assert_eq!(summary.messages, 2);
        let titles: Vec<_> = target
            .all_conversations()
            .unwrap()
            .into_iter()
            .map(|c| c.title)
            .collect();
        assert!(!titles.contains(&"pre-existing".to_string()));
    }

    #[test]
    fn test_restore_mints_fresh_ids_and_marks_title() {
        let repo = repo();
        let conv = saved_conversation(&repo, "important chat");
        let original_message = saved_message(&repo, &conv.id, "precious");

        let backup = repo.backup_conversation(&conv.id).unwrap();
        let summary = repo.restore_conversation(&backup).unwrap();

        assert_eq!(summary.original_id, conv.id);
        assert_ne!(summary.conversation_id, conv.id);
        assert_eq!(summary.message_count, 1);

        let restored = repo
            .get_conversation(&summary.conversation_id)
            .unwrap()
            .unwrap();
        assert_eq!(restored.title, "important chat (restored)");

        let restored_messages = repo.messages(&summary.conversation_id).unwrap();
        assert_eq!(restored_messages.len(), 1);
        assert_ne!(restored_messages[0].id, original_message.id);
        assert_eq!(restored_messages[0].content, "precious");
        assert_eq!(restored_messages[0].timestamp, original_message.timestamp);

        // The original is untouched
        assert_eq!(repo.messages(&conv.id).unwrap().len(), 1);
    }

    #[test]
    fn test_settings_map() {
        let repo = repo();
        repo.set_setting("ui.theme", serde_json::json!("dark")).unwrap();
        repo.set_setting("import.assistant", serde_json::json!("Claude"))
            .unwrap();
        let map = repo.settings_map().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["ui.theme"], serde_json::json!("dark"));
    }
}
