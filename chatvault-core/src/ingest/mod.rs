//! Log ingestion
//!
//! [`Ingestor`] ties the parsers to the repository: pick a parser for the
//! document, normalize it, persist the conversation with provenance, and
//! point the log record at the result.
//!
//! Ingestion is not transactional: if a message write fails after the
//! conversation row is created, the conversation stays behind partially
//! populated. The failure is logged with the conversation id so a caller
//! can clean up. Re-ingesting identical content creates a new conversation
//! every time; nothing deduplicates by content.

use crate::config::ImportConfig;
use crate::db::Repository;
use crate::error::{Error, Result};
use crate::parse;
use crate::types::{Conversation, LogFormat, LogRecord, LogSource, Message, MessageKind};
use uuid::Uuid;

/// Result of ingesting one log document
#[derive(Debug, Clone)]
pub struct IngestSummary {
    /// Conversation the log became
    pub conversation_id: String,
    /// Number of messages stored
    pub message_count: usize,
    /// Format the document was parsed as
    pub format: LogFormat,
    /// Log record as stored (id minted, conversation id set)
    pub log: LogRecord,
    /// Non-fatal parser warnings
    pub warnings: Vec<String>,
}

/// Ingestion service over an injected repository
pub struct Ingestor {
    repo: Repository,
    /// Assistant display name marking assistant turns in LINE logs
    assistant_name: String,
    /// Title used when neither the document nor the filename offers one
    fallback_title: String,
}

impl Ingestor {
    pub fn new(repo: Repository) -> Self {
        let defaults = ImportConfig::default();
        Self {
            repo,
            assistant_name: defaults.assistant_name,
            fallback_title: defaults.fallback_title,
        }
    }

    pub fn with_config(repo: Repository, config: &ImportConfig) -> Self {
        Self {
            repo,
            assistant_name: config.assistant_name.clone(),
            fallback_title: config.fallback_title.clone(),
        }
    }

    /// Ingest one log document.
    ///
    /// The format comes from the record's declared format, then the file
    /// extension, then content sniffing. A document that parses to zero
    /// messages is rejected with [`Error::Parse`] and nothing is stored.
    pub fn ingest(&self, log: LogRecord, content: &str) -> Result<IngestSummary> {
        let format = log
            .format
            .or_else(|| LogFormat::from_path(&log.path))
            .unwrap_or_else(|| LogFormat::sniff(content));

        let parsed = parse::parse(format, content, &self.assistant_name)?;
        for warning in &parsed.warnings {
            tracing::warn!(path = %log.path, warning = %warning, "parser warning");
        }
        if parsed.messages.is_empty() {
            return Err(Error::Parse {
                format: format.as_str().to_string(),
                message: "no messages found in log".to_string(),
            });
        }

        let mut log = self.repo.save_log(LogRecord {
            format: Some(format),
            ..log
        })?;

        let title = parsed
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| {
                if log.filename.trim().is_empty() {
                    None
                } else {
                    Some(log.filename.clone())
                }
            })
            .unwrap_or_else(|| self.fallback_title.clone());

        let conversation = self.repo.save_conversation(Conversation {
            id: Uuid::new_v4().to_string(),
            title,
            date: parsed.date,
            source: Some(LogSource {
                kind: format.as_str().to_string(),
                log_id: log.id.clone(),
                path: log.path.clone(),
                filename: log.filename.clone(),
            }),
        })?;

        let mut count = 0usize;
        for message in &parsed.messages {
            let result = self.repo.save_message(Message {
                id: Uuid::new_v4().to_string(),
                conversation_id: conversation.id.clone(),
                role: message.role,
                kind: MessageKind::Text,
                content: message.content.clone(),
                timestamp: message.timestamp,
            });
            if let Err(err) = result {
                tracing::error!(
                    conversation_id = %conversation.id,
                    stored = count,
                    total = parsed.messages.len(),
                    %err,
                    "message write failed, conversation left partially populated"
                );
                return Err(err);
            }
            count += 1;
        }

        log.conversation_id = Some(conversation.id.clone());
        let log = self.repo.save_log(log)?;

        tracing::info!(
            conversation_id = %conversation.id,
            format = format.as_str(),
            messages = count,
            path = %log.path,
            "log ingested"
        );

        Ok(IngestSummary {
            conversation_id: conversation.id,
            message_count: count,
            format,
            log,
            warnings: parsed.warnings,
        })
    }
}
