//! JSON export parser
//!
//! Handles structured exports of the form:
//!
//! ```json
//! {
//!   "title": "Trip planning",
//!   "created_at": "2024-03-05T09:00:00Z",
//!   "messages": [
//!     { "role": "assistant", "content": "hi", "created_at": "..." }
//!   ]
//! }
//! ```
//!
//! The document must carry a `messages` array; anything else about its
//! shape is optional. Raw records are deserialized as-is and then
//! normalized, so unknown fields pass through harmlessly.

use super::{parse_loose_datetime, ParsedLog, ParsedMessage};
use crate::error::{Error, Result};
use crate::types::Role;
use chrono::Utc;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RawExport {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    messages: Vec<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

/// Parse a JSON export document.
pub fn parse(content: &str) -> Result<ParsedLog> {
    let raw: RawExport = serde_json::from_str(content)
        .map_err(|e| Error::Format(format!("JSON export must carry a messages array: {}", e)))?;

    let mut warnings = Vec::new();

    let date = match raw.created_at.as_deref() {
        Some(s) => parse_loose_datetime(s).unwrap_or_else(|| {
            warnings.push(format!("unparseable created_at {:?}, using now", s));
            Utc::now()
        }),
        None => Utc::now(),
    };

    let mut messages = Vec::with_capacity(raw.messages.len());
    for (i, msg) in raw.messages.into_iter().enumerate() {
        let role = match msg.role.as_deref() {
            Some("assistant") => Role::Assistant,
            _ => Role::User,
        };
        let timestamp = match msg.created_at.as_deref() {
            Some(s) => parse_loose_datetime(s).unwrap_or_else(|| {
                warnings.push(format!("message {}: unparseable created_at {:?}", i, s));
                Utc::now()
            }),
            None => Utc::now(),
        };
        messages.push(ParsedMessage {
            role,
            content: msg.content.unwrap_or_default(),
            timestamp,
        });
    }

    Ok(ParsedLog {
        title: raw
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()),
        date,
        messages,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_export() {
        let content = r#"{
            "title": "Trip planning",
            "created_at": "2024-03-05T09:00:00Z",
            "messages": [
                {"role": "user", "content": "where to?", "created_at": "2024-03-05T09:00:00Z"},
                {"role": "assistant", "content": "the coast", "created_at": "2024-03-05T09:01:00Z"}
            ]
        }"#;
        let parsed = parse(content).unwrap();
        assert_eq!(parsed.title.as_deref(), Some("Trip planning"));
        assert_eq!(parsed.date.to_rfc3339(), "2024-03-05T09:00:00+00:00");
        assert_eq!(parsed.messages.len(), 2);
        assert_eq!(parsed.messages[0].role, Role::User);
        assert_eq!(parsed.messages[1].role, Role::Assistant);
        assert_eq!(
            parsed.messages[1].timestamp.to_rfc3339(),
            "2024-03-05T09:01:00+00:00"
        );
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_missing_messages_is_format_error() {
        let err = parse(r#"{"title": "no messages here"}"#).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_non_array_messages_is_format_error() {
        let err = parse(r#"{"messages": "oops"}"#).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_invalid_json_is_format_error() {
        let err = parse("not json at all").unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_unknown_roles_become_user() {
        let content = r#"{"messages": [
            {"role": "claude", "content": "a"},
            {"content": "b"}
        ]}"#;
        let parsed = parse(content).unwrap();
        assert_eq!(parsed.messages[0].role, Role::User);
        assert_eq!(parsed.messages[1].role, Role::User);
    }

    #[test]
    fn test_missing_timestamps_warn_and_default() {
        let content = r#"{
            "created_at": "banana",
            "messages": [{"role": "assistant", "content": "hi", "created_at": "also banana"}]
        }"#;
        let parsed = parse(content).unwrap();
        assert_eq!(parsed.messages.len(), 1);
        assert_eq!(parsed.warnings.len(), 2);
    }

    #[test]
    fn test_empty_messages_array_is_valid() {
        let parsed = parse(r#"{"messages": []}"#).unwrap();
        assert!(parsed.messages.is_empty());
        assert!(parsed.title.is_none());
    }
}
