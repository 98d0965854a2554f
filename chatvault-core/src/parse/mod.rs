//! Log document parsers
//!
//! Every supported log format is normalized into a [`ParsedLog`]: an
//! optional title, a document date, and an ordered list of messages. The
//! parsers never touch storage; persistence happens in [`crate::ingest`].
//!
//! ## Design principles
//!
//! 1. **Resilience**: malformed individual records produce warnings and are
//!    skipped; only a document whose overall shape is wrong fails.
//! 2. **Order preservation**: messages come out in document order. Records
//!    without a usable timestamp get the current time, so document order is
//!    the only reliable ordering signal for them.
//! 3. **Explicit strategies**: where a format needs multiple extraction
//!    approaches (HTML), they form an ordered, named, individually testable
//!    list rather than an ad-hoc cascade.

pub mod html;
pub mod json;
pub mod line;

use crate::error::Result;
use crate::types::{LogFormat, Role};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// A message extracted from a log document, before ids are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Result of parsing one log document.
#[derive(Debug, Clone)]
pub struct ParsedLog {
    /// Title found in the document, if any. Callers apply their own
    /// fallback (filename, then a literal) when this is `None`.
    pub title: Option<String>,
    /// Document date (falls back to the parse time)
    pub date: DateTime<Utc>,
    /// Messages in document order
    pub messages: Vec<ParsedMessage>,
    /// Non-fatal problems encountered while parsing
    pub warnings: Vec<String>,
}

impl ParsedLog {
    pub(crate) fn empty() -> Self {
        Self {
            title: None,
            date: Utc::now(),
            messages: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Parse `content` as the given format.
///
/// `assistant_name` is the display name that marks assistant turns in
/// LINE-style logs (typically "Claude").
pub fn parse(format: LogFormat, content: &str, assistant_name: &str) -> Result<ParsedLog> {
    match format {
        LogFormat::HtmlTranscript => html::parse(content),
        LogFormat::JsonExport => json::parse(content),
        LogFormat::LineText => line::parse(content, assistant_name),
    }
}

/// Lenient timestamp parsing for the formats log documents carry.
///
/// Accepts RFC 3339 first, then a short list of common date-time and
/// date-only layouts. Naive values are taken as UTC.
pub(crate) fn parse_loose_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    const DATETIME_LAYOUTS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
        "%Y/%m/%d %H:%M",
    ];
    for layout in DATETIME_LAYOUTS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, layout) {
            return Some(dt.and_utc());
        }
    }

    const DATE_LAYOUTS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%B %d, %Y"];
    for layout in DATE_LAYOUTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, layout) {
            return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_loose_datetime() {
        assert!(parse_loose_datetime("2024-03-05T09:00:00Z").is_some());
        assert!(parse_loose_datetime("2024-03-05 09:00:00").is_some());
        assert!(parse_loose_datetime("2024/3/5 9:00").is_some());
        assert!(parse_loose_datetime("2024-03-05").is_some());
        assert!(parse_loose_datetime("March 5, 2024").is_some());
        assert!(parse_loose_datetime("").is_none());
        assert!(parse_loose_datetime("yesterday").is_none());
    }

    #[test]
    fn test_date_only_is_midnight_utc() {
        let dt = parse_loose_datetime("2024/3/5").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-05T00:00:00+00:00");
    }
}
