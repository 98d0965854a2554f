//! LINE-style text log parser
//!
//! LINE chat exports are plain text with date header lines and
//! tab-separated message lines:
//!
//! ```text
//! 2024/3/5(Tue)
//! 9:00<TAB>Claude<TAB>Good morning
//! 9:05<TAB>Me<TAB>Morning! About that trip
//! where should we go?
//! ```
//!
//! A line matching neither pattern continues the message being built.
//! A strict primary pass handles well-formed exports; when it finds no
//! messages in non-blank input, a loose fallback pass re-scans with
//! prefix matching and whitespace splitting so that logs mangled in
//! transit (lost tabs, stripped weekday suffixes) still yield something.

use super::{ParsedLog, ParsedMessage};
use crate::error::{Error, Result};
use crate::types::Role;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static DATE_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4}/\d{1,2}/\d{1,2})\([^)]+\)$").unwrap());

static MESSAGE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2}:\d{1,2})\t([^\t]+)\t(.*)$").unwrap());

static LOOSE_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}/\d{1,2}/\d{1,2}").unwrap());

static LOOSE_TIME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}:\d{1,2}").unwrap());

/// Parse a LINE-style log, falling back to the loose pass when the
/// strict one fails.
pub fn parse(content: &str, assistant_name: &str) -> Result<ParsedLog> {
    // Exports that passed through JSON or Windows paths sometimes arrive
    // with doubled backslashes.
    let content = content.replace("\\\\", "\\");

    match parse_strict(&content, assistant_name) {
        Ok(parsed) => Ok(parsed),
        Err(err) => {
            tracing::debug!(%err, "strict LINE parse failed, trying loose pass");
            let mut parsed = parse_loose(&content, assistant_name);
            parsed
                .warnings
                .push(format!("strict parse failed ({}), used loose pass", err));
            Ok(parsed)
        }
    }
}

/// One message being accumulated by the scan.
struct Pending {
    role: Role,
    content: String,
    timestamp: DateTime<Utc>,
}

impl Pending {
    fn finish(self, messages: &mut Vec<ParsedMessage>) {
        messages.push(ParsedMessage {
            role: self.role,
            content: self.content,
            timestamp: self.timestamp,
        });
    }
}

/// Strict pass: exact date headers and tab-separated message lines.
///
/// Fails when non-blank input produces no messages, which hands control
/// to the loose pass.
pub fn parse_strict(content: &str, assistant_name: &str) -> Result<ParsedLog> {
    if content.trim().is_empty() {
        return Ok(ParsedLog::empty());
    }

    let mut messages = Vec::new();
    let mut pending: Option<Pending> = None;
    let mut current_date: Option<(String, NaiveDate)> = None;

    for line in content.lines() {
        if let Some(caps) = DATE_HEADER.captures(line) {
            if let Some(p) = pending.take() {
                p.finish(&mut messages);
            }
            let raw = caps[1].to_string();
            if let Ok(date) = NaiveDate::parse_from_str(&raw, "%Y/%m/%d") {
                current_date = Some((raw, date));
            }
        } else if let Some(caps) = MESSAGE_LINE.captures(line) {
            if let Some(p) = pending.take() {
                p.finish(&mut messages);
            }
            pending = Some(Pending {
                role: role_for_sender(&caps[2], assistant_name),
                content: caps[3].to_string(),
                timestamp: stamp(current_date.as_ref().map(|(_, d)| *d), &caps[1]),
            });
        } else if !line.trim().is_empty() {
            if let Some(p) = pending.as_mut() {
                p.content.push('\n');
                p.content.push_str(line);
            }
        }
    }
    if let Some(p) = pending.take() {
        p.finish(&mut messages);
    }

    if messages.is_empty() {
        return Err(Error::Parse {
            format: "line-text".to_string(),
            message: "no tab-separated message lines found".to_string(),
        });
    }

    Ok(assemble(messages, current_date))
}

/// Loose pass: prefix matching only. Date lines lose their weekday
/// suffix, message lines are split on whitespace instead of tabs.
pub fn parse_loose(content: &str, assistant_name: &str) -> ParsedLog {
    let mut messages = Vec::new();
    let mut pending: Option<Pending> = None;
    let mut current_date: Option<(String, NaiveDate)> = None;

    for line in content.lines() {
        if LOOSE_DATE.is_match(line) {
            if let Some(p) = pending.take() {
                p.finish(&mut messages);
            }
            let raw = line.split('(').next().unwrap_or(line).trim().to_string();
            if let Ok(date) = NaiveDate::parse_from_str(&raw, "%Y/%m/%d") {
                current_date = Some((raw, date));
            }
        } else if let Some(m) = LOOSE_TIME.find(line) {
            let rest = line[m.end()..].trim();
            let mut parts = rest.splitn(2, char::is_whitespace);
            let sender = parts.next().unwrap_or("");
            let body = parts.next().unwrap_or("").trim();
            if sender.is_empty() || body.is_empty() {
                continue;
            }
            if let Some(p) = pending.take() {
                p.finish(&mut messages);
            }
            pending = Some(Pending {
                role: role_for_sender(sender, assistant_name),
                content: body.to_string(),
                timestamp: stamp(current_date.as_ref().map(|(_, d)| *d), m.as_str()),
            });
        } else if !line.trim().is_empty() {
            if let Some(p) = pending.as_mut() {
                p.content.push('\n');
                p.content.push_str(line);
            }
        }
    }
    if let Some(p) = pending.take() {
        p.finish(&mut messages);
    }

    assemble(messages, current_date)
}

fn assemble(
    messages: Vec<ParsedMessage>,
    current_date: Option<(String, NaiveDate)>,
) -> ParsedLog {
    let (raw, date) = match current_date {
        Some((raw, d)) => {
            let dt = d
                .and_hms_opt(0, 0, 0)
                .map(|naive| naive.and_utc())
                .unwrap_or_else(Utc::now);
            (raw, dt)
        }
        None => {
            let now = Utc::now();
            (now.format("%Y/%m/%d").to_string(), now)
        }
    };
    ParsedLog {
        title: if messages.is_empty() {
            None
        } else {
            Some(format!("LINE chat {}", raw))
        },
        date,
        messages,
        warnings: Vec::new(),
    }
}

fn role_for_sender(sender: &str, assistant_name: &str) -> Role {
    if sender.trim() == assistant_name {
        Role::Assistant
    } else {
        Role::User
    }
}

/// Combine the current date header with an `H:MM` stamp. Falls back to
/// now when either piece is missing or out of range.
fn stamp(date: Option<NaiveDate>, time: &str) -> DateTime<Utc> {
    let parsed = date.and_then(|d| {
        let mut parts = time.splitn(2, ':');
        let hour: u32 = parts.next()?.parse().ok()?;
        let minute: u32 = parts.next()?.parse().ok()?;
        let t = NaiveTime::from_hms_opt(hour, minute, 0)?;
        Some(d.and_time(t).and_utc())
    });
    parsed.unwrap_or_else(Utc::now)
}
