//! HTML transcript parser
//!
//! Extracts a conversation from a saved chat page. Pages vary wildly, so
//! message extraction runs an ordered list of named strategies and takes
//! the first one that finds anything:
//!
//! 1. `selector-classes`: block elements carrying one of the known chat
//!    class tokens (`message`, `human-message`, ...).
//! 2. `role-labels`: `<div>Human: ...</div>` style blocks, or bare
//!    `Human:` / `Assistant:` labels in the page text.
//!
//! Plain text input is wrapped in a synthetic page (entity-escaped inside
//! `<pre>`) so the same pipeline applies. Unusable input yields an empty
//! message list rather than an error; callers decide what that means.

use super::{parse_loose_datetime, ParsedLog, ParsedMessage};
use crate::error::Result;
use crate::types::Role;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

/// Class tokens tried by the selector strategy, most specific layouts
/// first. The first token matching at least one element wins.
const CLASS_SELECTORS: &[&str] = &[
    "message",
    "chat-message",
    "conversation-message",
    "human-message",
    "assistant-message",
    "user-message",
    "claude-message",
    "human",
    "assistant",
];

/// A named message-extraction strategy.
pub(crate) struct Strategy {
    pub name: &'static str,
    pub run: fn(&str) -> Vec<ParsedMessage>,
}

/// Strategies in the order they are tried.
pub(crate) const STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "selector-classes",
        run: selector_strategy,
    },
    Strategy {
        name: "role-labels",
        run: label_strategy,
    },
];

static OPEN_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(div|section|article|li|p|blockquote)\b[^>]*>").unwrap());

static TAG_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<(/?)([a-zA-Z][a-zA-Z0-9]*)").unwrap());

static CLASS_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)class\s*=\s*["']([^"']*)["']"#).unwrap());

static BODY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<body\b[^>]*>(.*?)</body>").unwrap());

static TITLE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());

static H1_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").unwrap());

static HEADER_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<header[^>]*>(.*?)</header>").unwrap());

static TIME_EL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<time\b([^>]*)>([^<]*)").unwrap());

static TIME_EL_FULL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<time\b[^>]*>.*?</time>").unwrap());

static DATETIME_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)datetime\s*=\s*["']([^"']*)["']"#).unwrap());

static STAMP_EL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<(?:span|div)\b[^>]*class\s*=\s*["'][^"']*(?:timestamp|date)[^"']*["'][^>]*>([^<]*)"#)
        .unwrap()
});

static STAMP_EL_FULL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<(span|div|time)\b[^>]*class\s*=\s*["'][^"']*(?:timestamp|date)[^"']*["'][^>]*>[^<]*</(?:span|div|time)>"#,
    )
    .unwrap()
});

static META_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<meta\b[^>]*name\s*=\s*["']date["'][^>]*>"#).unwrap());

static CONTENT_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)content\s*=\s*["']([^"']*)["']"#).unwrap());

static CODE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<pre\b[^>]*>\s*<code\b[^>]*>(.*?)</code>\s*</pre>").unwrap());

static BR_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());

static BLOCK_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</(?:p|div|li|h[1-6]|blockquote)\s*>").unwrap());

static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

static LABEL_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^[ \t]*(?:human|user|claude|assistant)[ \t]*:[ \t]*").unwrap());

static DIV_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<div\b[^>]*>\s*(human|user|claude|assistant)\s*:\s*(.*?)</div>").unwrap()
});

static TEXT_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^[ \t]*(human|user|claude|assistant)[ \t]*:[ \t]*").unwrap());

/// Parse an HTML transcript (or plain text treated as one).
pub fn parse(content: &str) -> Result<ParsedLog> {
    if content.trim().is_empty() {
        return Ok(ParsedLog::empty());
    }

    let html = ensure_markup(content);
    let body = body_of(&html);

    let mut messages = Vec::new();
    let mut used: Option<&'static str> = None;
    for strategy in STRATEGIES {
        let found = (strategy.run)(body);
        if !found.is_empty() {
            used = Some(strategy.name);
            messages = found;
            break;
        }
    }

    let mut warnings = Vec::new();
    match used {
        None => warnings.push("no message blocks recognized".to_string()),
        Some(name) if name != STRATEGIES[0].name => {
            warnings.push(format!("messages extracted by {} strategy", name));
        }
        Some(_) => {}
    }

    Ok(ParsedLog {
        title: extract_title(&html),
        date: extract_date(&html).unwrap_or_else(Utc::now),
        messages,
        warnings,
    })
}

/// Wrap non-markup input in a synthetic page so the rest of the pipeline
/// only ever sees HTML.
fn ensure_markup(content: &str) -> Cow<'_, str> {
    if content.trim_start().starts_with('<') {
        Cow::Borrowed(content)
    } else {
        Cow::Owned(format!(
            "<html><body><pre>{}</pre></body></html>",
            html_escape::encode_text(content)
        ))
    }
}

fn body_of<'a>(html: &'a str) -> &'a str {
    match BODY_TAG.captures(html).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => html,
    }
}

// ============================================
// Strategy 1: class selectors
// ============================================

struct Element<'a> {
    class: String,
    inner: &'a str,
}

fn selector_strategy(body: &str) -> Vec<ParsedMessage> {
    for token in CLASS_SELECTORS {
        let elements = elements_with_class(body, token);
        if elements.is_empty() {
            continue;
        }
        let messages: Vec<ParsedMessage> = elements
            .iter()
            .filter_map(|el| element_to_message(&el.class, el.inner))
            .collect();
        if !messages.is_empty() {
            return messages;
        }
    }
    Vec::new()
}

/// Find block elements whose class list contains `token`, in document
/// order. Matching is by exact class token, like a CSS class selector.
fn elements_with_class<'a>(body: &'a str, token: &str) -> Vec<Element<'a>> {
    let mut out = Vec::new();
    for caps in OPEN_TAG.captures_iter(body) {
        let (whole, tag) = match (caps.get(0), caps.get(1)) {
            (Some(w), Some(t)) => (w, t),
            _ => continue,
        };
        let class = match CLASS_ATTR.captures(whole.as_str()).and_then(|c| c.get(1)) {
            Some(m) => m.as_str(),
            None => continue,
        };
        if !class.split_whitespace().any(|c| c.eq_ignore_ascii_case(token)) {
            continue;
        }
        if let Some(inner_end) = enclosing_span(body, tag.as_str(), whole.end()) {
            out.push(Element {
                class: class.to_string(),
                inner: &body[whole.end()..inner_end],
            });
        }
    }
    out
}

/// Scan forward from an open tag to its matching close tag, tracking
/// nesting depth for that tag name. Returns the offset where the inner
/// HTML ends, or `None` for an unclosed element.
fn enclosing_span(body: &str, tag: &str, from: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut pos = from;
    while let Some(caps) = TAG_TOKEN.captures_at(body, pos) {
        let whole = caps.get(0)?;
        let closing = caps.get(1).map(|m| !m.as_str().is_empty()).unwrap_or(false);
        let name = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        pos = whole.end();
        if name.eq_ignore_ascii_case(tag) {
            if closing {
                depth -= 1;
                if depth == 0 {
                    return Some(whole.start());
                }
            } else {
                depth += 1;
            }
        }
    }
    None
}

fn element_to_message(class: &str, inner: &str) -> Option<ParsedMessage> {
    let content = clean_content(inner);
    if content.is_empty() {
        return None;
    }
    Some(ParsedMessage {
        role: role_for(class, inner),
        content,
        timestamp: extract_message_time(inner).unwrap_or_else(Utc::now),
    })
}

/// Role heuristic: anything signalling a human turn (class token or a
/// `Human:`/`User:` label in the content) maps to user; everything else
/// is the assistant.
fn role_for(class: &str, inner: &str) -> Role {
    let class = class.to_ascii_lowercase();
    if class.contains("human") || class.contains("user") {
        return Role::User;
    }
    if class.contains("assistant") || class.contains("claude") {
        return Role::Assistant;
    }
    let inner = inner.to_ascii_lowercase();
    if inner.contains("human:") || inner.contains("user:") {
        return Role::User;
    }
    Role::Assistant
}

/// Timestamp of a single message: a nested `<time>` element (datetime
/// attribute, then text), then a timestamp/date-classed element.
fn extract_message_time(inner: &str) -> Option<DateTime<Utc>> {
    if let Some(caps) = TIME_EL.captures(inner) {
        if let Some(attrs) = caps.get(1) {
            if let Some(dt) = DATETIME_ATTR
                .captures(attrs.as_str())
                .and_then(|c| c.get(1))
                .and_then(|m| parse_loose_datetime(m.as_str()))
            {
                return Some(dt);
            }
        }
        if let Some(dt) = caps.get(2).and_then(|m| parse_loose_datetime(m.as_str())) {
            return Some(dt);
        }
    }
    STAMP_EL
        .captures(inner)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_loose_datetime(m.as_str()))
}

/// Reduce a message element's inner HTML to plain text: drop timestamp
/// sub-elements, protect fenced code, strip tags, decode entities, strip
/// leading role labels.
fn clean_content(inner: &str) -> String {
    let mut s = STAMP_EL_FULL.replace_all(inner, "").into_owned();
    s = TIME_EL_FULL.replace_all(&s, "").into_owned();

    let mut code_blocks: Vec<String> = Vec::new();
    s = CODE_BLOCK
        .replace_all(&s, |caps: &regex::Captures| {
            code_blocks.push(caps[1].to_string());
            format!("__CODE_BLOCK_{}__", code_blocks.len() - 1)
        })
        .into_owned();

    s = BR_TAG.replace_all(&s, "\n").into_owned();
    s = BLOCK_CLOSE.replace_all(&s, "\n").into_owned();
    s = ANY_TAG.replace_all(&s, "").into_owned();
    let mut s = html_escape::decode_html_entities(&s).into_owned();
    s = LABEL_PREFIX.replace_all(&s, "").into_owned();

    for (i, code) in code_blocks.iter().enumerate() {
        let decoded = html_escape::decode_html_entities(code);
        let fenced = format!("```\n{}\n```", decoded.trim_matches('\n'));
        s = s.replace(&format!("__CODE_BLOCK_{}__", i), &fenced);
    }

    s.trim().to_string()
}

// ============================================
// Strategy 2: role labels
// ============================================

fn label_strategy(body: &str) -> Vec<ParsedMessage> {
    let mut messages = Vec::new();
    for caps in DIV_LABEL.captures_iter(body) {
        let (label, block) = match (caps.get(1), caps.get(2)) {
            (Some(l), Some(b)) => (l.as_str(), b.as_str()),
            _ => continue,
        };
        let content = clean_content(block);
        if content.is_empty() {
            continue;
        }
        messages.push(ParsedMessage {
            role: role_for_label(label),
            content,
            timestamp: Utc::now(),
        });
    }
    if !messages.is_empty() {
        return messages;
    }
    text_labels(body)
}

/// Bare `Human:` / `Assistant:` labels at line starts in the page text.
/// This is what carries synthetic pages wrapped around plain text.
fn text_labels(body: &str) -> Vec<ParsedMessage> {
    let stripped = ANY_TAG.replace_all(body, "");
    let text = html_escape::decode_html_entities(stripped.as_ref()).into_owned();

    let marks: Vec<(usize, usize, Role)> = TEXT_LABEL
        .captures_iter(&text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let label = caps.get(1)?;
            Some((whole.start(), whole.end(), role_for_label(label.as_str())))
        })
        .collect();

    let mut messages = Vec::new();
    for (i, (_, content_start, role)) in marks.iter().enumerate() {
        let end = marks.get(i + 1).map(|m| m.0).unwrap_or_else(|| text.len());
        let content = text[*content_start..end].trim();
        if content.is_empty() {
            continue;
        }
        messages.push(ParsedMessage {
            role: *role,
            content: content.to_string(),
            timestamp: Utc::now(),
        });
    }
    messages
}

fn role_for_label(label: &str) -> Role {
    if label.eq_ignore_ascii_case("human") || label.eq_ignore_ascii_case("user") {
        Role::User
    } else {
        Role::Assistant
    }
}

// ============================================
// Title and date
// ============================================

fn extract_title(html: &str) -> Option<String> {
    for re in [&*TITLE_TAG, &*H1_TAG, &*HEADER_TAG] {
        if let Some(inner) = re.captures(html).and_then(|c| c.get(1)) {
            let text = clean_content(inner.as_str());
            if let Some(first) = text.lines().find(|l| !l.trim().is_empty()) {
                return Some(first.trim().to_string());
            }
        }
    }
    None
}

/// Document date: the first `<time>` element, then the first
/// timestamp/date-classed element, then `<meta name="date">`.
fn extract_date(html: &str) -> Option<DateTime<Utc>> {
    if let Some(caps) = TIME_EL.captures(html) {
        if let Some(dt) = caps
            .get(1)
            .and_then(|attrs| DATETIME_ATTR.captures(attrs.as_str()))
            .and_then(|c| c.get(1))
            .and_then(|m| parse_loose_datetime(m.as_str()))
        {
            return Some(dt);
        }
        if let Some(dt) = caps.get(2).and_then(|m| parse_loose_datetime(m.as_str())) {
            return Some(dt);
        }
    }
    if let Some(dt) = STAMP_EL
        .captures(html)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_loose_datetime(m.as_str()))
    {
        return Some(dt);
    }
    META_DATE
        .find(html)
        .and_then(|m| CONTENT_ATTR.captures(m.as_str()))
        .and_then(|c| c.get(1))
        .and_then(|m| parse_loose_datetime(m.as_str()))
}
