//! Mail → task item transformation.
//!
//! The subject becomes the title and the first `text/plain` part becomes
//! the body, after soft line breaks are rejoined. When the subject is one
//! of the configured placeholder keywords (e.g. "todo") the real title is
//! the first body line and the rest of the body is dropped.
//!
//! Pure transformation: no network or file access.

use mail_parser::{MessageParser, MessagePart, MimeHeaders, PartType};
use tracing::debug;

use crate::error::ExtractError;
use crate::todo::TaskItem;

/// Turns raw RFC 822 messages into [`TaskItem`]s.
#[derive(Debug, Clone, Default)]
pub struct TaskExtractor {
    /// Lower-cased placeholder subjects.
    keywords: Vec<String>,
}

impl TaskExtractor {
    /// Create an extractor with the given placeholder subject keywords.
    pub fn new(keywords: &[String]) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// True if `subject` is a placeholder rather than a real title.
    ///
    /// A blank subject counts as a placeholder so a title is never empty.
    pub fn is_subject_keyword(&self, subject: &str) -> bool {
        let subject = subject.trim();
        subject.is_empty() || self.keywords.iter().any(|k| *k == subject.to_lowercase())
    }

    /// Parse one raw message and build its task item.
    pub fn extract(&self, raw: &[u8]) -> Result<TaskItem, ExtractError> {
        let message = MessageParser::default().parse(raw).ok_or_else(|| {
            ExtractError::MalformedMessage {
                reason: "message could not be parsed".into(),
            }
        })?;

        let subject = message.subject().unwrap_or_default();
        let body = message
            .parts
            .iter()
            .find(|part| is_plain_text(part))
            .and_then(|part| match &part.body {
                PartType::Text(text) => Some(text.as_ref()),
                _ => None,
            })
            .unwrap_or_default();

        self.build(subject, body)
    }

    /// Build a task item from an already decoded subject and plain-text body.
    pub fn build(&self, subject: &str, body: &str) -> Result<TaskItem, ExtractError> {
        let lines = unfold_soft_breaks(body);

        if self.is_subject_keyword(subject) {
            let title = lines
                .into_iter()
                .next()
                .ok_or_else(|| ExtractError::MalformedMessage {
                    reason: format!(
                        "subject {subject:?} asks for the title in the body, but the body is empty"
                    ),
                })?;
            debug!(subject = %subject, title = %title, "Promoted first body line to title");
            return Ok(TaskItem::new(title, Vec::new()));
        }

        Ok(TaskItem::new(subject, lines))
    }
}

/// True for parts declared `text/plain`, or text parts with no declared type.
fn is_plain_text(part: &MessagePart<'_>) -> bool {
    match part.content_type() {
        Some(ct) => {
            ct.ctype().eq_ignore_ascii_case("text")
                && ct.subtype().is_some_and(|s| s.eq_ignore_ascii_case("plain"))
        }
        None => matches!(part.body, PartType::Text(_)),
    }
}

/// Rejoin lines wrapped with a trailing `=` into logical lines.
///
/// Lines are trimmed and blank lines are dropped. A line ending in `=` is
/// accumulated without the `=`; the next line that does not end in `=`
/// completes it. A dangling buffer at the end is emitted as-is.
pub fn unfold_soft_breaks(body: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut pending = String::new();

    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(head) = line.strip_suffix('=') {
            pending.push_str(head);
        } else if pending.is_empty() {
            lines.push(line.to_string());
        } else {
            pending.push_str(line);
            lines.push(std::mem::take(&mut pending));
        }
    }

    if !pending.is_empty() {
        lines.push(pending);
    }

    lines
}
