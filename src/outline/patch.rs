//! Splices task items into an org outline under an anchor property.
//!
//! The outline is handled as a plain line sequence. Only three things are
//! recognised: heading lines (leading `*`), the anchor property line and
//! the `:END:` line closing its property block. New entries go directly
//! after that `:END:`, one level below the last heading seen before the
//! anchor:
//!
//! ```text
//! * Inbox
//!   :PROPERTIES:
//!   :TODO-TARGET: true
//!   :END:
//! ** TODO Buy milk
//!   :LOGBOOK:
//!   - State "TODO"       from ""           [2026-10-17 Sat 09:30]
//!   :END:
//!   2% preferred
//! ```

use chrono::{Local, NaiveDateTime};
use tracing::debug;

use crate::error::PatchError;
use crate::todo::TaskItem;

/// Character that opens a heading line.
pub const HEADING_MARKER: char = '*';

/// Line closing a property block, compared trimmed and lower-cased.
pub const BLOCK_TERMINATOR: &str = ":end:";

const LOGBOOK_OPEN: &str = ":LOGBOOK:";
const LOGBOOK_CLOSE: &str = ":END:";
const TIMESTAMP_FORMAT: &str = "[%Y-%m-%d %a %H:%M]";

/// Where the scan is relative to the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Before the anchor; headings are tracked.
    Scanning,
    /// Between the anchor and its terminator; lines are copied verbatim.
    InPropertyBlock { anchor_line: usize },
    /// Terminator just copied; entries go next.
    Inserting,
    /// Entries written; the rest is copied verbatim.
    Copying,
}

/// Inserts task entries below the heading carrying the anchor property.
#[derive(Debug, Clone)]
pub struct OutlinePatcher {
    anchor: String,
    levels_per_heading: usize,
}

impl OutlinePatcher {
    /// Create a patcher for `anchor_property`, adding one star per level.
    pub fn new(anchor_property: &str) -> Self {
        Self {
            anchor: anchor_property.trim().to_lowercase(),
            levels_per_heading: 1,
        }
    }

    /// Stars added for the child level (2 for odd-levels-only outlines).
    pub fn with_levels_per_heading(mut self, levels: usize) -> Self {
        self.levels_per_heading = levels.max(1);
        self
    }

    /// Patch using the current local time for the LOGBOOK entries.
    pub fn patch(&self, old_lines: &[String], items: &[TaskItem]) -> Result<Vec<String>, PatchError> {
        self.patch_at(old_lines, items, Local::now().naive_local())
    }

    /// Patch with an explicit timestamp for the LOGBOOK entries.
    ///
    /// Either the whole new sequence is returned or nothing is.
    pub fn patch_at(
        &self,
        old_lines: &[String],
        items: &[TaskItem],
        now: NaiveDateTime,
    ) -> Result<Vec<String>, PatchError> {
        let mut out = Vec::with_capacity(old_lines.len() + items.len() * 5);
        let mut state = State::Scanning;
        let mut heading = "";

        for (idx, line) in old_lines.iter().enumerate() {
            out.push(line.clone());

            state = match state {
                State::Scanning => {
                    if line.starts_with(HEADING_MARKER) {
                        heading = heading_marker(line);
                    }
                    if normalize(line) == self.anchor {
                        debug!(line = idx + 1, heading = %heading, "Found anchor property");
                        State::InPropertyBlock { anchor_line: idx + 1 }
                    } else {
                        State::Scanning
                    }
                }
                State::InPropertyBlock { anchor_line } => {
                    if normalize(line) == BLOCK_TERMINATOR {
                        State::Inserting
                    } else {
                        State::InPropertyBlock { anchor_line }
                    }
                }
                State::Inserting | State::Copying => State::Copying,
            };

            if state == State::Inserting {
                self.render_entries(heading, items, now, &mut out);
                state = State::Copying;
            }
        }

        match state {
            State::Inserting | State::Copying => Ok(out),
            State::Scanning => Err(PatchError::AnchorNotFound {
                anchor: self.anchor.clone(),
            }),
            State::InPropertyBlock { anchor_line } => Err(PatchError::UnterminatedPropertyBlock {
                anchor: self.anchor.clone(),
                line: anchor_line,
            }),
        }
    }

    fn render_entries(
        &self,
        parent_marker: &str,
        items: &[TaskItem],
        now: NaiveDateTime,
        out: &mut Vec<String>,
    ) {
        let child_marker = child_marker(parent_marker, self.levels_per_heading);
        let indent = " ".repeat(child_marker.chars().count());
        let logbook = logbook_lines(now);

        for item in items {
            out.push(format!("{child_marker} TODO {}", item.title));
            out.extend(logbook.iter().map(|l| format!("{indent}{l}")));
            out.extend(item.body.iter().map(|l| format!("{indent}{l}")));
        }
    }
}

/// Patch `old_lines` with a default patcher for `anchor_property`.
pub fn patch(
    old_lines: &[String],
    anchor_property: &str,
    items: &[TaskItem],
) -> Result<Vec<String>, PatchError> {
    OutlinePatcher::new(anchor_property).patch(old_lines, items)
}

/// The leading run of stars, e.g. `**` for `** Projects` and `*` for `*bold* text`.
fn heading_marker(line: &str) -> &str {
    &line[..line.len() - line.trim_start_matches(HEADING_MARKER).len()]
}

fn child_marker(parent: &str, levels: usize) -> String {
    let mut marker = parent.to_string();
    marker.extend(std::iter::repeat_n(HEADING_MARKER, levels));
    marker
}

fn normalize(line: &str) -> String {
    line.trim().to_lowercase()
}

/// The three-line state log org-mode writes when an entry becomes TODO.
fn logbook_lines(now: NaiveDateTime) -> [String; 3] {
    [
        LOGBOOK_OPEN.to_string(),
        format!(
            "- State \"TODO\"       from \"\"           {}",
            now.format(TIMESTAMP_FORMAT)
        ),
        LOGBOOK_CLOSE.to_string(),
    ]
}
