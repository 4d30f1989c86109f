//! The "unread mail from an authorized sender" search predicate.

use crate::error::ConfigError;

/// Unseen messages from any of a list of senders.
///
/// The clauses are OR-ed together, so their order does not change which
/// messages match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    senders: Vec<String>,
}

impl SearchQuery {
    /// Build the query; at least one non-blank sender is required.
    pub fn unseen_from<S: AsRef<str>>(senders: &[S]) -> Result<Self, ConfigError> {
        let senders: Vec<String> = senders
            .iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if senders.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "email.authorized_senders".into(),
                hint: "List at least one sender address allowed to create todos".into(),
            });
        }

        Ok(Self { senders })
    }

    pub fn senders(&self) -> &[String] {
        &self.senders
    }

    /// Render as IMAP SEARCH criteria.
    ///
    /// `a, b, c` becomes
    /// `(OR (OR (UNSEEN FROM "a") (UNSEEN FROM "b")) (UNSEEN FROM "c"))`.
    pub fn to_imap(&self) -> String {
        let mut clauses = self.senders.iter().map(|s| format!("UNSEEN FROM {}", quote(s)));
        // `unseen_from` guarantees at least one sender.
        let first = clauses.next().unwrap_or_default();
        let criteria = clauses.fold(first, |acc, clause| format!("OR ({acc}) ({clause})"));
        format!("({criteria})")
    }

    /// Evaluate the query locally, with IMAP `FROM` substring semantics.
    pub fn matches(&self, from: &str, seen: bool) -> bool {
        if seen {
            return false;
        }
        let from = from.to_lowercase();
        self.senders
            .iter()
            .any(|s| from.contains(&s.to_lowercase()))
    }
}

/// Quote a string for use in an IMAP command.
pub(crate) fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}
