//! Task items scraped from mail.

pub mod extract;

pub use extract::{TaskExtractor, unfold_soft_breaks};

/// One todo: a title plus its detail lines, in order.
///
/// The title is never empty once produced by [`TaskExtractor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskItem {
    pub title: String,
    pub body: Vec<String>,
}

impl TaskItem {
    pub fn new(title: impl Into<String>, body: Vec<String>) -> Self {
        Self {
            title: title.into(),
            body,
        }
    }
}
