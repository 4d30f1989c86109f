//! org-mail-todo — turn unread mail from trusted senders into org-mode TODOs.

pub mod config;
pub mod diary;
pub mod error;
pub mod mail;
pub mod outline;
pub mod scraper;
pub mod todo;
