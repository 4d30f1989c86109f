//! Mailbox access — the search/fetch contract the scraper depends on.

pub mod imap;
pub mod search;

pub use imap::ImapMailbox;
pub use search::SearchQuery;

use crate::error::MailboxError;

/// Server-side identifier of a message (an IMAP UID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub u32);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A mailbox the scraper can search and read.
///
/// `fetch` must not change the message's seen state; the scraper calls
/// `mark_seen` once the new todos are safely written.
pub trait Mailbox {
    /// Ids of messages matching `query`, in server order.
    fn search(&mut self, query: &SearchQuery) -> Result<Vec<MessageId>, MailboxError>;

    /// Raw RFC 822 bytes of one message.
    fn fetch(&mut self, id: MessageId) -> Result<Vec<u8>, MailboxError>;

    /// Mark messages as consumed so later searches skip them.
    fn mark_seen(&mut self, ids: &[MessageId]) -> Result<(), MailboxError>;

    /// End the session. The default does nothing.
    fn logout(&mut self) -> Result<(), MailboxError> {
        Ok(())
    }
}

impl<M: Mailbox + ?Sized> Mailbox for &mut M {
    fn search(&mut self, query: &SearchQuery) -> Result<Vec<MessageId>, MailboxError> {
        (**self).search(query)
    }

    fn fetch(&mut self, id: MessageId) -> Result<Vec<u8>, MailboxError> {
        (**self).fetch(id)
    }

    fn mark_seen(&mut self, ids: &[MessageId]) -> Result<(), MailboxError> {
        (**self).mark_seen(ids)
    }

    fn logout(&mut self) -> Result<(), MailboxError> {
        (**self).logout()
    }
}
