//! One scrape run: fetch → extract → patch → persist → mark seen.
//!
//! Runs are sequential and all-or-nothing. Any error aborts the run; the
//! outline is only replaced once every message has been turned into a
//! task item and the patch succeeded, and messages are only marked seen
//! after the new outline is on disk.

use std::path::PathBuf;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, error, info, warn};

use crate::config::{Config, EmailConfig};
use crate::diary::DiaryFile;
use crate::error::{MailboxError, Result};
use crate::mail::{Mailbox, MessageId, SearchQuery};
use crate::outline::OutlinePatcher;
use crate::todo::{TaskExtractor, TaskItem};

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Number of todos added to the outline.
    pub added: usize,
    /// Where the previous outline was moved; `None` when nothing changed.
    pub backup: Option<PathBuf>,
}

/// Wires the configured components together for a run.
pub struct Scraper {
    email: EmailConfig,
    query: SearchQuery,
    extractor: TaskExtractor,
    patcher: OutlinePatcher,
    diary: DiaryFile,
}

impl Scraper {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            email: config.email.clone(),
            query: SearchQuery::unseen_from(&config.senders())?,
            extractor: TaskExtractor::new(&config.org.todo_subject_keywords),
            patcher: OutlinePatcher::new(&config.org.todo_target_property_line)
                .with_levels_per_heading(config.org.levels_per_heading),
            diary: DiaryFile::new(&config.org.diary_file),
        })
    }

    /// Run once, stamping entries and the backup with the local time.
    pub fn run<M, F>(&self, connect: F) -> Result<RunReport>
    where
        M: Mailbox,
        F: FnOnce(&EmailConfig) -> std::result::Result<M, MailboxError>,
    {
        self.run_at(connect, Local::now().naive_local())
    }

    /// Run once with an explicit timestamp.
    ///
    /// The diary is checked before the mailbox is contacted.
    pub fn run_at<M, F>(&self, connect: F, now: NaiveDateTime) -> Result<RunReport>
    where
        M: Mailbox,
        F: FnOnce(&EmailConfig) -> std::result::Result<M, MailboxError>,
    {
        self.diary.check_available()?;

        let mut mailbox = connect(&self.email)?;
        let result = self.scrape(&mut mailbox, now);
        if let Err(e) = mailbox.logout() {
            warn!("Mailbox logout failed: {e}");
        }
        result
    }

    /// Run against an already connected mailbox.
    pub fn scrape<M: Mailbox + ?Sized>(&self, mailbox: &mut M, now: NaiveDateTime) -> Result<RunReport> {
        let (ids, items) = self.collect(mailbox)?;

        if items.is_empty() {
            info!("No new todos");
            return Ok(RunReport {
                added: 0,
                backup: None,
            });
        }

        let old = self.diary.read()?;
        let new_lines = self.patcher.patch_at(&old.lines, &items, now)?;
        let backup = self.diary.replace(&old.with_lines(new_lines), now)?;

        if let Err(e) = mailbox.mark_seen(&ids) {
            error!(
                count = ids.len(),
                "Todos were written but messages could not be marked seen; they will be added again next run"
            );
            return Err(e.into());
        }

        info!(count = items.len(), at = %now.format("%Y-%m-%d %H:%M"), "Added {} todos", items.len());
        Ok(RunReport {
            added: items.len(),
            backup: Some(backup),
        })
    }

    /// Search and extract every matching message, in server order.
    fn collect<M: Mailbox + ?Sized>(&self, mailbox: &mut M) -> Result<(Vec<MessageId>, Vec<TaskItem>)> {
        let ids = mailbox.search(&self.query)?;
        debug!(count = ids.len(), "Matching messages");

        let mut items = Vec::with_capacity(ids.len());
        for &id in &ids {
            let raw = mailbox.fetch(id)?;
            let item = self
                .extractor
                .extract(&raw)
                .inspect_err(|e| error!(uid = %id, "Cannot turn message into a todo: {e}"))?;
            debug!(uid = %id, title = %item.title, lines = item.body.len(), "Extracted todo");
            items.push(item);
        }

        Ok((ids, items))
    }
}
