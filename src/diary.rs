//! The outline file on disk: read it whole, replace it whole.
//!
//! Replacement renames the current file to a timestamped `.orig` backup and
//! then writes the new content at the original path, so the previous
//! version is always recoverable.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{error, info};

use crate::error::PersistError;

/// Suffix format appended to the diary path for backups.
const BACKUP_SUFFIX_FORMAT: &str = ".%Y-%m-%d-%H-%M.orig";

/// Line terminator used throughout a diary file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    /// The ending of the first terminated line; `Lf` if there is none.
    fn detect(content: &str) -> Self {
        match content.find('\n') {
            Some(i) if content[..i].ends_with('\r') => Self::CrLf,
            _ => Self::Lf,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
        }
    }
}

/// Diary content as lines plus the layout needed to write it back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiaryText {
    /// Lines without their terminators.
    pub lines: Vec<String>,
    pub ending: LineEnding,
    /// Whether the last line was terminated.
    pub trailing_newline: bool,
}

impl DiaryText {
    pub fn parse(content: &str) -> Self {
        let ending = LineEnding::detect(content);
        let trailing_newline = content.ends_with('\n');
        let body = content.strip_suffix('\n').unwrap_or(content);

        let lines = if content.is_empty() {
            Vec::new()
        } else {
            body.split('\n')
                .map(|l| match ending {
                    LineEnding::CrLf => l.strip_suffix('\r').unwrap_or(l),
                    LineEnding::Lf => l,
                })
                .map(str::to_string)
                .collect()
        };

        Self {
            lines,
            ending,
            trailing_newline,
        }
    }

    /// Same layout, different lines.
    pub fn with_lines(&self, lines: Vec<String>) -> Self {
        Self {
            lines,
            ending: self.ending,
            trailing_newline: self.trailing_newline,
        }
    }

    pub fn render(&self) -> String {
        let eol = self.ending.as_str();
        let mut content = self.lines.join(eol);
        if self.trailing_newline && !self.lines.is_empty() {
            content.push_str(eol);
        }
        content
    }
}

/// Handle on the outline ("diary") file.
#[derive(Debug, Clone)]
pub struct DiaryFile {
    path: PathBuf,
}

impl DiaryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fail early if the file cannot be opened for reading.
    pub fn check_available(&self) -> Result<(), PersistError> {
        fs::File::open(&self.path)
            .map(drop)
            .map_err(|source| self.unavailable(source))
    }

    /// Read the whole file, remembering its line ending and final newline.
    pub fn read(&self) -> Result<DiaryText, PersistError> {
        let content = fs::read_to_string(&self.path).map_err(|source| self.unavailable(source))?;
        Ok(DiaryText::parse(&content))
    }

    /// Path the current file is moved to when replaced at `now`.
    pub fn backup_path(&self, now: NaiveDateTime) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(now.format(BACKUP_SUFFIX_FORMAT).to_string());
        PathBuf::from(name)
    }

    /// Back up the current file, then write `text` in its place.
    ///
    /// Returns the backup path. If writing fails the backup is moved back.
    pub fn replace(&self, text: &DiaryText, now: NaiveDateTime) -> Result<PathBuf, PersistError> {
        let backup = self.backup_path(now);

        fs::rename(&self.path, &backup).map_err(|source| PersistError::Backup {
            path: self.path.clone(),
            backup: backup.clone(),
            source,
        })?;

        if let Err(source) = fs::write(&self.path, text.render()) {
            error!(path = %self.path.display(), "Writing new diary failed: {source}");
            if let Err(e) = fs::rename(&backup, &self.path) {
                error!(backup = %backup.display(), "Restoring diary from backup failed: {e}");
            }
            return Err(PersistError::Write {
                path: self.path.clone(),
                backup,
                source,
            });
        }

        info!(path = %self.path.display(), backup = %backup.display(), "Diary replaced");
        Ok(backup)
    }

    fn unavailable(&self, source: std::io::Error) -> PersistError {
        PersistError::DiaryUnavailable {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 17)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let diary = DiaryFile::new(dir.path().join("nope.org"));
        assert!(matches!(
            diary.check_available(),
            Err(PersistError::DiaryUnavailable { .. })
        ));
        assert!(matches!(
            diary.read(),
            Err(PersistError::DiaryUnavailable { .. })
        ));
    }

    #[test]
    fn backup_path_is_timestamped() {
        let diary = DiaryFile::new("/home/me/org/diary.org");
        assert_eq!(
            diary.backup_path(at(7, 3)),
            PathBuf::from("/home/me/org/diary.org.2026-10-17-07-03.orig")
        );
    }

    fn new_lines(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn replace_keeps_backup_and_writes_new_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diary.org");
        fs::write(&path, "* Inbox\nold\n").unwrap();

        let diary = DiaryFile::new(&path);
        let old = diary.read().unwrap();
        assert_eq!(old.lines, vec!["* Inbox", "old"]);

        let backup = diary
            .replace(&old.with_lines(new_lines(&["* Inbox", "new"])), at(12, 0))
            .unwrap();

        assert_eq!(fs::read_to_string(&backup).unwrap(), "* Inbox\nold\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "* Inbox\nnew\n");
    }

    // ── Layout preservation ─────────────────────────────────────────

    #[test]
    fn crlf_file_stays_crlf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diary.org");
        fs::write(&path, "* Inbox\r\nold\r\n").unwrap();

        let diary = DiaryFile::new(&path);
        let old = diary.read().unwrap();
        assert_eq!(old.lines, vec!["* Inbox", "old"]);
        assert_eq!(old.ending, LineEnding::CrLf);

        diary
            .replace(&old.with_lines(new_lines(&["* Inbox", "** TODO new", "old"])), at(12, 0))
            .unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "* Inbox\r\n** TODO new\r\nold\r\n"
        );
    }

    #[test]
    fn missing_final_newline_is_not_added() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diary.org");
        fs::write(&path, "* Inbox\nlast").unwrap();

        let diary = DiaryFile::new(&path);
        let old = diary.read().unwrap();
        assert!(!old.trailing_newline);

        diary
            .replace(&old.with_lines(new_lines(&["* Inbox", "mid", "last"])), at(12, 0))
            .unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "* Inbox\nmid\nlast");
    }

    #[test]
    fn unchanged_lines_render_byte_identical() {
        for content in ["", "\n", "a\n\nb\n", "a\r\n\r\nb", "only"] {
            assert_eq!(DiaryText::parse(content).render(), content, "{content:?}");
        }
    }

    #[test]
    fn replace_fails_when_file_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let diary = DiaryFile::new(dir.path().join("diary.org"));
        let err = diary.replace(&DiaryText::default(), at(12, 0)).unwrap_err();
        assert!(matches!(err, PersistError::Backup { .. }));
    }
}
