//! Blocking IMAP4rev1 client over implicit TLS (port 993).
//!
//! Only the handful of commands the scraper needs: LOGIN, SELECT,
//! UID SEARCH, UID FETCH BODY.PEEK[], UID STORE and LOGOUT.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::config::EmailConfig;
use crate::error::MailboxError;
use crate::mail::search::quote;
use crate::mail::{Mailbox, MessageId, SearchQuery};

const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest literal accepted from the server.
const MAX_LITERAL: u64 = 64 * 1024 * 1024;

/// Trailing `{123}` announcing a literal of 123 bytes.
static LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\d+)\}\r?\n?$").expect("literal pattern is valid"));

pub type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Untagged output of one command.
#[derive(Debug, Default)]
struct Reply {
    lines: Vec<String>,
    literals: Vec<Vec<u8>>,
}

/// An authenticated IMAP session with the configured mailbox selected.
///
/// Generic over the transport; [`ImapMailbox::connect`] opens the TLS one.
pub struct ImapMailbox<S = TlsStream> {
    stream: BufReader<S>,
    server: String,
    tag: u32,
}

impl ImapMailbox<TlsStream> {
    /// Connect over TLS, log in and select `config.mailbox`.
    pub fn connect(config: &EmailConfig) -> Result<Self, MailboxError> {
        let tcp = TcpStream::connect((config.server.as_str(), config.port)).map_err(|e| {
            MailboxError::Unavailable {
                server: config.server.clone(),
                reason: e.to_string(),
            }
        })?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder_with_provider(Arc::new(
                rustls::crypto::ring::default_provider(),
            ))
            .with_safe_default_protocol_versions()
            .map_err(|e| MailboxError::Tls(e.to_string()))?
            .with_root_certificates(root_store)
            .with_no_client_auth(),
        );
        let server_name = rustls::pki_types::ServerName::try_from(config.server.clone())
            .map_err(|e| MailboxError::Tls(e.to_string()))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| MailboxError::Tls(e.to_string()))?;

        Self::start(rustls::StreamOwned::new(conn, tcp), config)
    }
}

impl<S: Read + Write> ImapMailbox<S> {
    /// Read the greeting on an open transport, log in and select `config.mailbox`.
    pub fn start(stream: S, config: &EmailConfig) -> Result<Self, MailboxError> {
        let mut session = Self {
            stream: BufReader::new(stream),
            server: config.server.clone(),
            tag: 0,
        };

        let greeting = session.read_line()?;
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(session.unavailable(format!("unexpected greeting: {}", greeting.trim_end())));
        }

        let login = format!(
            "LOGIN {} {}",
            quote(&config.username),
            quote(config.password.expose_secret())
        );
        session.command(&login).map_err(|e| match e {
            MailboxError::Protocol { .. } => MailboxError::AuthFailed {
                username: config.username.clone(),
            },
            other => other,
        })?;

        session.command(&format!("SELECT {}", quote(&config.mailbox)))?;
        info!(server = %config.server, mailbox = %config.mailbox, "IMAP session ready");

        Ok(session)
    }

    fn read_line(&mut self) -> Result<String, MailboxError> {
        let mut buf = Vec::new();
        let n = self.stream.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Err(self.unavailable("IMAP connection closed".into()));
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn read_literal(&mut self, cmd: &str, size: u64) -> Result<Vec<u8>, MailboxError> {
        if size > MAX_LITERAL {
            return Err(MailboxError::Protocol {
                command: command_name(cmd),
                response: format!("literal of {size} bytes exceeds the {MAX_LITERAL} byte limit"),
            });
        }
        let mut literal = Vec::new();
        (&mut self.stream).take(size).read_to_end(&mut literal)?;
        if (literal.len() as u64) < size {
            return Err(self.unavailable("IMAP connection closed inside a literal".into()));
        }
        Ok(literal)
    }

    fn unavailable(&self, reason: String) -> MailboxError {
        MailboxError::Unavailable {
            server: self.server.clone(),
            reason,
        }
    }

    /// Send one tagged command and collect its untagged output.
    fn command(&mut self, cmd: &str) -> Result<Reply, MailboxError> {
        self.tag += 1;
        let tag = format!("A{}", self.tag);

        let writer = self.stream.get_mut();
        writer.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        writer.flush()?;

        let mut reply = Reply::default();
        loop {
            let line = self.read_line()?;

            if let Some(size) = literal_size(&line) {
                let literal = self.read_literal(cmd, size)?;
                reply.literals.push(literal);
                reply.lines.push(line);
                continue;
            }

            if let Some(status) = line.strip_prefix(&tag) {
                let status = status.trim();
                if status.starts_with("OK") {
                    return Ok(reply);
                }
                return Err(MailboxError::Protocol {
                    command: command_name(cmd),
                    response: status.to_string(),
                });
            }

            reply.lines.push(line);
        }
    }
}

impl<S: Read + Write> Mailbox for ImapMailbox<S> {
    fn search(&mut self, query: &SearchQuery) -> Result<Vec<MessageId>, MailboxError> {
        let reply = self.command(&format!("UID SEARCH {}", query.to_imap()))?;
        let ids = parse_search(&reply.lines);
        debug!(count = ids.len(), "IMAP search complete");
        Ok(ids)
    }

    fn fetch(&mut self, id: MessageId) -> Result<Vec<u8>, MailboxError> {
        let cmd = format!("UID FETCH {id} BODY.PEEK[]");
        let reply = self.command(&cmd)?;
        reply
            .literals
            .into_iter()
            .next()
            .ok_or_else(|| MailboxError::Protocol {
                command: command_name(&cmd),
                response: format!("no message body returned for UID {id}"),
            })
    }

    fn mark_seen(&mut self, ids: &[MessageId]) -> Result<(), MailboxError> {
        if ids.is_empty() {
            return Ok(());
        }
        let set = ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.command(&format!("UID STORE {set} +FLAGS.SILENT (\\Seen)"))?;
        Ok(())
    }

    fn logout(&mut self) -> Result<(), MailboxError> {
        self.command("LOGOUT").map(drop)
    }
}

fn literal_size(line: &str) -> Option<u64> {
    LITERAL
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Collect ids from `* SEARCH 1 2 3` lines.
fn parse_search(lines: &[String]) -> Vec<MessageId> {
    lines
        .iter()
        .filter_map(|line| line.strip_prefix("* SEARCH"))
        .flat_map(str::split_whitespace)
        .filter_map(|n| n.parse().ok())
        .map(MessageId)
        .collect()
}

/// Command keyword for error messages; never includes arguments.
fn command_name(cmd: &str) -> String {
    let mut words = cmd.split_whitespace();
    match (words.next(), words.next()) {
        (Some("UID"), Some(sub)) => format!("UID {sub}"),
        (Some(first), _) => first.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// Transport replaying canned server output and recording what was sent.
    struct Script {
        input: Cursor<Vec<u8>>,
        sent: Vec<u8>,
    }

    impl Script {
        fn new(server_output: &[u8]) -> Self {
            Self {
                input: Cursor::new(server_output.to_vec()),
                sent: Vec::new(),
            }
        }
    }

    impl Read for Script {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Script {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.sent.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    const READY: &[u8] = b"* OK IMAP4rev1 ready\r\nA1 OK LOGIN completed\r\n\
* 3 EXISTS\r\nA2 OK [READ-WRITE] SELECT completed\r\n";

    fn email() -> EmailConfig {
        toml::from_str(
            r#"
server = "imap.example.com"
username = "todo@example.com"
password = "hunter2"
authorized_senders = ["me@example.com"]
"#,
        )
        .unwrap()
    }

    /// A logged-in session whose remaining server output is `after_select`.
    fn session(after_select: &[u8]) -> ImapMailbox<Script> {
        let mut output = READY.to_vec();
        output.extend_from_slice(after_select);
        ImapMailbox::start(Script::new(&output), &email()).unwrap()
    }

    fn sent(session: &ImapMailbox<Script>) -> String {
        String::from_utf8_lossy(&session.stream.get_ref().sent).into_owned()
    }

    // ── Session ─────────────────────────────────────────────────────

    #[test]
    fn start_logs_in_and_selects_mailbox() {
        let session = session(b"");
        assert_eq!(
            sent(&session),
            "A1 LOGIN \"todo@example.com\" \"hunter2\"\r\nA2 SELECT \"INBOX\"\r\n"
        );
    }

    #[test]
    fn rejected_login_is_auth_failure() {
        let script = Script::new(b"* OK ready\r\nA1 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n");
        let err = ImapMailbox::start(script, &email()).err().unwrap();
        assert!(matches!(err, MailboxError::AuthFailed { username } if username == "todo@example.com"));
    }

    #[test]
    fn bad_greeting_is_unavailable() {
        let err = ImapMailbox::start(Script::new(b"* BYE overloaded\r\n"), &email())
            .err()
            .unwrap();
        assert!(matches!(err, MailboxError::Unavailable { .. }));
    }

    #[test]
    fn closed_connection_is_unavailable() {
        let mut session = session(b"* SEARCH 1");
        let err = session
            .search(&SearchQuery::unseen_from(&["me@example.com"]).unwrap())
            .unwrap_err();
        assert!(matches!(err, MailboxError::Unavailable { .. }));
    }

    // ── Commands ────────────────────────────────────────────────────

    #[test]
    fn search_sends_query_and_parses_ids() {
        let mut session = session(b"* SEARCH 4 9\r\nA3 OK SEARCH completed\r\n");
        let query = SearchQuery::unseen_from(&["me@example.com"]).unwrap();

        let ids = session.search(&query).unwrap();

        assert_eq!(ids, vec![MessageId(4), MessageId(9)]);
        assert!(sent(&session).ends_with(&format!("A3 UID SEARCH {}\r\n", query.to_imap())));
    }

    #[test]
    fn fetch_reads_literal_without_setting_seen() {
        let message = b"From: me@example.com\r\nSubject: Task\r\n\r\nbody\r\n";
        let mut output = format!("* 1 FETCH (UID 7 BODY[] {{{}}}\r\n", message.len()).into_bytes();
        output.extend_from_slice(message);
        output.extend_from_slice(b")\r\nA3 OK FETCH completed\r\n");
        let mut session = session(&output);

        let raw = session.fetch(MessageId(7)).unwrap();

        assert_eq!(raw, message);
        assert!(sent(&session).ends_with("A3 UID FETCH 7 BODY.PEEK[]\r\n"));
    }

    #[test]
    fn fetch_rejection_names_the_command() {
        let mut session = session(b"A3 NO no such message\r\n");
        let err = session.fetch(MessageId(7)).unwrap_err();
        assert!(matches!(
            err,
            MailboxError::Protocol { command, response }
                if command == "UID FETCH" && response == "NO no such message"
        ));
    }

    #[test]
    fn fetch_without_literal_is_protocol_error() {
        let mut session = session(b"A3 OK FETCH completed\r\n");
        assert!(matches!(
            session.fetch(MessageId(7)),
            Err(MailboxError::Protocol { .. })
        ));
    }

    #[test]
    fn oversized_literal_is_refused() {
        let mut session = session(b"* 1 FETCH (UID 7 BODY[] {99999999999}\r\n");
        let err = session.fetch(MessageId(7)).unwrap_err();
        assert!(matches!(err, MailboxError::Protocol { command, .. } if command == "UID FETCH"));
    }

    #[test]
    fn truncated_literal_is_unavailable() {
        let mut session = session(b"* 1 FETCH (UID 7 BODY[] {100}\r\nshort");
        assert!(matches!(
            session.fetch(MessageId(7)),
            Err(MailboxError::Unavailable { .. })
        ));
    }

    #[test]
    fn mark_seen_stores_flag_for_all_ids() {
        let mut session = session(b"A3 OK STORE completed\r\n");
        session.mark_seen(&[MessageId(4), MessageId(9)]).unwrap();
        assert!(sent(&session).ends_with("A3 UID STORE 4,9 +FLAGS.SILENT (\\Seen)\r\n"));
    }

    #[test]
    fn mark_seen_with_no_ids_sends_nothing() {
        let mut session = session(b"");
        let before = sent(&session);
        session.mark_seen(&[]).unwrap();
        assert_eq!(sent(&session), before);
    }

    #[test]
    fn failed_logout_is_returned() {
        let mut session = session(b"A3 BAD unexpected\r\n");
        assert!(matches!(
            session.logout(),
            Err(MailboxError::Protocol { command, .. }) if command == "LOGOUT"
        ));
    }

    // ── Parsing ─────────────────────────────────────────────────────

    #[test]
    fn parses_search_response() {
        let lines = vec![
            "* SEARCH 4 17 23\r\n".to_string(),
            "* 3 EXISTS\r\n".to_string(),
        ];
        assert_eq!(
            parse_search(&lines),
            vec![MessageId(4), MessageId(17), MessageId(23)]
        );
    }

    #[test]
    fn empty_search_response() {
        assert!(parse_search(&["* SEARCH\r\n".to_string()]).is_empty());
    }

    #[test]
    fn detects_literal_size() {
        assert_eq!(literal_size("* 1 FETCH (UID 9 BODY[] {342}\r\n"), Some(342));
        assert_eq!(literal_size("* 1 FETCH (FLAGS (\\Seen))\r\n"), None);
    }

    #[test]
    fn command_name_hides_arguments() {
        assert_eq!(command_name("LOGIN \"me\" \"secret\""), "LOGIN");
        assert_eq!(command_name("UID FETCH 7 BODY.PEEK[]"), "UID FETCH");
    }
}
