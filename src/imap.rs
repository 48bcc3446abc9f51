//! Minimal blocking IMAP4rev1 client over rustls.
//!
//! Covers exactly what the poller needs: LOGIN, SELECT, STATUS, ranged
//! FETCH with `FLAGS BODY.PEEK[]`, STORE `\Seen`, LOGOUT. One session per
//! connection; the poller reconnects by dropping the session and building
//! a new one.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;

use crate::config::Config;
use crate::error::ImapError;

const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Total and unseen message counts from a STATUS query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxStatus {
    pub messages: u32,
    pub unseen: u32,
}

/// One entry from a ranged FETCH: sequence number, `\Seen` flag, raw bytes.
#[derive(Debug)]
pub struct FetchedEntry {
    pub seq: u32,
    pub seen: bool,
    pub raw: Vec<u8>,
}

/// An untagged response line, with its literal payload when one followed.
struct Untagged {
    line: String,
    literal: Option<Vec<u8>>,
}

/// An authenticated IMAP session with INBOX selected.
pub struct ImapSession {
    stream: rustls::StreamOwned<rustls::ClientConnection, TcpStream>,
    tag: u32,
}

impl ImapSession {
    /// Connect, authenticate, and select INBOX.
    pub fn connect(config: &Config) -> Result<Self, ImapError> {
        let tcp = TcpStream::connect((&*config.imap_host, config.imap_port)).map_err(|e| {
            ImapError::Connect {
                host: config.imap_host.clone(),
                port: config.imap_port,
                source: e,
            }
        })?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls::pki_types::ServerName::try_from(config.imap_host.clone())
            .map_err(|e| ImapError::Tls(e.to_string()))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| ImapError::Tls(e.to_string()))?;

        let mut session = Self {
            stream: rustls::StreamOwned::new(conn, tcp),
            tag: 0,
        };

        let _greeting = session.read_line()?;

        let login = format!(
            "LOGIN \"{}\" \"{}\"",
            config.imap_user,
            config.imap_password.expose_secret()
        );
        session.command(&login).map_err(|e| match e {
            ImapError::CommandFailed { reason, .. } => ImapError::AuthFailed {
                user: config.imap_user.clone(),
                reason,
            },
            other => other,
        })?;

        session.select()?;
        Ok(session)
    }

    /// (Re-)select INBOX. Run at the top of every poll cycle.
    pub fn select(&mut self) -> Result<(), ImapError> {
        self.command("SELECT \"INBOX\"")?;
        Ok(())
    }

    /// Query total and unseen counts for INBOX.
    pub fn status(&mut self) -> Result<MailboxStatus, ImapError> {
        let (_, untagged) = self.command("STATUS \"INBOX\" (MESSAGES UNSEEN)")?;
        untagged
            .iter()
            .find_map(|u| parse_status_counts(&u.line))
            .ok_or_else(|| ImapError::BadResponse("STATUS response without counts".to_string()))
    }

    /// Fetch flags and full content for a sequence range, peek only.
    ///
    /// Entries the server answers without a body literal (bare FLAGS
    /// updates) are skipped.
    pub fn fetch_range(&mut self, start: u32, end: u32) -> Result<Vec<FetchedEntry>, ImapError> {
        let (_, untagged) = self.command(&format!("FETCH {start}:{end} (FLAGS BODY.PEEK[])"))?;
        let mut entries = Vec::new();
        for u in untagged {
            let Some(seq) = parse_fetch_seq(&u.line) else {
                continue;
            };
            let Some(raw) = u.literal else {
                continue;
            };
            entries.push(FetchedEntry {
                seq,
                seen: entry_is_seen(&u.line),
                raw,
            });
        }
        Ok(entries)
    }

    /// Mark one message `\Seen` on the server.
    pub fn mark_seen(&mut self, seq: u32) -> Result<(), ImapError> {
        self.command(&format!("STORE {seq} +FLAGS (\\Seen)"))?;
        Ok(())
    }

    /// Best-effort clean shutdown; errors are deliberately dropped.
    pub fn logout(mut self) {
        let _ = self.command("LOGOUT");
    }

    // ── wire helpers ────────────────────────────────────────────────

    /// Send one tagged command and collect responses until its completion.
    ///
    /// Untagged lines ending in an IMAP literal (`{n}`) have the following
    /// n bytes attached; the remainder of that response is discarded.
    fn command(&mut self, cmd: &str) -> Result<(String, Vec<Untagged>), ImapError> {
        self.tag += 1;
        let tag = format!("A{}", self.tag);
        self.stream.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        self.stream.flush()?;

        let mut untagged = Vec::new();
        loop {
            let mut line = self.read_line()?;
            if line.starts_with(&format!("{tag} ")) {
                if !line[tag.len() + 1..].starts_with("OK") {
                    let command = cmd.split_whitespace().next().unwrap_or(cmd).to_string();
                    return Err(ImapError::CommandFailed {
                        command,
                        reason: line.trim_end().to_string(),
                    });
                }
                return Ok((line, untagged));
            }
            let literal = match parse_literal_len(&line) {
                Some(len) => {
                    let bytes = self.read_exact(len)?;
                    // The response continues after the literal, usually just
                    // ")" but some servers put data items (FLAGS included)
                    // there. Keep it on the line so nothing is lost.
                    let rest = self.read_line()?;
                    line.push_str(&rest);
                    Some(bytes)
                }
                None => None,
            };
            untagged.push(Untagged { line, literal });
        }
    }

    fn read_line(&mut self) -> Result<String, ImapError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.stream.read(&mut byte) {
                Ok(0) => return Err(ImapError::ConnectionClosed),
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).into_owned());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, ImapError> {
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => return Err(ImapError::ConnectionClosed),
                Ok(n) => filled += n,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(buf)
    }
}

// ── response parsing ────────────────────────────────────────────────

/// Pull MESSAGES and UNSEEN counts out of a `* STATUS` line.
fn parse_status_counts(line: &str) -> Option<MailboxStatus> {
    if !line.starts_with("* STATUS") {
        return None;
    }
    let messages = count_after(line, "MESSAGES")?;
    let unseen = count_after(line, "UNSEEN")?;
    Some(MailboxStatus { messages, unseen })
}

fn count_after(line: &str, key: &str) -> Option<u32> {
    let rest = &line[line.find(key)? + key.len()..];
    rest.split_whitespace()
        .next()?
        .trim_end_matches(')')
        .parse()
        .ok()
}

/// Whether a FETCH response carries the `\Seen` flag. The line includes
/// whatever followed the body literal, so flags emitted on either side of
/// `BODY[]` are found.
fn entry_is_seen(line: &str) -> bool {
    line.contains("\\Seen")
}

/// Sequence number from a `* <n> FETCH` line.
fn parse_fetch_seq(line: &str) -> Option<u32> {
    let mut parts = line.split_whitespace();
    if parts.next() != Some("*") {
        return None;
    }
    let seq = parts.next()?.parse().ok()?;
    (parts.next() == Some("FETCH")).then_some(seq)
}

/// Byte count of an IMAP literal announced at the end of a line.
fn parse_literal_len(line: &str) -> Option<usize> {
    let trimmed = line.trim_end();
    let open = trimmed.rfind('{')?;
    let close = trimmed.rfind('}')?;
    if close != trimmed.len() - 1 {
        return None;
    }
    trimmed[open + 1..close].parse().ok()
}
