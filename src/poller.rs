//! Mailbox poller — fixed-interval poll loop with reconnect-on-failure.
//!
//! Single logical thread: the whole loop runs inside one `spawn_blocking`
//! task so the IMAP session lives across cycles. Delivery is at-least-once:
//! the session dedup set is cleared on reconnect, so a message handled but
//! not yet flagged `\Seen` when the connection drops can be reprocessed.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Error, ImapError, Result};
use crate::imap::{FetchedEntry, ImapSession};
use crate::message;
use crate::policy;
use crate::processor::TaskProcessor;

/// Slice length for interruptible sleeps, so shutdown is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(500);

/// The one piece of session behavior the batch loop needs. Keeps the
/// loop drivable without a live connection.
trait MarkSeen {
    fn mark_seen(&mut self, seq: u32) -> std::result::Result<(), ImapError>;
}

impl MarkSeen for ImapSession {
    fn mark_seen(&mut self, seq: u32) -> std::result::Result<(), ImapError> {
        ImapSession::mark_seen(self, seq)
    }
}

/// Owns the IMAP connection and the session dedup set. Nothing else
/// touches either.
pub struct Poller {
    config: Arc<Config>,
    processor: TaskProcessor,
    /// Sequence numbers fully handled in the current connection session.
    handled: HashSet<u32>,
    shutdown: Arc<AtomicBool>,
    last_unseen: u32,
}

/// Spawn the poller on the blocking pool.
///
/// Returns the join handle and the shutdown flag; set the flag to stop
/// the loop at the next cycle boundary.
pub fn spawn(config: Arc<Config>, processor: TaskProcessor) -> (JoinHandle<Result<()>>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let mut poller = Poller {
        config,
        processor,
        handled: HashSet::new(),
        shutdown: Arc::clone(&shutdown),
        last_unseen: 0,
    };
    let handle = tokio::task::spawn_blocking(move || poller.run());
    (handle, shutdown)
}

impl Poller {
    /// Run until shutdown. An initial connection failure is fatal and
    /// propagates; every later fault reconnects instead.
    fn run(&mut self) -> Result<()> {
        info!(
            host = %self.config.imap_host,
            interval_secs = self.config.poll_interval_secs,
            "Connecting to mailbox"
        );
        let mut session = Some(ImapSession::connect(&self.config).map_err(Error::Imap)?);
        info!(user = %self.config.imap_user, "Connected, watching INBOX");

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            // The session is absent only right after a cycle fault;
            // reconnect() restores it before the next cycle runs.
            let Some(mut s) = session.take() else {
                session = self.reconnect();
                continue;
            };

            match self.poll_cycle(&mut s) {
                Ok(()) => {
                    session = Some(s);
                    self.sleep_interruptible(Duration::from_secs(self.config.poll_interval_secs));
                }
                Err(e) => {
                    error!(error = %e, "Poll cycle failed, reconnecting");
                    s.logout();
                    self.handled.clear();
                }
            }
        }

        info!("Poller stopped");
        if let Some(s) = session.take() {
            s.logout();
        }
        Ok(())
    }

    /// One poll cycle: re-select, status, fetch window, dispatch, re-status.
    fn poll_cycle(&mut self, session: &mut ImapSession) -> std::result::Result<(), ImapError> {
        session.select()?;
        let status = session.status()?;

        if status.unseen > self.last_unseen {
            info!(count = status.unseen - self.last_unseen, "New mail detected");
        }

        if status.messages > 0 {
            let (start, end) = fetch_window(status.messages, self.config.fetch_window);
            let entries = session.fetch_range(start, end)?;
            self.process_batch(&entries, session)?;
        }

        // Second query by design: refreshes the new-mail counter after the
        // batch, at the cost of racing with arrivals in between. Only the
        // log line above depends on it.
        self.last_unseen = session.status()?.unseen;
        Ok(())
    }

    /// Iterate one fetched batch, newest first. Entries flagged seen or
    /// already handled this session are skipped. A per-entry failure is
    /// logged and the entry stays unflagged so the next cycle retries it;
    /// a mark-seen failure is a connection fault and propagates.
    fn process_batch(
        &mut self,
        entries: &[FetchedEntry],
        mailbox: &mut impl MarkSeen,
    ) -> std::result::Result<(), ImapError> {
        // Newest first; the range comes back in ascending order.
        for entry in entries.iter().rev() {
            if entry.seen || self.handled.contains(&entry.seq) {
                continue;
            }
            match self.process_entry(entry) {
                Ok(()) => {
                    // Flag on the server only after the workflow ran; an
                    // entry that failed stays unseen and retries.
                    mailbox.mark_seen(entry.seq)?;
                }
                Err(e) => {
                    warn!(seq = entry.seq, error = %e, "Skipping message");
                }
            }
        }
        Ok(())
    }

    /// Decode, classify, and dispatch one entry. On success the sequence
    /// number joins the session dedup set.
    fn process_entry(&mut self, entry: &FetchedEntry) -> std::result::Result<(), crate::error::ProcessError> {
        let msg = message::decode(&entry.raw)?;
        let class = policy::classify(
            &msg.sender,
            &self.config.allowed_senders,
            &self.config.master_address,
        );
        debug!(seq = entry.seq, sender = %msg.sender, ?class, "Processing message");
        self.processor.handle(&msg, class)?;
        self.handled.insert(entry.seq);
        Ok(())
    }

    /// Re-establish the session, backing off between attempts. Unbounded;
    /// gives up only on shutdown.
    fn reconnect(&mut self) -> Option<ImapSession> {
        loop {
            self.sleep_interruptible(Duration::from_secs(self.config.reconnect_backoff_secs));
            if self.shutdown.load(Ordering::Relaxed) {
                return None;
            }
            match ImapSession::connect(&self.config) {
                Ok(session) => {
                    info!("Reconnected to mailbox");
                    return Some(session);
                }
                Err(e) => {
                    error!(error = %e, "Reconnect failed, retrying");
                }
            }
        }
    }

    fn sleep_interruptible(&self, total: Duration) {
        let mut remaining = total;
        while !remaining.is_zero() && !self.shutdown.load(Ordering::Relaxed) {
            let slice = remaining.min(SLEEP_SLICE);
            std::thread::sleep(slice);
            remaining -= slice;
        }
    }
}

/// The most recent `window` sequence positions, clamped to the mailbox start.
fn fetch_window(total: u32, window: u32) -> (u32, u32) {
    let start = total.saturating_sub(window.saturating_sub(1)).max(1);
    (start, total)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::audit::AuditLog;
    use crate::config::test_config;
    use crate::error::MailerError;
    use crate::mailer::Mailer;

    struct NullMailer {
        sent: Mutex<usize>,
    }

    impl Mailer for NullMailer {
        fn send(
            &self,
            _to: &str,
            _subject: &str,
            _body: &str,
        ) -> std::result::Result<(), MailerError> {
            *self.sent.lock().unwrap() += 1;
            Ok(())
        }
    }

    /// Records mark-seen calls; optionally fails them.
    struct FakeMailbox {
        marked: Vec<u32>,
        fail: bool,
    }

    impl FakeMailbox {
        fn new() -> Self {
            Self {
                marked: Vec::new(),
                fail: false,
            }
        }
    }

    impl MarkSeen for FakeMailbox {
        fn mark_seen(&mut self, seq: u32) -> std::result::Result<(), ImapError> {
            if self.fail {
                return Err(ImapError::ConnectionClosed);
            }
            self.marked.push(seq);
            Ok(())
        }
    }

    fn entry(seq: u32, seen: bool, raw: &str) -> FetchedEntry {
        FetchedEntry {
            seq,
            seen,
            raw: raw.replace('\n', "\r\n").into_bytes(),
        }
    }

    fn plain_entry(seq: u32, seen: bool) -> FetchedEntry {
        entry(
            seq,
            seen,
            "From: Alice <trusted@example.com>\nSubject: Hi\n\nhello\n",
        )
    }

    fn test_poller() -> (Poller, Arc<NullMailer>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.audit_log_path = dir.path().join("tasks.log").to_string_lossy().into_owned();
        let config = Arc::new(config);
        let mailer = Arc::new(NullMailer {
            sent: Mutex::new(0),
        });
        let processor = TaskProcessor::new(
            Arc::clone(&config),
            mailer.clone(),
            AuditLog::new(&config.audit_log_path),
        );
        let poller = Poller {
            config,
            processor,
            handled: HashSet::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
            last_unseen: 0,
        };
        (poller, mailer, dir)
    }

    #[test]
    fn window_covers_last_twenty() {
        assert_eq!(fetch_window(100, 20), (81, 100));
    }

    #[test]
    fn window_clamps_to_mailbox_start() {
        assert_eq!(fetch_window(5, 20), (1, 5));
        assert_eq!(fetch_window(1, 20), (1, 1));
    }

    #[test]
    fn window_of_one() {
        assert_eq!(fetch_window(10, 1), (10, 10));
    }

    #[test]
    fn processed_entry_joins_dedup_set() {
        let (mut poller, _mailer, _dir) = test_poller();
        let entry = FetchedEntry {
            seq: 7,
            seen: false,
            raw: b"From: stranger@evil.com\r\nSubject: x\r\n\r\nhi\r\n".to_vec(),
        };
        poller.process_entry(&entry).unwrap();
        assert!(poller.handled.contains(&7));
    }

    #[test]
    fn undecodable_entry_stays_out_of_dedup_set() {
        let (mut poller, _mailer, _dir) = test_poller();
        let entry = FetchedEntry {
            seq: 3,
            seen: false,
            raw: Vec::new(),
        };
        assert!(poller.process_entry(&entry).is_err());
        assert!(!poller.handled.contains(&3));
    }

    #[test]
    fn allowed_entry_triggers_sends() {
        let (mut poller, mailer, _dir) = test_poller();
        let entry = FetchedEntry {
            seq: 1,
            seen: false,
            raw: b"From: Alice <trusted@example.com>\r\nSubject: Hi\r\n\r\nhello\r\n".to_vec(),
        };
        poller.process_entry(&entry).unwrap();
        // Notification + acknowledgment.
        assert_eq!(*mailer.sent.lock().unwrap(), 2);
    }

    #[test]
    fn batch_continues_past_one_bad_entry() {
        let (mut poller, _mailer, _dir) = test_poller();
        let mut mailbox = FakeMailbox::new();
        let entries = vec![
            plain_entry(1, false),
            plain_entry(2, false),
            entry(3, false, ""), // fails decode
            plain_entry(4, false),
            plain_entry(5, false),
        ];

        poller.process_batch(&entries, &mut mailbox).unwrap();

        assert_eq!(mailbox.marked, vec![5, 4, 2, 1]);
        for seq in [1, 2, 4, 5] {
            assert!(poller.handled.contains(&seq));
        }
        assert!(!poller.handled.contains(&3));
    }

    #[test]
    fn batch_skips_entries_flagged_seen() {
        let (mut poller, mailer, _dir) = test_poller();
        let mut mailbox = FakeMailbox::new();
        let entries = vec![plain_entry(1, false), plain_entry(2, true)];

        poller.process_batch(&entries, &mut mailbox).unwrap();

        assert_eq!(mailbox.marked, vec![1]);
        assert!(!poller.handled.contains(&2));
        // Notification + acknowledgment for the one unseen entry only.
        assert_eq!(*mailer.sent.lock().unwrap(), 2);
    }

    #[test]
    fn batch_skips_entries_already_handled_this_session() {
        let (mut poller, mailer, _dir) = test_poller();
        poller.handled.insert(1);
        let mut mailbox = FakeMailbox::new();

        poller
            .process_batch(&[plain_entry(1, false)], &mut mailbox)
            .unwrap();

        assert!(mailbox.marked.is_empty());
        assert_eq!(*mailer.sent.lock().unwrap(), 0);
    }

    #[test]
    fn mark_seen_failure_propagates_as_connection_fault() {
        let (mut poller, _mailer, _dir) = test_poller();
        let mut mailbox = FakeMailbox::new();
        mailbox.fail = true;

        let result = poller.process_batch(&[plain_entry(1, false)], &mut mailbox);

        assert!(result.is_err());
    }

    #[test]
    fn sleep_interruptible_returns_early_on_shutdown() {
        let (poller, _mailer, _dir) = test_poller();
        poller.shutdown.store(true, Ordering::Relaxed);
        let start = std::time::Instant::now();
        poller.sleep_interruptible(Duration::from_secs(30));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
