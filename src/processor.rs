//! Task processor — dispatches reply/notification workflows per sender class.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::audit::{AuditLog, AuditRecord};
use crate::config::Config;
use crate::error::ProcessError;
use crate::mailer::Mailer;
use crate::message::NormalizedMessage;
use crate::policy::SenderClass;

/// Preview length in the direct acknowledgment sent to the master.
const REPLY_PREVIEW_CHARS: usize = 200;
/// Preview length in the notification sent to the notify address.
const NOTIFY_PREVIEW_CHARS: usize = 300;

const SIGNATURE: &str = "The mail assistant";

/// Handles one decoded message: audits it, then runs the workflow for its
/// classification. Send failures are logged and swallowed so a downstream
/// SMTP problem never stalls the poll loop.
pub struct TaskProcessor {
    config: Arc<Config>,
    mailer: Arc<dyn Mailer>,
    audit: AuditLog,
}

impl TaskProcessor {
    pub fn new(config: Arc<Config>, mailer: Arc<dyn Mailer>, audit: AuditLog) -> Self {
        Self {
            config,
            mailer,
            audit,
        }
    }

    /// Run the workflow for one message.
    ///
    /// The audit record is appended unconditionally before any send; an
    /// audit failure is the only error this returns.
    pub fn handle(
        &self,
        msg: &NormalizedMessage,
        class: SenderClass,
    ) -> Result<(), ProcessError> {
        self.audit.append(&AuditRecord {
            timestamp: Utc::now(),
            from: &msg.sender,
            subject: &msg.subject,
            body: &msg.body,
        })?;

        match class {
            SenderClass::Unauthorized => {
                info!(sender = %msg.sender, "Sender not on allow-list, ignoring");
            }
            SenderClass::Privileged => {
                let body = format!(
                    "Task received and is being processed.\n\n\
                     Task details:\n\
                     - From: {}\n\
                     - Subject: {}\n\
                     - Content: {}\n\n\
                     In reference to message: {}\n\n\
                     {SIGNATURE}\n",
                    msg.sender,
                    msg.subject,
                    truncate_preview(&msg.body, REPLY_PREVIEW_CHARS),
                    msg.message_id,
                );
                self.send_logged(msg.bare_sender(), &format!("Re: {}", msg.subject), &body);
            }
            SenderClass::StandardAuthorized => {
                self.notify(msg);
                let body = format!(
                    "Your message has been received.\n\n\
                     It has been forwarded for review; you will hear back once \
                     there are instructions on how to proceed.\n\n\
                     In reference to message: {}\n\n\
                     {SIGNATURE}\n",
                    msg.message_id,
                );
                self.send_logged(msg.bare_sender(), &format!("Re: {}", msg.subject), &body);
            }
        }

        Ok(())
    }

    /// Tell the notify address about mail from an allowed sender.
    fn notify(&self, msg: &NormalizedMessage) {
        let now = Utc::now().format("%Y-%m-%d %H:%M:%S");
        let body = format!(
            "New mail received.\n\n\
             ----------------------------------------\n\n\
             From: {}\n\
             Subject: {}\n\
             Time: {now}\n\n\
             Content:\n{}\n\n\
             ----------------------------------------\n\n\
             Please advise whether to reply to or act on this message.\n\n\
             {SIGNATURE}\n",
            msg.sender,
            msg.subject,
            truncate_preview(&msg.body, NOTIFY_PREVIEW_CHARS),
        );
        let subject = format!("[notify] New mail from {}", msg.bare_sender());
        self.send_logged(&self.config.notify_address, &subject, &body);
    }

    /// Best-effort send: failures become a log line, never an error.
    fn send_logged(&self, to: &str, subject: &str, body: &str) {
        if let Err(e) = self.mailer.send(to, subject, body) {
            warn!(to, error = %e, "Send failed");
        }
    }
}

/// First `max_chars` characters, with `...` appended only when truncated.
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.char_indices();
    match chars.nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
