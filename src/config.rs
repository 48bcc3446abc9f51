//! Configuration — built once from environment variables at startup.

use secrecy::SecretString;

use crate::error::ConfigError;

/// Immutable watcher configuration, passed explicitly to the poller and
/// processor. Never read from the environment after startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub imap_host: String,
    pub imap_port: u16,
    pub imap_user: String,
    pub imap_password: SecretString,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_password: SecretString,
    pub smtp_from: String,
    /// Address that receives notifications about mail from allowed senders.
    pub notify_address: String,
    /// The one sender whose messages are acknowledged directly.
    pub master_address: String,
    /// Bare addresses allowed to trigger workflows. Matched case-sensitively.
    pub allowed_senders: Vec<String>,
    /// Path of the append-only JSON-lines audit log.
    pub audit_log_path: String,
    pub poll_interval_secs: u64,
    /// How many of the most recent mailbox positions each cycle fetches.
    pub fetch_window: u32,
    pub reconnect_backoff_secs: u64,
}

fn required(key: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingEnvVar(key.to_string())),
    }
}

fn optional_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("could not parse {v:?}"),
        }),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Build config from environment variables.
    ///
    /// Missing required values are a startup error, not a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let imap_host = required("IMAP_SERVER")?;
        let imap_port: u16 = optional_parsed("IMAP_PORT", 993)?;
        let imap_user = required("IMAP_USER")?;
        let imap_password = SecretString::from(required("IMAP_PASSWORD")?);

        let smtp_host =
            std::env::var("SMTP_SERVER").unwrap_or_else(|_| imap_host.replace("imap", "smtp"));
        let smtp_port: u16 = optional_parsed("SMTP_PORT", 465)?;
        let smtp_user = required("SMTP_USER")?;
        let smtp_password = SecretString::from(required("SMTP_PASSWORD")?);
        let smtp_from = required("SMTP_FROM")?;

        let notify_address = required("NOTIFY_EMAIL")?;
        let master_address = required("MASTER_EMAIL")?;

        let allowed_senders: Vec<String> = required("ALLOWED_SENDERS")?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if allowed_senders.is_empty() {
            return Err(ConfigError::MissingEnvVar("ALLOWED_SENDERS".to_string()));
        }

        let audit_log_path =
            std::env::var("TASK_LOG").unwrap_or_else(|_| "/tmp/email_tasks.log".to_string());
        let poll_interval_secs: u64 = optional_parsed("POLL_INTERVAL_SECS", 30)?;
        let fetch_window: u32 = optional_parsed("FETCH_WINDOW", 20)?;
        let reconnect_backoff_secs: u64 = optional_parsed("RECONNECT_BACKOFF_SECS", 5)?;

        Ok(Self {
            imap_host,
            imap_port,
            imap_user,
            imap_password,
            smtp_host,
            smtp_port,
            smtp_user,
            smtp_password,
            smtp_from,
            notify_address,
            master_address,
            allowed_senders,
            audit_log_path,
            poll_interval_secs,
            fetch_window,
            reconnect_backoff_secs,
        })
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        imap_host: "imap.test.com".into(),
        imap_port: 993,
        imap_user: "user".into(),
        imap_password: SecretString::from("pass"),
        smtp_host: "smtp.test.com".into(),
        smtp_port: 465,
        smtp_user: "user".into(),
        smtp_password: SecretString::from("pass"),
        smtp_from: "assistant@test.com".into(),
        notify_address: "notify@example.com".into(),
        master_address: "master@example.com".into(),
        allowed_senders: vec!["master@example.com".into(), "trusted@example.com".into()],
        audit_log_path: "/tmp/email_tasks.log".into(),
        poll_interval_secs: 30,
        fetch_window: 20,
        reconnect_backoff_secs: 5,
    }
}
