//! Error types for mailwatch.

/// Top-level error type for the watcher.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IMAP error: {0}")]
    Imap(#[from] ImapError),

    #[error("Mailer error: {0}")]
    Mailer(#[from] MailerError),

    #[error("Processing error: {0}")]
    Process(#[from] ProcessError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors from the IMAP session.
#[derive(Debug, thiserror::Error)]
pub enum ImapError {
    #[error("Connection to {host}:{port} failed: {source}")]
    Connect {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("Authentication failed for {user}: {reason}")]
    AuthFailed { user: String, reason: String },

    #[error("Server rejected {command}: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Malformed server response: {0}")]
    BadResponse(String),

    #[error("Connection closed by server")]
    ConnectionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the outbound SMTP mailer.
#[derive(Debug, thiserror::Error)]
pub enum MailerError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),
}

/// Per-message processing errors.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to decode message: {0}")]
    Decode(String),

    #[error("Failed to append audit record: {0}")]
    Audit(#[from] std::io::Error),

    #[error("Failed to serialize audit record: {0}")]
    AuditSerialize(#[from] serde_json::Error),
}

/// Result type alias for the watcher.
pub type Result<T> = std::result::Result<T, Error>;
