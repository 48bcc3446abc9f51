//! Outbound mail — `Mailer` trait plus the SMTP implementation over lettre.

use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;

use crate::config::Config;
use crate::error::MailerError;

/// Sends one plain-text message. Implementations open and close their own
/// connection per send; no pooling, no retry.
pub trait Mailer: Send + Sync {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailerError>;
}

/// SMTP mailer over lettre's blocking transport.
///
/// Port 465 uses implicit TLS, anything else STARTTLS.
pub struct SmtpMailer {
    host: String,
    port: u16,
    user: String,
    password: secrecy::SecretString,
    from: String,
}

impl SmtpMailer {
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.smtp_host.clone(),
            port: config.smtp_port,
            user: config.smtp_user.clone(),
            password: config.smtp_password.clone(),
            from: config.smtp_from.clone(),
        }
    }

    fn transport(&self) -> Result<SmtpTransport, MailerError> {
        let builder = if self.port == 465 {
            SmtpTransport::relay(&self.host)
        } else {
            SmtpTransport::starttls_relay(&self.host)
        }
        .map_err(|e| MailerError::Transport(e.to_string()))?;

        let creds = Credentials::new(
            self.user.clone(),
            self.password.expose_secret().to_string(),
        );
        Ok(builder.port(self.port).credentials(creds).build())
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailerError> {
        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| MailerError::InvalidAddress {
                        address: self.from.clone(),
                        reason: format!("{e}"),
                    })?,
            )
            .to(to.parse().map_err(|e| MailerError::InvalidAddress {
                address: to.to_string(),
                reason: format!("{e}"),
            })?)
            .subject(subject)
            .body(body.to_string())
            .map_err(|e| MailerError::Build(e.to_string()))?;

        self.transport()?
            .send(&message)
            .map_err(|e| MailerError::Transport(e.to_string()))?;

        tracing::info!(to, "Email sent");
        Ok(())
    }
}
