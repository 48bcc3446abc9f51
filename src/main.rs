use std::sync::Arc;
use std::sync::atomic::Ordering;

use mailwatch::audit::AuditLog;
use mailwatch::config::Config;
use mailwatch::mailer::SmtpMailer;
use mailwatch::processor::TaskProcessor;
use mailwatch::{mailer::Mailer, poller};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!(
                "  Required: IMAP_SERVER, IMAP_USER, IMAP_PASSWORD, SMTP_USER, \
                 SMTP_PASSWORD, SMTP_FROM, NOTIFY_EMAIL, MASTER_EMAIL, ALLOWED_SENDERS"
            );
            std::process::exit(1);
        }
    };

    eprintln!("📬 mailwatch v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   IMAP: {}:{}", config.imap_host, config.imap_port);
    eprintln!("   Mailbox: {}", config.imap_user);
    eprintln!("   Notify: {}", config.notify_address);
    eprintln!("   Master: {}", config.master_address);
    eprintln!("   Allowed: {}", config.allowed_senders.join(", "));
    eprintln!("   Audit log: {}", config.audit_log_path);
    eprintln!(
        "   Polling every {}s (window {}, backoff {}s)\n",
        config.poll_interval_secs, config.fetch_window, config.reconnect_backoff_secs
    );

    let mailer: Arc<dyn Mailer> = Arc::new(SmtpMailer::from_config(&config));
    let audit = AuditLog::new(&config.audit_log_path);
    let processor = TaskProcessor::new(Arc::clone(&config), mailer, audit);

    let (mut handle, shutdown) = poller::spawn(Arc::clone(&config), processor);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupt received, shutting down");
            shutdown.store(true, Ordering::Relaxed);
            handle.await??;
        }
        result = &mut handle => {
            // The poller only returns on its own for a fatal startup error.
            result??;
        }
    }

    Ok(())
}
