//! Outbound email delivery
//!
//! Every notification is fire-and-forget relative to the state change that
//! triggered it: the send runs on a spawned task after the database commit,
//! and a delivery failure is logged, never propagated to the caller.

use anyhow::Result;
use lettre::{
    SmtpTransport, Transport,
    message::{Mailbox, Message, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use tracing::{info, warn};

/// SMTP configuration
#[derive(Debug, Clone)]
pub struct MailerConfig {
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
    /// SMTP username, enables authenticated TLS relay when set with a password
    pub smtp_user: Option<String>,
    /// SMTP password
    pub smtp_pass: Option<String>,
    /// From address for all outbound mail
    pub from_address: String,
}

impl MailerConfig {
    /// Create a new MailerConfig from environment variables
    ///
    /// # Environment Variables
    /// - `SMTP_HOST`: SMTP server hostname (default: localhost)
    /// - `SMTP_PORT`: SMTP server port (default: 25)
    /// - `SMTP_USER` / `SMTP_PASS`: relay credentials, optional
    /// - `SMTP_FROM`: from address (default: noreply@stratus.example)
    pub fn from_env() -> Self {
        let smtp_host = std::env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string());
        let smtp_port = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(25);
        let smtp_user = std::env::var("SMTP_USER").ok();
        let smtp_pass = std::env::var("SMTP_PASS").ok();
        let from_address =
            std::env::var("SMTP_FROM").unwrap_or_else(|_| "noreply@stratus.example".to_string());

        Self {
            smtp_host,
            smtp_port,
            smtp_user,
            smtp_pass,
            from_address,
        }
    }
}

/// Mailer backed by an SMTP transport
#[derive(Clone)]
pub struct Mailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl Mailer {
    /// Create a new mailer from configuration
    ///
    /// With credentials configured the transport is an authenticated TLS
    /// relay; without them it is a plain connection for a local MTA.
    pub fn new(config: &MailerConfig) -> Result<Self> {
        let transport = match (&config.smtp_user, &config.smtp_pass) {
            (Some(user), Some(pass)) => SmtpTransport::relay(&config.smtp_host)?
                .credentials(Credentials::new(user.clone(), pass.clone()))
                .build(),
            _ => SmtpTransport::builder_dangerous(&config.smtp_host)
                .port(config.smtp_port)
                .build(),
        };

        let from = config
            .from_address
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid from address: {}", e))?;

        Ok(Self { transport, from })
    }

    /// Send a plain-text email, blocking until the transport accepts it
    fn send(&self, to: &str, subject: &str, body: String) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse()
                .map_err(|e| anyhow::anyhow!("Invalid recipient address: {}", e))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;

        self.transport.send(&message)?;
        info!("Sent \"{}\" notification to {}", subject, to);
        Ok(())
    }

    /// Send a notification without waiting for delivery
    ///
    /// Failures are logged and swallowed — the state change this notifies
    /// about has already committed and must not be undone by mail trouble.
    pub fn send_async(&self, to: String, subject: String, body: String) {
        let mailer = self.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = mailer.send(&to, &subject, body) {
                warn!("Failed to send \"{}\" notification to {}: {}", subject, to, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_mailer_config_defaults() {
        unsafe {
            std::env::remove_var("SMTP_HOST");
            std::env::remove_var("SMTP_PORT");
            std::env::remove_var("SMTP_USER");
            std::env::remove_var("SMTP_PASS");
            std::env::remove_var("SMTP_FROM");
        }

        let config = MailerConfig::from_env();
        assert_eq!(config.smtp_host, "localhost");
        assert_eq!(config.smtp_port, 25);
        assert!(config.smtp_user.is_none());
        assert_eq!(config.from_address, "noreply@stratus.example");
    }

    #[test]
    #[serial]
    fn test_mailer_builds_without_credentials() {
        unsafe {
            std::env::remove_var("SMTP_USER");
            std::env::remove_var("SMTP_PASS");
        }

        let config = MailerConfig::from_env();
        assert!(Mailer::new(&config).is_ok());
    }
}
