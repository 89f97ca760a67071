//! Email delivery of admin verification codes

use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};

use crate::{
    config::EmailConfig,
    error::{AppError, AppResult},
};

/// Outbound channel for verification codes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_admin_code(&self, to: &str, code: &str, valid_minutes: i64) -> AppResult<()>;
}

/// SMTP delivery through lettre
#[derive(Clone)]
pub struct EmailService {
    config: EmailConfig,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, to: &str, code: &str, valid_minutes: i64) -> AppResult<Message> {
        let from_name = self
            .config
            .smtp_from_name
            .as_deref()
            .unwrap_or("Library System");
        let from_mailbox = Mailbox::from_str(&format!("{} <{}>", from_name, self.config.smtp_from))
            .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?;

        let to_mailbox = Mailbox::from_str(to)
            .map_err(|e| AppError::Validation(format!("Invalid recipient address: {}", e)))?;

        let text = format!(
            r#"
Library Admin Registration

Your verification code is: {code}

This code will expire in {valid_minutes} minutes.

If you didn't request this code, please ignore this email.
"#
        );
        let html = format!(
            r#"<html><body style="font-family: Arial, sans-serif;">
<h2>Library Admin Registration</h2>
<p>Your verification code is:</p>
<p style="font-size: 24px; letter-spacing: 2px;"><strong>{code}</strong></p>
<p>This code will expire in {valid_minutes} minutes.</p>
<p style="color: #7f8c8d;">If you didn't request this code, please ignore this email.</p>
</body></html>"#
        );

        Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject("Your Admin Verification Code")
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html),
                    ),
            )
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))
    }

    fn transport(&self) -> AppResult<SmtpTransport> {
        let timeout = Duration::from_secs(self.config.timeout_seconds);

        let builder = if self.config.smtp_use_tls {
            // Use STARTTLS for secure connection
            SmtpTransport::starttls_relay(&self.config.smtp_host).map_err(|e| {
                AppError::DeliveryFailed(format!("Failed to create SMTP transport: {}", e))
            })?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
        }
        .port(self.config.smtp_port)
        .timeout(Some(timeout));

        let builder = match (&self.config.smtp_username, &self.config.smtp_password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };

        Ok(builder.build())
    }
}

#[async_trait]
impl Mailer for EmailService {
    async fn send_admin_code(&self, to: &str, code: &str, valid_minutes: i64) -> AppResult<()> {
        let email = self.build_message(to, code, valid_minutes)?;
        let mailer = self.transport()?;
        // Whole exchange, on top of the per-command SMTP timeout
        let deadline = Duration::from_secs(self.config.timeout_seconds.saturating_mul(2));

        let send = tokio::task::spawn_blocking(move || mailer.send(&email));
        match tokio::time::timeout(deadline, send).await {
            Ok(Ok(Ok(_))) => Ok(()),
            Ok(Ok(Err(e))) => Err(AppError::DeliveryFailed(e.to_string())),
            Ok(Err(e)) => Err(AppError::Internal(format!("Mail task failed: {}", e))),
            Err(_) => Err(AppError::DeliveryFailed(format!(
                "SMTP exchange exceeded {}s",
                deadline.as_secs()
            ))),
        }
    }
}

/// Development mailer: writes the code to the log instead of sending it
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_admin_code(&self, to: &str, code: &str, valid_minutes: i64) -> AppResult<()> {
        tracing::warn!(
            to,
            code,
            valid_minutes,
            "email delivery disabled, admin verification code logged instead"
        );
        Ok(())
    }
}
