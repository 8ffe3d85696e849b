use crate::config::SmtpConfig;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

use crate::notifications::SinkError;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("could not build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("message has no recipients")]
    NoRecipients,
}

impl From<EmailError> for SinkError {
    fn from(err: EmailError) -> Self {
        match &err {
            EmailError::Smtp(e) if e.is_transient() || e.is_timeout() => {
                SinkError::Transient(err.to_string())
            }
            _ => SinkError::Rejected(err.to_string()),
        }
    }
}

/// Rendered message ready for SMTP delivery
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

#[derive(Debug, Clone)]
pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

impl EmailService {
    pub fn new(smtp_config: &SmtpConfig) -> Result<Self, EmailError> {
        let creds = Credentials::new(
            smtp_config.username.clone(),
            smtp_config.password.clone(),
        );

        let builder = if smtp_config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp_config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp_config.host)
        };

        let transport = builder
            .port(smtp_config.port)
            .credentials(creds)
            .pool_config(PoolConfig::new().max_size(10))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        Ok(EmailService {
            transport,
            from_email: smtp_config.from_email.clone(),
            from_name: smtp_config.from_name.clone(),
        })
    }

    /// Build the MIME message; split out so it can be checked without a relay
    pub fn build_message(&self, email: &OutgoingEmail) -> Result<Message, EmailError> {
        if email.to.is_empty() && email.cc.is_empty() {
            return Err(EmailError::NoRecipients);
        }

        let from = format!("{} <{}>", self.from_name, self.from_email).parse::<Mailbox>()?;
        let mut builder = Message::builder().from(from).subject(email.subject.as_str());

        for address in &email.to {
            builder = builder.to(address.parse::<Mailbox>()?);
        }
        for address in &email.cc {
            builder = builder.cc(address.parse::<Mailbox>()?);
        }

        let message = builder.multipart(MultiPart::alternative_plain_html(
            email.text_body.clone(),
            email.html_body.clone(),
        ))?;

        Ok(message)
    }

    pub async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        let message = self.build_message(email)?;

        match self.transport.send(message).await {
            Ok(_) => {
                info!(
                    "Email '{}' sent to {} recipient(s), {} cc",
                    email.subject,
                    email.to.len(),
                    email.cc.len()
                );
                Ok(())
            }
            Err(e) => {
                error!("Failed to send email '{}': {}", email.subject, e);
                Err(EmailError::Smtp(e))
            }
        }
    }
}
