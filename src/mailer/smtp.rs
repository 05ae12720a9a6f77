use std::path::Path;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::Mailer;
use crate::config::SmtpConfig;
use crate::error::{ConsoleError, SendError};
use crate::request::GrantRequest;

/// Mailer that sends the report as a PDF attachment over SMTP.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Build the transport. No connection is made until the first send.
    pub fn new(config: &SmtpConfig, from: &str) -> crate::error::Result<Self> {
        let from: Mailbox = from
            .parse()
            .map_err(|e| ConsoleError::Config(format!("Invalid MAIL_FROM '{from}': {e}")))?;

        let mut builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| ConsoleError::Config(format!("Invalid SMTP_HOST: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        builder = builder.port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn message(
        &self,
        recipient: &str,
        request: &GrantRequest,
        file_name: String,
        pdf: Vec<u8>,
    ) -> Result<Message, SendError> {
        let to: Mailbox = recipient
            .parse()
            .map_err(|e| SendError::new(format!("Invalid recipient '{recipient}': {e}")))?;
        let pdf_type = ContentType::parse("application/pdf")
            .map_err(|e| SendError::new(format!("Invalid attachment type: {e}")))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(format!("Grant request: {}", request.title()))
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(format!(
                        "Please find attached the generated report for \"{}\".\n",
                        request.title()
                    )))
                    .singlepart(Attachment::new(file_name).body(pdf, pdf_type)),
            )
            .map_err(|e| SendError::new(format!("Failed to build message: {e}")))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    #[tracing::instrument(skip(self, request), fields(request_id = %request.id))]
    async fn send(
        &self,
        file_path: &Path,
        recipient: &str,
        request: &GrantRequest,
    ) -> Result<(), SendError> {
        let pdf = tokio::fs::read(file_path).await.map_err(|e| {
            SendError::new(format!("Failed to read {}: {e}", file_path.display()))
        })?;
        let size = pdf.len();
        let file_name = format!("grant-{}.pdf", request.id.0);
        let message = self.message(recipient, request, file_name, pdf)?;

        self.transport.send(message).await.map_err(|e| {
            tracing::error!(error = %e, "SMTP send failed");
            SendError::new(format!("SMTP send failed: {e}"))
        })?;

        tracing::info!(size, "Report emailed");
        Ok(())
    }
}
