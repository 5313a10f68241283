use std::fs;
use std::path::{Path, PathBuf};

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, Message, MultiPart, SinglePart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};
use tracing::info;

use super::StatusSummary;
use crate::config::settings::EmailSettings;
use crate::error::DeliveryError;

pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

fn mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address.parse().map_err(|e: lettre::address::AddressError| DeliveryError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

impl EmailSender {
    /// Build a sender; fails without touching the network when settings are incomplete.
    pub fn new(cfg: &EmailSettings) -> Result<Self, DeliveryError> {
        let missing = cfg.missing();
        if !missing.is_empty() {
            return Err(DeliveryError::NotConfigured(missing.join(", ")));
        }
        let (Some(user), Some(pass), Some(sender)) =
            (cfg.username.clone(), cfg.password.clone(), cfg.sender())
        else {
            return Err(DeliveryError::NotConfigured("SMTP credentials".into()));
        };

        let from = mailbox(sender)?;
        let to = cfg
            .recipients
            .iter()
            .map(|r| mailbox(r))
            .collect::<Result<Vec<_>, _>>()?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_host)
            .map_err(|e| DeliveryError::Smtp(format!("invalid SMTP_HOST: {e}")))?
            .port(cfg.smtp_port)
            .credentials(Credentials::new(user, pass))
            .build();

        Ok(Self { mailer, from, to })
    }

    pub fn recipients(&self) -> usize {
        self.to.len()
    }

    /// The weekly report with its attachments.
    pub async fn send_report(
        &self,
        status: &StatusSummary,
        executive_summary: &str,
        attachments: &[PathBuf],
    ) -> Result<(), DeliveryError> {
        let subject = format!("Global Pulse Weekly Report - {}", status.window_label);
        let body = format!(
            "Weekly economic intelligence for {}.\n\n{}\n\nExecutive summary:\n{}\n\n\
             The full report, the master index and the statistics sheet are attached.\n",
            status.window_label,
            status,
            executive_summary.trim()
        );
        let msg = self.message(&subject, body, attachments)?;
        self.send(msg, &subject).await
    }

    /// Sent instead of the report when no source produced anything.
    pub async fn send_failure_notice(
        &self,
        status: &StatusSummary,
        failures: &[(String, String)],
    ) -> Result<(), DeliveryError> {
        let subject = format!("Global Pulse collection failed - {}", status.window_label);
        let mut body = format!("{status}\n\nNo report was produced this week.\n\n");
        for (source, error) in failures {
            body.push_str(&format!("- {source}: {error}\n"));
        }
        let msg = self.message(&subject, body, &[])?;
        self.send(msg, &subject).await
    }

    /// Delivery check with no report content.
    pub async fn send_test(&self) -> Result<(), DeliveryError> {
        let subject = "Global Pulse test message".to_string();
        let body = format!(
            "This is a test message from econ-intel-agent {}.\nEmail delivery is configured correctly.\n",
            env!("CARGO_PKG_VERSION")
        );
        let msg = self.message(&subject, body, &[])?;
        self.send(msg, &subject).await
    }

    fn message(
        &self,
        subject: &str,
        body: String,
        attachments: &[PathBuf],
    ) -> Result<Message, DeliveryError> {
        let mut builder = Message::builder().from(self.from.clone()).subject(subject);
        for to in &self.to {
            builder = builder.to(to.clone());
        }

        let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(body));
        for path in attachments {
            parts = parts.singlepart(attachment(path)?);
        }
        builder
            .multipart(parts)
            .map_err(|e| DeliveryError::Build(e.to_string()))
    }

    async fn send(&self, msg: Message, subject: &str) -> Result<(), DeliveryError> {
        self.mailer
            .send(msg)
            .await
            .map_err(|e| DeliveryError::Smtp(e.to_string()))?;
        info!(%subject, recipients = self.to.len(), "email sent");
        Ok(())
    }
}

fn content_type_for(path: &Path) -> ContentType {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let mime = match ext.as_str() {
        "md" => "text/markdown; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    };
    ContentType::parse(mime).unwrap_or(ContentType::TEXT_PLAIN)
}

fn attachment(path: &Path) -> Result<SinglePart, DeliveryError> {
    let bytes = fs::read(path).map_err(|source| DeliveryError::Attachment {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("attachment")
        .to_string();
    Ok(Attachment::new(name).body(bytes, content_type_for(path)))
}
