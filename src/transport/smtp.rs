//! SMTP mail sender built on lettre.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use lettre::{
    address::Envelope as SmtpEnvelope,
    message::{header::ContentType, Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::{SmtpConfig, SmtpTls};
use crate::notification::{Attachment, Envelope, Mail};

use super::sender::MailSender;
use super::types::{SendError, SendReceipt};

const DEFAULT_ATTACHMENT_TYPE: &str = "application/octet-stream";

pub struct SmtpMailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailSender {
    pub fn new(config: &SmtpConfig) -> Result<Self, SendError> {
        let builder = match config.tls {
            SmtpTls::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
            SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(smtp_error)?,
            SmtpTls::Wrapper => {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host).map_err(smtp_error)?
            }
        }
        .port(config.port);

        let builder = match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };

        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl MailSender for SmtpMailSender {
    async fn send_mail(&self, mail: &Mail) -> Result<SendReceipt, SendError> {
        let message = build_message(mail)?;
        let message_id = message
            .headers()
            .get_raw("Message-ID")
            .map(str::to_string);

        let response = self.transport.send(message).await.map_err(smtp_error)?;

        Ok(SendReceipt {
            message_id,
            response: Some(format!(
                "{} {}",
                response.code(),
                response.message().collect::<Vec<_>>().join(" ")
            )),
        })
    }
}

fn smtp_error(error: lettre::transport::smtp::Error) -> SendError {
    let code = error
        .status()
        .and_then(|code| code.to_string().parse::<u16>().ok());
    SendError {
        code,
        message: error.to_string(),
    }
}

fn parse_mailbox(field: &str, value: &str) -> Result<Mailbox, SendError> {
    value
        .parse::<Mailbox>()
        .map_err(|e| SendError::new(format!("invalid {} address '{}': {}", field, value, e)))
}

fn parse_address(field: &str, value: &str) -> Result<Address, SendError> {
    value
        .parse::<Address>()
        .map_err(|e| SendError::new(format!("invalid {} address '{}': {}", field, value, e)))
}

/// Build the MIME message; attachment content is expected base64 encoded.
pub(crate) fn build_message(mail: &Mail) -> Result<Message, SendError> {
    let from = parse_mailbox("from", &mail.from)?;
    let to = parse_mailbox("to", &mail.to)?;

    let mut builder = Message::builder()
        .from(from.clone())
        .to(to.clone())
        .subject(mail.subject.clone());

    if let Some(envelope) = &mail.envelope {
        builder = builder.envelope(smtp_envelope(envelope, &from, &to)?);
    }

    let body = match (&mail.text, &mail.html) {
        (Some(text), Some(html)) => MultiPart::alternative_plain_html(text.clone(), html.clone()),
        (None, Some(html)) => MultiPart::mixed().singlepart(SinglePart::html(html.clone())),
        (Some(text), None) => MultiPart::mixed().singlepart(SinglePart::plain(text.clone())),
        (None, None) => MultiPart::mixed().singlepart(SinglePart::plain(String::new())),
    };

    let mut root = MultiPart::mixed().multipart(body);
    for attachment in &mail.attachments {
        root = root.singlepart(mime_attachment(attachment)?);
    }

    builder
        .multipart(root)
        .map_err(|e| SendError::new(format!("failed to build message: {}", e)))
}

fn smtp_envelope(envelope: &Envelope, from: &Mailbox, to: &Mailbox) -> Result<SmtpEnvelope, SendError> {
    let sender = match &envelope.from {
        Some(value) => parse_address("envelope from", value)?,
        None => from.email.clone(),
    };
    let recipient = match &envelope.to {
        Some(value) => parse_address("envelope to", value)?,
        None => to.email.clone(),
    };

    SmtpEnvelope::new(Some(sender), vec![recipient])
        .map_err(|e| SendError::new(format!("invalid envelope: {}", e)))
}

fn mime_attachment(attachment: &Attachment) -> Result<SinglePart, SendError> {
    let content = BASE64.decode(attachment.content.as_bytes()).map_err(|e| {
        SendError::new(format!(
            "attachment '{}' is not valid base64: {}",
            attachment.filename, e
        ))
    })?;

    let content_type = attachment
        .content_type
        .as_deref()
        .unwrap_or(DEFAULT_ATTACHMENT_TYPE);
    let content_type = ContentType::parse(content_type)
        .map_err(|e| SendError::new(format!("invalid content type '{}': {}", content_type, e)))?;

    Ok(MimeAttachment::new(attachment.filename.clone()).body(content, content_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail() -> Mail {
        Mail {
            from: "Herald <noreply@example.com>".to_string(),
            to: "ann@example.com".to_string(),
            subject: "Hello".to_string(),
            text: Some("Hi Ann".to_string()),
            html: Some("<p>Hi Ann</p>".to_string()),
            attachments: vec![Attachment {
                filename: "note.txt".to_string(),
                content: BASE64.encode("hello"),
                encoding: Some("base64".to_string()),
                content_type: Some("text/plain".to_string()),
            }],
            envelope: None,
        }
    }

    #[test]
    fn test_build_message_with_attachment() {
        let message = build_message(&mail()).unwrap();
        let formatted = String::from_utf8(message.formatted()).unwrap();

        assert!(formatted.contains("Subject: Hello"));
        assert!(formatted.contains("note.txt"));
        assert_eq!(message.envelope().to()[0].to_string(), "ann@example.com");
    }

    #[test]
    fn test_envelope_override() {
        let mut mail = mail();
        mail.envelope = Some(Envelope {
            from: Some("bounce@example.com".to_string()),
            to: None,
        });

        let message = build_message(&mail).unwrap();
        let envelope = message.envelope();
        assert_eq!(
            envelope.from().map(|a| a.to_string()).as_deref(),
            Some("bounce@example.com")
        );
        assert_eq!(envelope.to()[0].to_string(), "ann@example.com");
    }

    #[test]
    fn test_invalid_addresses_are_send_errors() {
        let mut mail = mail();
        mail.to = "not an address".to_string();
        let err = build_message(&mail).unwrap_err();
        assert_eq!(err.code, None);
        assert!(err.message.contains("to address"));
    }

    #[tokio::test]
    async fn test_sender_builds_for_each_tls_mode() {
        for tls in [SmtpTls::None, SmtpTls::StartTls, SmtpTls::Wrapper] {
            let config = SmtpConfig {
                host: "smtp.example.com".to_string(),
                port: 2525,
                username: Some("user".to_string()),
                password: Some("secret".to_string()),
                tls,
            };
            assert!(SmtpMailSender::new(&config).is_ok());
        }
    }
}
