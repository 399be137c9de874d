/// Email Parser
///
/// Turns raw RFC 5322 bytes into the metadata stored alongside an archived
/// message. Structural parsing is delegated to the mail-parser crate.
use crate::domain::entities::{ArchiveSource, ArchivedEmail, AttachmentRef};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::services::fingerprint;
use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MimeHeaders};

/// Parsed email data structure
#[derive(Debug, Clone)]
pub struct ParsedEmail {
    /// RFC 5322 Message-ID header, normalised
    pub message_id: Option<String>,

    /// Email sender address
    pub from_address: String,

    /// Email sender display name
    pub from_name: Option<String>,

    /// To and Cc addresses
    pub recipients: Vec<String>,

    pub subject: Option<String>,

    pub date: Option<DateTime<Utc>>,

    pub text_body: Option<String>,

    pub html_body: Option<String>,

    pub attachments: Vec<AttachmentRef>,
}

impl ParsedEmail {
    /// Build the archive record for this message.
    pub fn into_archived(
        self,
        account_id: &str,
        folder: &str,
        fingerprint: String,
        source: ArchiveSource,
        raw: Vec<u8>,
    ) -> ArchivedEmail {
        let mut email = ArchivedEmail::new(
            account_id.to_string(),
            folder.to_string(),
            fingerprint,
            source,
            raw,
        );
        email.message_id = self.message_id;
        email.subject = self.subject;
        email.sender = match self.from_name {
            Some(name) if !name.is_empty() => format!("{} <{}>", name, self.from_address),
            _ => self.from_address,
        };
        email.recipients = self.recipients;
        email.sent_at = self.date;
        email.text_body = self.text_body;
        email.html_body = self.html_body;
        email.attachments = self.attachments;
        email
    }
}

/// Email parser service
#[derive(Debug, Clone, Copy, Default)]
pub struct EmailParser;

impl EmailParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse raw email bytes into structured data.
    ///
    /// Input without a single recognisable header is a corrupt record.
    pub fn parse_email(&self, raw_email: &[u8]) -> DomainResult<ParsedEmail> {
        let message = MessageParser::default()
            .parse(raw_email)
            .ok_or_else(|| DomainError::CorruptRecord("Failed to parse email".to_string()))?;

        if message.headers().is_empty() {
            return Err(DomainError::CorruptRecord(
                "Email has no headers".to_string(),
            ));
        }

        let message_id = message
            .message_id()
            .and_then(fingerprint::normalize_message_id);

        let (from_address, from_name) = message
            .from()
            .and_then(|addrs| addrs.first())
            .map(|from| {
                (
                    from.address().unwrap_or_default().to_string(),
                    from.name().map(|s| s.to_string()),
                )
            })
            .unwrap_or_default();

        let mut recipients = Vec::new();
        for list in [message.to(), message.cc()].into_iter().flatten() {
            for addr in list.iter() {
                if let Some(address) = addr.address() {
                    recipients.push(address.to_string());
                }
            }
        }

        let subject = message.subject().map(|s| s.to_string());

        let date = message
            .date()
            .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0));

        let text_body = message.body_text(0).map(|s| s.to_string());
        let html_body = message.body_html(0).map(|s| s.to_string());

        let attachments = message
            .attachments()
            .map(|attachment| AttachmentRef {
                filename: attachment
                    .attachment_name()
                    .unwrap_or("unnamed_attachment")
                    .to_string(),
                content_type: attachment
                    .content_type()
                    .map(|ct| match ct.subtype() {
                        Some(sub) => format!("{}/{}", ct.ctype(), sub),
                        None => ct.ctype().to_string(),
                    })
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                size: attachment.contents().len() as u64,
            })
            .collect();

        Ok(ParsedEmail {
            message_id,
            from_address,
            from_name,
            recipients,
            subject,
            date,
            text_body,
            html_body,
            attachments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &[u8] = b"From: Alice <alice@example.com>\r\n\
To: bob@example.com\r\n\
Cc: carol@example.com\r\n\
Subject: Quarterly numbers\r\n\
Message-ID: <q3@example.com>\r\n\
Date: Tue, 1 Oct 2024 10:00:00 +0000\r\n\
\r\n\
See attached.\r\n";

    #[test]
    fn test_parse_headers_and_body() {
        let parsed = EmailParser::new().parse_email(SIMPLE).unwrap();
        assert_eq!(parsed.message_id.as_deref(), Some("q3@example.com"));
        assert_eq!(parsed.from_address, "alice@example.com");
        assert_eq!(parsed.from_name.as_deref(), Some("Alice"));
        assert_eq!(
            parsed.recipients,
            vec!["bob@example.com".to_string(), "carol@example.com".to_string()]
        );
        assert_eq!(parsed.subject.as_deref(), Some("Quarterly numbers"));
        assert_eq!(parsed.date.map(|d| d.timestamp()), Some(1727776800));
        assert!(parsed.text_body.unwrap().contains("See attached."));
    }

    #[test]
    fn test_missing_message_id_is_allowed() {
        let raw = b"From: alice@example.com\r\nSubject: no id\r\n\r\nhello\r\n";
        let parsed = EmailParser::new().parse_email(raw).unwrap();
        assert!(parsed.message_id.is_none());
    }

    #[test]
    fn test_into_archived_formats_sender() {
        let parsed = EmailParser::new().parse_email(SIMPLE).unwrap();
        let email = parsed.into_archived(
            "acc",
            "INBOX",
            "fp".to_string(),
            ArchiveSource::Imap,
            SIMPLE.to_vec(),
        );
        assert_eq!(email.sender, "Alice <alice@example.com>");
        assert_eq!(email.folder, "INBOX");
        assert_eq!(email.raw, SIMPLE.to_vec());
    }

    #[test]
    fn test_empty_input_is_corrupt() {
        assert!(matches!(
            EmailParser::new().parse_email(b""),
            Err(DomainError::CorruptRecord(_))
        ));
    }
}
