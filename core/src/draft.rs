//! Outgoing message composition

use lettre::address::{Address, Envelope};
use lettre::message::header::{ContentType, HeaderName, HeaderValue};
use lettre::message::{
    Attachment as LettreAttachment, Mailbox as LettreMailbox, Message as LettreMessage, MultiPart,
    SinglePart,
};
use std::path::Path;
use uuid::Uuid;

use crate::codec::{guess_charset, split_top_level};
use crate::error::{GmailboxError, GmailboxResult};

/// A file attached to an outgoing message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Name offered to the recipient
    pub filename: String,
    /// MIME type such as `application/pdf`
    pub content_type: String,
    /// Raw file bytes
    pub content: Vec<u8>,
}

impl Attachment {
    /// Attachment from bytes already in memory
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            content: content.into(),
        }
    }

    /// Read a file, guessing its type from the extension
    pub fn from_path(path: impl AsRef<Path>) -> GmailboxResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| GmailboxError::precondition(format!("{} is not a file", path.display())))?;
        let content_type = mime_guess::from_path(path).first_or_octet_stream();

        Ok(Self::new(filename, content_type.essence_str(), content))
    }

    fn to_part(&self) -> GmailboxResult<SinglePart> {
        let content_type = parse_content_type(&self.content_type)?;
        Ok(LettreAttachment::new(self.filename.clone()).body(self.content.clone(), content_type))
    }
}

/// An encoded message ready for submission
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    /// RFC 5322 bytes
    pub raw: Vec<u8>,
    /// Envelope sender address
    pub from: String,
    /// Envelope recipients, Bcc included
    pub recipients: Vec<String>,
    /// Generated `Message-ID`, angle brackets included
    pub message_id: String,
}

/// A message being composed.
///
/// Recipient entries may hold a single address or a comma separated list.
#[derive(Debug, Clone, Default)]
pub struct Draft {
    /// `From` override, else the session user
    pub sender: Option<String>,
    /// `To` recipients
    pub to: Vec<String>,
    /// `Cc` recipients
    pub cc: Vec<String>,
    /// Envelope-only recipients
    pub bcc: Vec<String>,
    pub subject: String,
    /// `text/plain` body
    pub plain: Option<String>,
    /// `text/html` body
    pub html: Option<String>,
    pub attachments: Vec<Attachment>,
    /// Extra headers, added verbatim
    pub headers: Vec<(String, String)>,
    /// `Message-ID` of the message being answered
    pub in_reply_to: Option<String>,
    /// Space separated `References` chain
    pub references: Option<String>,
}

impl Draft {
    /// Empty draft with a subject
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Default::default()
        }
    }

    /// Send as someone other than the session user
    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Add a `To` entry
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.to.push(recipient.into());
        self
    }

    /// Add a `Cc` entry
    pub fn cc(mut self, recipient: impl Into<String>) -> Self {
        self.cc.push(recipient.into());
        self
    }

    /// Add a blind copy recipient
    pub fn bcc(mut self, recipient: impl Into<String>) -> Self {
        self.bcc.push(recipient.into());
        self
    }

    /// Replace the subject
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Set the plain text body
    pub fn plain(mut self, text: impl Into<String>) -> Self {
        self.plain = Some(text.into());
        self
    }

    /// Set the HTML body
    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Attach a file
    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Extra header added verbatim
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set `In-Reply-To`
    pub fn in_reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.in_reply_to = Some(message_id.into());
        self
    }

    /// Set `References`
    pub fn references(mut self, references: impl Into<String>) -> Self {
        self.references = Some(references.into());
        self
    }

    /// Encode the draft as a `multipart/mixed` message sent by `sender`.
    ///
    /// The generated `Message-ID` uses `domain`. Bcc recipients only appear
    /// in the envelope.
    pub fn build(&self, sender: &str, domain: &str) -> GmailboxResult<OutgoingMessage> {
        let mut mixed = match (&self.plain, &self.html) {
            (Some(plain), Some(html)) => MultiPart::mixed().multipart(
                MultiPart::alternative()
                    .singlepart(text_part("plain", plain)?)
                    .singlepart(text_part("html", html)?),
            ),
            (Some(plain), None) => MultiPart::mixed().singlepart(text_part("plain", plain)?),
            (None, Some(html)) => MultiPart::mixed().singlepart(text_part("html", html)?),
            (None, None) => return Err(GmailboxError::precondition("draft has neither plain nor html text")),
        };
        for attachment in &self.attachments {
            mixed = mixed.singlepart(attachment.to_part()?);
        }

        let from: LettreMailbox = sender.trim().parse()?;
        let to = mailboxes(&self.to)?;
        let cc = mailboxes(&self.cc)?;
        let bcc = mailboxes(&self.bcc)?;

        let mut recipients: Vec<Address> = Vec::new();
        for mailbox in to.iter().chain(&cc).chain(&bcc) {
            if !recipients.contains(&mailbox.email) {
                recipients.push(mailbox.email.clone());
            }
        }
        if recipients.is_empty() {
            return Err(GmailboxError::precondition("draft has no recipients"));
        }

        let message_id = format!("<{}@{}>", Uuid::new_v4(), domain);
        let envelope = Envelope::new(Some(from.email.clone()), recipients.clone())?;

        let mut builder = LettreMessage::builder()
            .from(from.clone())
            .subject(self.subject.clone())
            .message_id(Some(message_id.clone()))
            .date_now()
            .envelope(envelope);
        for mailbox in to {
            builder = builder.to(mailbox);
        }
        for mailbox in cc {
            builder = builder.cc(mailbox);
        }
        if let Some(in_reply_to) = &self.in_reply_to {
            builder = builder.in_reply_to(in_reply_to.clone());
        }
        if let Some(references) = &self.references {
            builder = builder.references(references.clone());
        }
        for (name, value) in &self.headers {
            let header_name = HeaderName::new_from_ascii(name.clone())
                .map_err(|_| GmailboxError::precondition(format!("invalid header name '{}'", name)))?;
            builder = builder.raw_header(HeaderValue::new(header_name, value.clone()));
        }

        let email = builder.multipart(mixed)?;
        Ok(OutgoingMessage {
            raw: email.formatted(),
            from: from.email.to_string(),
            recipients: recipients.iter().map(ToString::to_string).collect(),
            message_id,
        })
    }
}

fn text_part(subtype: &str, text: &str) -> GmailboxResult<SinglePart> {
    let content_type = parse_content_type(&format!("text/{}; charset={}", subtype, guess_charset(text)))?;
    Ok(SinglePart::builder()
        .header(content_type)
        .body(text.to_string()))
}

fn parse_content_type(value: &str) -> GmailboxResult<ContentType> {
    ContentType::parse(value).map_err(|e| GmailboxError::ContentType(format!("{}: {}", value, e)))
}

fn mailboxes(entries: &[String]) -> GmailboxResult<Vec<LettreMailbox>> {
    let mut parsed = Vec::new();
    for entry in entries {
        for part in split_top_level(entry, ',') {
            let part = part.trim();
            if !part.is_empty() {
                parsed.push(part.parse()?);
            }
        }
    }
    Ok(parsed)
}
