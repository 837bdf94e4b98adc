//! Message entity and its server-side mutators

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};

use crate::codec::{encode_mailbox_name, quote_imap_string};
use crate::error::{GmailboxError, GmailboxResult};
use crate::mailbox::SpecialUse;
use crate::session::Session;

/// Per-message IMAP flags
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flag {
    /// Message is seen/read
    Seen,
    /// Message is answered
    Answered,
    /// Message is flagged (starred)
    Flagged,
    /// Message is deleted
    Deleted,
    /// Message is draft
    Draft,
    /// Message is recent
    Recent,
    /// Server or user defined keyword
    Keyword(String),
}

impl Flag {
    /// Interpret a flag token as sent by the server
    pub fn from_token(token: &str) -> Self {
        match token.to_ascii_lowercase().as_str() {
            "\\seen" => Flag::Seen,
            "\\answered" => Flag::Answered,
            "\\flagged" => Flag::Flagged,
            "\\deleted" => Flag::Deleted,
            "\\draft" => Flag::Draft,
            "\\recent" => Flag::Recent,
            _ => Flag::Keyword(token.to_string()),
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flag::Seen => write!(f, "\\Seen"),
            Flag::Answered => write!(f, "\\Answered"),
            Flag::Flagged => write!(f, "\\Flagged"),
            Flag::Deleted => write!(f, "\\Deleted"),
            Flag::Draft => write!(f, "\\Draft"),
            Flag::Recent => write!(f, "\\Recent"),
            Flag::Keyword(keyword) => write!(f, "{}", keyword),
        }
    }
}

/// Decoded message headers in the order they were received.
///
/// Keys keep their original case; lookups ignore it. Only the first
/// occurrence of a repeated header is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(IndexMap<String, String>);

impl Headers {
    /// Value of a header, matched case-insensitively
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Check whether a header is present
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Insert a header unless one with the same name already exists
    pub(crate) fn insert_first(&mut self, key: String, value: String) {
        if !self.contains(&key) {
            self.0.insert(key, value);
        }
    }

    /// Iterate over headers in received order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of distinct headers
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no headers
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One mail item as seen through a mailbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Mailbox-scoped identifier
    pub uid: u32,
    /// Display name of the owning mailbox
    pub mailbox: String,
    /// Provider-global message id (`X-GM-MSGID`)
    pub message_id: Option<u64>,
    /// Provider thread id (`X-GM-THRID`)
    pub thread_id: Option<u64>,
    /// Decoded subject
    pub subject: Option<String>,
    /// Plain text body
    pub body: Option<String>,
    /// HTML body
    pub html_body: Option<String>,
    /// Decoded headers
    pub headers: Headers,
    /// First sender address
    pub from: Option<String>,
    /// Primary recipients
    pub to: Vec<String>,
    /// Carbon copy recipients
    pub cc: Vec<String>,
    /// Delivered-To addresses
    pub delivered_to: Vec<String>,
    /// Time the message was sent
    pub sent_at: Option<DateTime<Utc>>,
    /// IMAP flags
    pub flags: HashSet<Flag>,
    /// Gmail labels
    pub labels: HashSet<String>,
}

impl Message {
    /// Create an unfetched message
    pub fn new(uid: u32, mailbox: impl Into<String>) -> Self {
        Self {
            uid,
            mailbox: mailbox.into(),
            message_id: None,
            thread_id: None,
            subject: None,
            body: None,
            html_body: None,
            headers: Headers::default(),
            from: None,
            to: Vec::new(),
            cc: Vec::new(),
            delivered_to: Vec::new(),
            sent_at: None,
            flags: HashSet::new(),
            labels: HashSet::new(),
        }
    }

    /// Check whether the message content has been parsed
    pub fn is_fetched(&self) -> bool {
        self.sent_at.is_some()
    }

    /// Check if message is read
    pub fn is_read(&self) -> bool {
        self.flags.contains(&Flag::Seen)
    }

    /// Check if message is starred
    pub fn is_starred(&self) -> bool {
        self.flags.contains(&Flag::Flagged)
    }

    /// Check if message is a draft
    pub fn is_draft(&self) -> bool {
        self.flags.contains(&Flag::Draft)
    }

    /// Check if message is deleted
    pub fn is_deleted(&self) -> bool {
        self.flags.contains(&Flag::Deleted)
    }

    /// Check if message carries a label
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// Mark as read
    pub async fn read(&mut self, session: &mut Session) -> GmailboxResult<()> {
        self.add_flag(session, Flag::Seen).await
    }

    /// Mark as unread
    pub async fn unread(&mut self, session: &mut Session) -> GmailboxResult<()> {
        self.remove_flag(session, Flag::Seen).await
    }

    /// Star the message
    pub async fn star(&mut self, session: &mut Session) -> GmailboxResult<()> {
        self.add_flag(session, Flag::Flagged).await
    }

    /// Remove the star
    pub async fn unstar(&mut self, session: &mut Session) -> GmailboxResult<()> {
        self.remove_flag(session, Flag::Flagged).await
    }

    /// Attach a Gmail label
    pub async fn add_label(&mut self, session: &mut Session, label: &str) -> GmailboxResult<()> {
        self.store(session, "+X-GM-LABELS", &label_token(label)).await?;
        self.labels.insert(label.to_string());
        session.update_cached(self);
        Ok(())
    }

    /// Detach a Gmail label
    pub async fn remove_label(&mut self, session: &mut Session, label: &str) -> GmailboxResult<()> {
        self.store(session, "-X-GM-LABELS", &label_token(label)).await?;
        self.labels.remove(label);
        session.update_cached(self);
        Ok(())
    }

    /// Flag as deleted and copy into the account's trash mailbox.
    ///
    /// Messages already in the trash are only flagged.
    pub async fn delete(&mut self, session: &mut Session) -> GmailboxResult<()> {
        let trash = if session.is_special(&self.mailbox, SpecialUse::Trash) {
            None
        } else {
            let name = session.special_name(SpecialUse::Trash).ok_or_else(|| {
                GmailboxError::precondition("account exposes no trash mailbox")
            })?;
            Some(name.to_string())
        };

        self.add_flag(session, Flag::Deleted).await?;

        if let Some(trash) = trash {
            session.copy(self.uid, &trash, Some(&self.mailbox)).await?;
            info!("Moved message {} from {} to {}", self.uid, self.mailbox, trash);
        }
        Ok(())
    }

    /// Copy into `target` and flag the original as deleted.
    ///
    /// Moving into the trash leaves the original unflagged.
    pub async fn move_to(&mut self, session: &mut Session, target: &str) -> GmailboxResult<()> {
        if target == self.mailbox {
            debug!("Message {} already in {}", self.uid, target);
            return Ok(());
        }

        session.copy(self.uid, target, Some(&self.mailbox)).await?;
        if !session.is_special(target, SpecialUse::Trash) {
            self.add_flag(session, Flag::Deleted).await?;
        }

        info!("Moved message {} from {} to {}", self.uid, self.mailbox, target);
        Ok(())
    }

    /// Move into the all-mail mailbox
    pub async fn archive(&mut self, session: &mut Session) -> GmailboxResult<()> {
        let all_mail = session
            .special_name(SpecialUse::AllMail)
            .ok_or_else(|| GmailboxError::precondition("account exposes no all-mail mailbox"))?
            .to_string();
        self.move_to(session, &all_mail).await
    }

    /// Fetch and parse the message unless that already happened
    pub async fn fetch(&mut self, session: &mut Session) -> GmailboxResult<()> {
        if self.is_fetched() {
            return Ok(());
        }
        self.refresh(session).await
    }

    /// Fetch and parse the message again
    pub async fn refresh(&mut self, session: &mut Session) -> GmailboxResult<()> {
        let fetched = session.fetch_raw(&self.mailbox, &[self.uid]).await?;
        let raw = fetched
            .iter()
            .find(|raw| raw.uid() == Some(self.uid))
            .ok_or_else(|| {
                GmailboxError::not_found(format!("message {} in {}", self.uid, self.mailbox))
            })?;

        self.parse(raw)?;
        session.update_cached(self);
        Ok(())
    }

    async fn add_flag(&mut self, session: &mut Session, flag: Flag) -> GmailboxResult<()> {
        self.store(session, "+FLAGS", &flag.to_string()).await?;
        self.flags.insert(flag);
        session.update_cached(self);
        Ok(())
    }

    async fn remove_flag(&mut self, session: &mut Session, flag: Flag) -> GmailboxResult<()> {
        self.store(session, "-FLAGS", &flag.to_string()).await?;
        self.flags.remove(&flag);
        session.update_cached(self);
        Ok(())
    }

    async fn store(&self, session: &mut Session, operation: &str, items: &str) -> GmailboxResult<()> {
        session.use_mailbox(&self.mailbox).await?;
        debug!("UID STORE {} {} ({}) in {}", self.uid, operation, items, self.mailbox);
        session
            .imap_mut()
            .uid_store(&self.uid.to_string(), &format!("{} ({})", operation, items))
            .await
    }
}

/// System labels such as `\Important` go out as atoms
fn label_token(label: &str) -> String {
    if label.starts_with('\\') {
        label.to_string()
    } else {
        quote_imap_string(&encode_mailbox_name(label))
    }
}
