//! Authenticated session and mailbox directory

use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::codec::{address_of, decode_mailbox_name, encode_mailbox_name};
use crate::config::{Config, SessionConfig};
use crate::draft::Draft;
use crate::error::{GmailboxError, GmailboxResult};
use crate::mailbox::{Mailbox, SpecialUse};
use crate::message::Message;
use crate::parser::RawFetch;
use crate::search::SearchQuery;
use crate::transport::{AsyncImapTransport, ImapTransport, LettreSmtpTransport, SmtpTransport};

/// An IMAP and SMTP session for one account
pub struct Session {
    imap: Box<dyn ImapTransport>,
    smtp: Box<dyn SmtpTransport>,
    username: Option<String>,
    default_domain: String,
    prefetch: bool,
    mailboxes: IndexMap<String, Mailbox>,
    aliases: HashMap<SpecialUse, String>,
    current: Option<String>,
}

impl Session {
    /// Create a session over already connected transports
    pub fn new(imap: Box<dyn ImapTransport>, smtp: Box<dyn SmtpTransport>) -> Self {
        Self::with_config(imap, smtp, &SessionConfig::default())
    }

    /// Create a session with explicit behaviour settings
    pub fn with_config(
        imap: Box<dyn ImapTransport>,
        smtp: Box<dyn SmtpTransport>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            imap,
            smtp,
            username: None,
            default_domain: config.default_domain.clone(),
            prefetch: config.prefetch,
            mailboxes: IndexMap::new(),
            aliases: HashMap::new(),
            current: None,
        }
    }

    /// Connect both legs to the configured servers
    pub async fn connect(config: &Config) -> GmailboxResult<Self> {
        config.validate()?;
        let imap = AsyncImapTransport::connect(&config.imap).await?;
        let smtp = LettreSmtpTransport::new(&config.smtp);
        Ok(Self::with_config(Box::new(imap), Box::new(smtp), &config.session))
    }

    /// Account address, once logged in
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Check whether both legs are authenticated
    pub fn is_logged_in(&self) -> bool {
        self.username.is_some()
    }

    /// Currently selected mailbox
    pub fn current_mailbox(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Domain used for generated Message-IDs
    pub fn mail_domain(&self) -> &str {
        self.username
            .as_deref()
            .and_then(|user| user.rsplit_once('@'))
            .map(|(_, domain)| domain)
            .unwrap_or(self.default_domain.as_str())
    }

    fn full_username(&self, username: &str) -> String {
        if username.contains('@') {
            username.to_string()
        } else {
            format!("{}@{}", username, self.default_domain)
        }
    }

    /// Log in both legs with a password.
    ///
    /// A rejection by either server is reported as
    /// [`GmailboxError::AuthenticationFailed`].
    pub async fn login(&mut self, username: &str, password: &str) -> GmailboxResult<()> {
        let username = self.full_username(username);
        self.imap.login(&username, password).await?;
        self.fetch_mailboxes().await?;
        self.smtp.login(&username, password).await?;

        info!("Logged in as {}", username);
        self.username = Some(username);
        Ok(())
    }

    /// Log in both legs with an OAuth2 access token
    pub async fn authenticate(&mut self, username: &str, access_token: &str) -> GmailboxResult<()> {
        let username = self.full_username(username);
        self.imap.authenticate_xoauth2(&username, access_token).await?;
        self.fetch_mailboxes().await?;
        self.smtp.authenticate_xoauth2(&username, access_token).await?;

        info!("Authenticated as {} with XOAUTH2", username);
        self.username = Some(username);
        Ok(())
    }

    /// Close both legs
    pub async fn logout(&mut self) -> GmailboxResult<()> {
        let imap_result = self.imap.logout().await;
        let smtp_result = self.smtp.quit().await;

        if let Some(username) = self.username.take() {
            info!("Logged out {}", username);
        }
        self.current = None;
        imap_result?;
        smtp_result
    }

    /// Refresh the mailbox directory and the special-use alias table
    pub async fn fetch_mailboxes(&mut self) -> GmailboxResult<Vec<String>> {
        let entries = self.imap.list().await?;

        let mut mailboxes = IndexMap::new();
        let mut aliases = HashMap::new();
        for entry in entries.iter().filter(|entry| entry.is_selectable()) {
            let name = decode_mailbox_name(&entry.name);
            let special = SpecialUse::detect(&name, &entry.attributes);
            if let Some(alias) = special {
                aliases.entry(alias).or_insert_with(|| name.clone());
            }

            let mut mailbox = self
                .mailboxes
                .shift_remove(&name)
                .unwrap_or_else(|| Mailbox::new(name.clone(), special));
            mailbox.special = special;
            mailbox.attributes = entry.attributes.clone();
            mailboxes.insert(name, mailbox);
        }

        self.mailboxes = mailboxes;
        self.aliases = aliases;
        info!(
            "Found {} mailboxes, {} with special use",
            self.mailboxes.len(),
            self.aliases.len()
        );
        Ok(self.mailboxes.keys().cloned().collect())
    }

    /// Select a mailbox unless it is already selected
    pub async fn use_mailbox(&mut self, name: &str) -> GmailboxResult<()> {
        if self.current.as_deref() == Some(name) {
            return Ok(());
        }

        self.imap.select(&encode_mailbox_name(name)).await?;
        debug!("Selected {}", name);
        self.current = Some(name.to_string());
        if !self.mailboxes.contains_key(name) {
            self.mailboxes
                .insert(name.to_string(), Mailbox::new(name, None));
        }
        Ok(())
    }

    /// Select a mailbox and return its directory entry
    pub async fn mailbox(&mut self, name: &str) -> GmailboxResult<&Mailbox> {
        self.use_mailbox(name).await?;
        self.mailboxes
            .get(name)
            .ok_or_else(|| GmailboxError::not_found(format!("mailbox {}", name)))
    }

    /// Directory entry without selecting
    pub fn get_mailbox(&self, name: &str) -> Option<&Mailbox> {
        self.mailboxes.get(name)
    }

    /// Name of the mailbox holding a special-use role
    pub fn special_name(&self, alias: SpecialUse) -> Option<&str> {
        self.aliases.get(&alias).map(String::as_str)
    }

    /// Check whether `name` is the mailbox holding `alias`
    pub fn is_special(&self, name: &str, alias: SpecialUse) -> bool {
        self.special_name(alias) == Some(name)
    }

    /// Directory entry for a special-use role
    pub fn special_mailbox(&self, alias: SpecialUse) -> Option<&Mailbox> {
        self.special_name(alias).and_then(|name| self.mailboxes.get(name))
    }

    /// Inbox
    pub fn inbox(&self) -> Option<&Mailbox> {
        self.special_mailbox(SpecialUse::Inbox)
    }

    /// Spam
    pub fn spam(&self) -> Option<&Mailbox> {
        self.special_mailbox(SpecialUse::Spam)
    }

    /// Starred
    pub fn starred(&self) -> Option<&Mailbox> {
        self.special_mailbox(SpecialUse::Starred)
    }

    /// All Mail
    pub fn all_mail(&self) -> Option<&Mailbox> {
        self.special_mailbox(SpecialUse::AllMail)
    }

    /// Sent Mail
    pub fn sent_mail(&self) -> Option<&Mailbox> {
        self.special_mailbox(SpecialUse::Sent)
    }

    /// Important
    pub fn important(&self) -> Option<&Mailbox> {
        self.special_mailbox(SpecialUse::Important)
    }

    /// Trash
    pub fn trash(&self) -> Option<&Mailbox> {
        self.special_mailbox(SpecialUse::Trash)
    }

    /// Display names of every known mailbox
    pub fn labels(&self) -> Vec<String> {
        self.mailboxes.keys().cloned().collect()
    }

    /// Create a mailbox on the server, then record it
    pub async fn create_mailbox(&mut self, name: &str) -> GmailboxResult<()> {
        self.imap.create(&encode_mailbox_name(name)).await?;
        self.mailboxes
            .entry(name.to_string())
            .or_insert_with(|| Mailbox::new(name, None));
        info!("Created mailbox {}", name);
        Ok(())
    }

    /// Delete a mailbox on the server, then forget it
    pub async fn delete_mailbox(&mut self, name: &str) -> GmailboxResult<()> {
        self.imap.delete(&encode_mailbox_name(name)).await?;
        self.mailboxes.shift_remove(name);
        self.aliases.retain(|_, mailbox| mailbox.as_str() != name);
        if self.current.as_deref() == Some(name) {
            self.current = None;
        }
        info!("Deleted mailbox {}", name);
        Ok(())
    }

    /// Copy a message into `to`.
    ///
    /// Without `from` the copy runs against the current selection.
    pub async fn copy(&mut self, uid: u32, to: &str, from: Option<&str>) -> GmailboxResult<()> {
        if let Some(from) = from {
            self.use_mailbox(from).await?;
        }
        self.imap
            .uid_copy(&uid.to_string(), &encode_mailbox_name(to))
            .await?;
        debug!("Copied message {} into {}", uid, to);
        Ok(())
    }

    /// Search a mailbox, All Mail by default
    pub async fn find(&mut self, mailbox: Option<&str>, query: &SearchQuery) -> GmailboxResult<Vec<Message>> {
        let name = match mailbox {
            Some(name) => name.to_string(),
            None => self
                .special_name(SpecialUse::AllMail)
                .ok_or_else(|| GmailboxError::precondition("account exposes no all-mail mailbox"))?
                .to_string(),
        };

        self.use_mailbox(&name).await?;
        let criteria = query.to_imap();
        let uids = self.imap.uid_search(&criteria).await?;
        debug!("UID SEARCH {} in {} matched {}", criteria, name, uids.len());

        if uids.is_empty() {
            return Ok(Vec::new());
        }
        if query.wants_prefetch() || self.prefetch {
            return self.fetch_messages(&name, &uids).await;
        }

        let mailbox = self
            .mailboxes
            .get_mut(&name)
            .ok_or_else(|| GmailboxError::not_found(format!("mailbox {}", name)))?;
        Ok(uids
            .into_iter()
            .map(|uid| match mailbox.message(uid) {
                Some(cached) => cached.clone(),
                None => {
                    let message = Message::new(uid, name.clone());
                    mailbox.cache(message.clone());
                    message
                }
            })
            .collect())
    }

    /// Fetch several messages in one command and cache them
    pub async fn fetch_messages(&mut self, mailbox: &str, uids: &[u32]) -> GmailboxResult<Vec<Message>> {
        let fetched = self.fetch_raw(mailbox, uids).await?;

        let mut messages = Vec::with_capacity(fetched.len());
        for raw in &fetched {
            let uid = raw
                .uid()
                .ok_or_else(|| GmailboxError::parse(format!("fetch response without UID: {}", raw.metadata)))?;
            let mut message = Message::new(uid, mailbox);
            message.parse(raw)?;
            self.update_cached(&message);
            messages.push(message);
        }
        Ok(messages)
    }

    /// Cached copy of a message
    pub fn cached(&self, mailbox: &str, uid: u32) -> Option<&Message> {
        self.mailboxes.get(mailbox).and_then(|m| m.message(uid))
    }

    /// Compose and submit a draft, returning its Message-ID
    pub async fn send(&mut self, draft: &Draft) -> GmailboxResult<String> {
        let sender = draft
            .sender
            .clone()
            .or_else(|| self.username.clone())
            .ok_or_else(|| GmailboxError::precondition("no sender and not logged in"))?;

        let outgoing = draft.build(&sender, self.mail_domain())?;
        self.smtp
            .sendmail(&outgoing.from, &outgoing.recipients, &outgoing.raw)
            .await?;

        info!(
            "Sent {} to {} recipients from {}",
            outgoing.message_id,
            outgoing.recipients.len(),
            address_of(&sender)
        );
        Ok(outgoing.message_id)
    }

    pub(crate) async fn fetch_raw(&mut self, mailbox: &str, uids: &[u32]) -> GmailboxResult<Vec<RawFetch>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        self.use_mailbox(mailbox).await?;
        let set = uids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.imap.uid_fetch(&set).await
    }

    pub(crate) fn update_cached(&mut self, message: &Message) {
        match self.mailboxes.get_mut(&message.mailbox) {
            Some(mailbox) => mailbox.cache(message.clone()),
            None => warn!("Message {} belongs to unknown mailbox {}", message.uid, message.mailbox),
        }
    }

    pub(crate) fn imap_mut(&mut self) -> &mut dyn ImapTransport {
        self.imap.as_mut()
    }
}
