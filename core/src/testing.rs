//! Recording fake transports shared by the unit tests

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use indexmap::IndexMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::codec::{encode_mailbox_name, quote_imap_string};
use crate::error::{GmailboxError, GmailboxResult};
use crate::parser::RawFetch;
use crate::session::Session;
use crate::transport::{ImapTransport, ListEntry, SmtpTransport};

/// A message stored on the fake server
#[derive(Debug, Clone)]
pub(crate) struct FakeMessage {
    pub uid: u32,
    pub thread_id: Option<u64>,
    pub gm_msgid: u64,
    pub subject: String,
    pub from: String,
    pub to: String,
    pub date: String,
    pub header_id: String,
    pub flags: Vec<String>,
    pub labels: Vec<String>,
}

impl FakeMessage {
    /// Send time `hours` after the fixture epoch
    pub fn at(mut self, hours: i64) -> Self {
        let epoch = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        self.date = (epoch + Duration::hours(hours)).to_rfc2822();
        self
    }

    pub fn without_thread(mut self) -> Self {
        self.thread_id = None;
        self
    }

    fn metadata(&self, seq: usize) -> String {
        let mut line = format!("* {} FETCH (UID {} FLAGS ({})", seq, self.uid, self.flags.join(" "));
        if let Some(thread_id) = self.thread_id {
            line.push_str(&format!(" X-GM-THRID {}", thread_id));
        }
        line.push_str(&format!(" X-GM-MSGID {}", self.gm_msgid));
        let labels: Vec<String> = self.labels.iter().map(|l| quote_imap_string(l)).collect();
        line.push_str(&format!(" X-GM-LABELS ({}))", labels.join(" ")));
        line
    }

    fn rfc822(&self) -> Vec<u8> {
        format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nDate: {}\r\nMessage-ID: {}\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\r\nBody of {}\r\n",
            self.from, self.to, self.subject, self.date, self.header_id, self.subject
        )
        .into_bytes()
    }
}

/// A message received from Alice into the inbox
pub(crate) fn inbox_message(uid: u32, thread_id: u64, subject: &str) -> FakeMessage {
    FakeMessage {
        uid,
        thread_id: Some(thread_id),
        gm_msgid: thread_id * 1000 + u64::from(uid),
        subject: subject.to_string(),
        from: "Alice <alice@example.com>".to_string(),
        to: "Me <me@gmail.com>".to_string(),
        date: String::new(),
        header_id: format!("<{}.{}@example.com>", thread_id, uid),
        flags: Vec::new(),
        labels: vec!["\\Inbox".to_string()],
    }
    .at(i64::from(uid))
}

/// A message sent by the account owner to Alice
pub(crate) fn sent_message(uid: u32, thread_id: u64, subject: &str) -> FakeMessage {
    FakeMessage {
        from: "Me <me@gmail.com>".to_string(),
        to: "Alice <alice@example.com>".to_string(),
        header_id: format!("<{}.{}@gmail.com>", thread_id, uid),
        flags: vec!["\\Seen".to_string()],
        labels: vec!["\\Sent".to_string()],
        ..inbox_message(uid, thread_id, subject)
    }
}

#[derive(Debug)]
struct FakeMailbox {
    attributes: Vec<String>,
    messages: Vec<FakeMessage>,
    next_uid: u32,
}

impl FakeMailbox {
    fn new(attributes: &[&str]) -> Self {
        Self {
            attributes: attributes.iter().map(|a| a.to_string()).collect(),
            messages: Vec::new(),
            next_uid: 1,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    mailboxes: IndexMap<String, FakeMailbox>,
    selected: Option<String>,
    commands: Vec<String>,
    reject_imap_login: bool,
    reject_smtp_login: bool,
    sent: Vec<(String, Vec<String>, Vec<u8>)>,
}

impl State {
    fn selected(&mut self) -> GmailboxResult<&mut FakeMailbox> {
        let name = self
            .selected
            .clone()
            .ok_or_else(|| GmailboxError::transport("BAD no mailbox selected"))?;
        self.mailboxes
            .get_mut(&name)
            .ok_or_else(|| GmailboxError::transport("NO mailbox vanished"))
    }
}

/// Shared state behind [`FakeImap`] and [`FakeSmtp`]
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeServer(Arc<Mutex<State>>);

impl FakeServer {
    fn state(&self) -> MutexGuard<'_, State> {
        self.0.lock().unwrap()
    }

    fn add_mailbox(&self, wire_name: &str, attributes: &[&str]) {
        self.state()
            .mailboxes
            .insert(wire_name.to_string(), FakeMailbox::new(attributes));
    }

    pub fn add_message(&self, mailbox: &str, message: FakeMessage) {
        let mut state = self.state();
        let mailbox = state
            .mailboxes
            .get_mut(&encode_mailbox_name(mailbox))
            .expect("unknown fake mailbox");
        mailbox.next_uid = mailbox.next_uid.max(message.uid + 1);
        mailbox.messages.push(message);
    }

    pub fn reject_imap_login(&self) {
        self.state().reject_imap_login = true;
    }

    pub fn reject_smtp_login(&self) {
        self.state().reject_smtp_login = true;
    }

    pub fn flags(&self, mailbox: &str, uid: u32) -> Vec<String> {
        self.state()
            .mailboxes
            .get(&encode_mailbox_name(mailbox))
            .and_then(|m| m.messages.iter().find(|msg| msg.uid == uid))
            .map(|msg| msg.flags.clone())
            .unwrap_or_default()
    }

    pub fn labels(&self, mailbox: &str, uid: u32) -> Vec<String> {
        self.state()
            .mailboxes
            .get(&encode_mailbox_name(mailbox))
            .and_then(|m| m.messages.iter().find(|msg| msg.uid == uid))
            .map(|msg| msg.labels.clone())
            .unwrap_or_default()
    }

    pub fn uids(&self, mailbox: &str) -> Vec<u32> {
        let mut uids: Vec<u32> = self
            .state()
            .mailboxes
            .get(&encode_mailbox_name(mailbox))
            .map(|m| m.messages.iter().map(|msg| msg.uid).collect())
            .unwrap_or_default();
        uids.sort_unstable();
        uids
    }

    pub fn selected(&self) -> Option<String> {
        self.state().selected.clone()
    }

    pub fn commands_matching(&self, prefix: &str) -> usize {
        self.state()
            .commands
            .iter()
            .filter(|command| command.starts_with(prefix))
            .count()
    }

    pub fn sent(&self) -> Vec<(String, Vec<String>, Vec<u8>)> {
        self.state().sent.clone()
    }

    fn record(&self, command: String) -> MutexGuard<'_, State> {
        let mut state = self.state();
        state.commands.push(command);
        state
    }
}

/// A server listing the usual Gmail folders, with the trash named `[Gmail]/Bin`
pub(crate) fn gmail_server() -> FakeServer {
    let server = FakeServer::default();
    server.add_mailbox("INBOX", &["\\HasNoChildren"]);
    server.add_mailbox("[Gmail]", &["\\HasChildren", "\\Noselect"]);
    server.add_mailbox("[Gmail]/All Mail", &["\\HasNoChildren", "\\All"]);
    server.add_mailbox("[Gmail]/Sent Mail", &["\\HasNoChildren", "\\Sent"]);
    server.add_mailbox("[Gmail]/Bin", &["\\HasNoChildren", "\\Trash"]);
    server.add_mailbox("[Gmail]/Spam", &["\\HasNoChildren", "\\Junk"]);
    server.add_mailbox("[Gmail]/Starred", &["\\HasNoChildren", "\\Flagged"]);
    server.add_mailbox("[Gmail]/Important", &["\\HasNoChildren", "\\Important"]);
    server.add_mailbox("[Gmail]/Drafts", &["\\HasNoChildren", "\\Drafts"]);
    server.add_mailbox("Work", &["\\HasNoChildren"]);
    server.add_mailbox("Entw&APw-rfe", &["\\HasNoChildren"]);
    server
}

/// A session logged in as `me@gmail.com`
pub(crate) async fn session_with(server: &FakeServer) -> Session {
    let mut session = Session::new(Box::new(FakeImap::new(server)), Box::new(FakeSmtp::new(server)));
    session.login("me", "password").await.unwrap();
    session
}

fn uid_set(set: &str) -> Vec<u32> {
    set.split(',').filter_map(|uid| uid.trim().parse().ok()).collect()
}

/// Items of a `+FLAGS (a b)` style store query
fn store_items(items: &str) -> Vec<String> {
    items
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split_whitespace()
        .map(|token| token.trim_matches('"').to_string())
        .collect()
}

pub(crate) struct FakeImap {
    server: FakeServer,
}

impl FakeImap {
    pub fn new(server: &FakeServer) -> Self {
        Self {
            server: server.clone(),
        }
    }
}

#[async_trait]
impl ImapTransport for FakeImap {
    async fn login(&mut self, username: &str, _password: &str) -> GmailboxResult<()> {
        let state = self.server.record(format!("LOGIN {}", username));
        if state.reject_imap_login {
            return Err(GmailboxError::AuthenticationFailed);
        }
        Ok(())
    }

    async fn authenticate_xoauth2(&mut self, username: &str, _access_token: &str) -> GmailboxResult<()> {
        let state = self.server.record(format!("AUTHENTICATE XOAUTH2 {}", username));
        if state.reject_imap_login {
            return Err(GmailboxError::AuthenticationFailed);
        }
        Ok(())
    }

    async fn list(&mut self) -> GmailboxResult<Vec<ListEntry>> {
        let state = self.server.record("LIST \"\" *".to_string());
        let entries = state
            .mailboxes
            .iter()
            .map(|(name, mailbox)| ListEntry {
                attributes: mailbox.attributes.clone(),
                delimiter: Some("/".to_string()),
                name: name.clone(),
            })
            .collect();
        Ok(entries)
    }

    async fn select(&mut self, mailbox: &str) -> GmailboxResult<()> {
        let mut state = self.server.record(format!("SELECT {}", mailbox));
        match state.mailboxes.get(mailbox) {
            Some(entry) if !entry.attributes.iter().any(|a| a == "\\Noselect") => {
                state.selected = Some(mailbox.to_string());
                Ok(())
            }
            _ => Err(GmailboxError::transport(format!("NO [NONEXISTENT] {}", mailbox))),
        }
    }

    async fn create(&mut self, mailbox: &str) -> GmailboxResult<()> {
        let mut state = self.server.record(format!("CREATE {}", mailbox));
        if state.mailboxes.contains_key(mailbox) {
            return Err(GmailboxError::transport("NO [ALREADYEXISTS] Duplicate folder name"));
        }
        state
            .mailboxes
            .insert(mailbox.to_string(), FakeMailbox::new(&["\\HasNoChildren"]));
        Ok(())
    }

    async fn delete(&mut self, mailbox: &str) -> GmailboxResult<()> {
        let mut state = self.server.record(format!("DELETE {}", mailbox));
        if state.mailboxes.shift_remove(mailbox).is_none() {
            return Err(GmailboxError::transport(format!("NO [NONEXISTENT] {}", mailbox)));
        }
        if state.selected.as_deref() == Some(mailbox) {
            state.selected = None;
        }
        Ok(())
    }

    async fn uid_store(&mut self, uid_set_str: &str, query: &str) -> GmailboxResult<()> {
        let mut state = self.server.record(format!("UID STORE {} {}", uid_set_str, query));
        let (operation, items) = query
            .split_once(' ')
            .ok_or_else(|| GmailboxError::transport("BAD malformed STORE"))?;
        let items = store_items(items);
        let uids = uid_set(uid_set_str);

        let mailbox = state.selected()?;
        for message in mailbox.messages.iter_mut().filter(|m| uids.contains(&m.uid)) {
            let target = match operation.trim_start_matches(['+', '-']) {
                "FLAGS" => &mut message.flags,
                "X-GM-LABELS" => &mut message.labels,
                other => return Err(GmailboxError::transport(format!("BAD unknown item {}", other))),
            };
            for item in &items {
                if operation.starts_with('+') {
                    if !target.contains(item) {
                        target.push(item.clone());
                    }
                } else {
                    target.retain(|existing| existing != item);
                }
            }
        }
        Ok(())
    }

    async fn uid_copy(&mut self, uid_set_str: &str, target: &str) -> GmailboxResult<()> {
        let mut state = self.server.record(format!("UID COPY {} {}", uid_set_str, target));
        if !state.mailboxes.contains_key(target) {
            return Err(GmailboxError::transport(format!("NO [TRYCREATE] {}", target)));
        }
        let uids = uid_set(uid_set_str);
        let copies: Vec<FakeMessage> = state
            .selected()?
            .messages
            .iter()
            .filter(|m| uids.contains(&m.uid))
            .cloned()
            .collect();

        if let Some(mailbox) = state.mailboxes.get_mut(target) {
            for mut copy in copies {
                copy.uid = mailbox.next_uid;
                mailbox.next_uid += 1;
                mailbox.messages.push(copy);
            }
        }
        Ok(())
    }

    async fn uid_search(&mut self, query: &str) -> GmailboxResult<Vec<u32>> {
        let mut state = self.server.record(format!("UID SEARCH {}", query));
        let tokens: Vec<&str> = query.split_whitespace().collect();
        let mailbox = state.selected()?;

        let mut uids: Vec<u32> = mailbox
            .messages
            .iter()
            .filter(|message| {
                let mut tokens = tokens.iter();
                while let Some(token) = tokens.next() {
                    let matched = match *token {
                        "ALL" => true,
                        "SEEN" => message.flags.iter().any(|f| f == "\\Seen"),
                        "UNSEEN" => !message.flags.iter().any(|f| f == "\\Seen"),
                        "X-GM-THRID" => {
                            let wanted = tokens.next().and_then(|id| id.parse().ok());
                            message.thread_id.is_some() && message.thread_id == wanted
                        }
                        _ => true,
                    };
                    if !matched {
                        return false;
                    }
                }
                true
            })
            .map(|message| message.uid)
            .collect();
        uids.sort_unstable();
        Ok(uids)
    }

    async fn uid_fetch(&mut self, uid_set_str: &str) -> GmailboxResult<Vec<RawFetch>> {
        let mut state = self.server.record(format!("UID FETCH {}", uid_set_str));
        let uids = uid_set(uid_set_str);
        let mailbox = state.selected()?;

        let fetched = mailbox
            .messages
            .iter()
            .enumerate()
            .filter(|(_, message)| uids.contains(&message.uid))
            .map(|(idx, message)| RawFetch::new(message.metadata(idx + 1), message.rfc822()))
            .collect();
        Ok(fetched)
    }

    async fn logout(&mut self) -> GmailboxResult<()> {
        let mut state = self.server.record("LOGOUT".to_string());
        state.selected = None;
        Ok(())
    }
}

pub(crate) struct FakeSmtp {
    server: FakeServer,
}

impl FakeSmtp {
    pub fn new(server: &FakeServer) -> Self {
        Self {
            server: server.clone(),
        }
    }
}

#[async_trait]
impl SmtpTransport for FakeSmtp {
    async fn login(&mut self, username: &str, _password: &str) -> GmailboxResult<()> {
        let state = self.server.record(format!("SMTP LOGIN {}", username));
        if state.reject_smtp_login {
            return Err(GmailboxError::AuthenticationFailed);
        }
        Ok(())
    }

    async fn authenticate_xoauth2(&mut self, username: &str, _access_token: &str) -> GmailboxResult<()> {
        let state = self.server.record(format!("SMTP XOAUTH2 {}", username));
        if state.reject_smtp_login {
            return Err(GmailboxError::AuthenticationFailed);
        }
        Ok(())
    }

    async fn sendmail(&mut self, from: &str, recipients: &[String], raw: &[u8]) -> GmailboxResult<()> {
        let mut state = self.server.record(format!("SMTP MAIL FROM {}", from));
        state
            .sent
            .push((from.to_string(), recipients.to_vec(), raw.to_vec()));
        Ok(())
    }

    async fn quit(&mut self) -> GmailboxResult<()> {
        self.server.record("SMTP QUIT".to_string());
        Ok(())
    }
}
