//! Mailbox directory entries and special-use roles

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::codec::encode_mailbox_name;
use crate::message::Message;

/// Reserved mailbox roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecialUse {
    /// Inbox folder
    Inbox,
    /// Every message in the account
    AllMail,
    /// Sent messages
    Sent,
    /// Deleted messages
    Trash,
    /// Junk mail
    Spam,
    /// Flagged messages
    Starred,
    /// Messages marked important
    Important,
    /// Unsent drafts
    Drafts,
}

impl SpecialUse {
    /// Role advertised by a LIST attribute such as `\Trash`
    pub fn from_attribute(attribute: &str) -> Option<Self> {
        match attribute.to_ascii_lowercase().as_str() {
            "\\all" => Some(SpecialUse::AllMail),
            "\\sent" => Some(SpecialUse::Sent),
            "\\trash" => Some(SpecialUse::Trash),
            "\\junk" => Some(SpecialUse::Spam),
            "\\flagged" => Some(SpecialUse::Starred),
            "\\important" => Some(SpecialUse::Important),
            "\\drafts" => Some(SpecialUse::Drafts),
            _ => None,
        }
    }

    /// Role of a listed mailbox, from its attributes or the `INBOX` name
    pub fn detect(name: &str, attributes: &[String]) -> Option<Self> {
        if name.eq_ignore_ascii_case("INBOX") {
            return Some(SpecialUse::Inbox);
        }
        attributes.iter().find_map(|attr| Self::from_attribute(attr))
    }
}

impl std::fmt::Display for SpecialUse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpecialUse::Inbox => write!(f, "Inbox"),
            SpecialUse::AllMail => write!(f, "All Mail"),
            SpecialUse::Sent => write!(f, "Sent"),
            SpecialUse::Trash => write!(f, "Trash"),
            SpecialUse::Spam => write!(f, "Spam"),
            SpecialUse::Starred => write!(f, "Starred"),
            SpecialUse::Important => write!(f, "Important"),
            SpecialUse::Drafts => write!(f, "Drafts"),
        }
    }
}

/// A remote folder and the messages fetched from it
#[derive(Debug, Clone)]
pub struct Mailbox {
    /// Display name
    pub name: String,
    /// Reserved role, if any
    pub special: Option<SpecialUse>,
    /// LIST attributes
    pub attributes: Vec<String>,
    messages: HashMap<u32, Message>,
}

impl Mailbox {
    /// Create an empty mailbox entry
    pub fn new(name: impl Into<String>, special: Option<SpecialUse>) -> Self {
        Self {
            name: name.into(),
            special,
            attributes: Vec::new(),
            messages: HashMap::new(),
        }
    }

    /// Name as sent on the wire
    pub fn wire_name(&self) -> String {
        encode_mailbox_name(&self.name)
    }

    /// Check if this mailbox has a reserved role
    pub fn is_special(&self) -> bool {
        self.special.is_some()
    }

    /// Cached message by uid
    pub fn message(&self, uid: u32) -> Option<&Message> {
        self.messages.get(&uid)
    }

    /// All cached messages
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.values()
    }

    /// Number of cached messages
    pub fn cached_count(&self) -> usize {
        self.messages.len()
    }

    pub(crate) fn cache(&mut self, message: Message) {
        self.messages.insert(message.uid, message);
    }
}
