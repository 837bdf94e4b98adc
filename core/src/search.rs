//! Search criteria for `UID SEARCH`

use chrono::NaiveDate;

use crate::codec::{encode_mailbox_name, quote_imap_string};

/// Builder for IMAP search criteria, including Gmail extensions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    criteria: Vec<String>,
    prefetch: bool,
}

impl SearchQuery {
    /// Match every message
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, criterion: String) -> Self {
        self.criteria.push(criterion);
        self
    }

    /// Messages with `\Seen`
    pub fn read(self) -> Self {
        self.push("SEEN".to_string())
    }

    /// Messages without `\Seen`
    pub fn unread(self) -> Self {
        self.push("UNSEEN".to_string())
    }

    /// Messages with `\Flagged`
    pub fn starred(self) -> Self {
        self.push("FLAGGED".to_string())
    }

    /// Messages without `\Flagged`
    pub fn unstarred(self) -> Self {
        self.push("UNFLAGGED".to_string())
    }

    /// Messages with `\Deleted`
    pub fn deleted(self) -> Self {
        self.push("DELETED".to_string())
    }

    /// Messages without `\Deleted`
    pub fn undeleted(self) -> Self {
        self.push("UNDELETED".to_string())
    }

    /// Messages with `\Draft`
    pub fn draft(self) -> Self {
        self.push("DRAFT".to_string())
    }

    /// Messages without `\Draft`
    pub fn undraft(self) -> Self {
        self.push("UNDRAFT".to_string())
    }

    /// Sent before a date
    pub fn before(self, date: NaiveDate) -> Self {
        self.push(format!("BEFORE {}", imap_date(date)))
    }

    /// Sent on or after a date
    pub fn after(self, date: NaiveDate) -> Self {
        self.push(format!("SINCE {}", imap_date(date)))
    }

    /// Sent on a date
    pub fn on(self, date: NaiveDate) -> Self {
        self.push(format!("ON {}", imap_date(date)))
    }

    /// Sender contains text
    pub fn sender(self, text: &str) -> Self {
        self.push(format!("FROM {}", quote_imap_string(text)))
    }

    /// Recipient contains text
    pub fn to(self, text: &str) -> Self {
        self.push(format!("TO {}", quote_imap_string(text)))
    }

    /// Subject contains text
    pub fn subject(self, text: &str) -> Self {
        self.push(format!("SUBJECT {}", quote_imap_string(text)))
    }

    /// Messages carrying a Gmail label
    pub fn label(self, label: &str) -> Self {
        self.push(format!("X-GM-LABELS {}", quote_imap_string(&encode_mailbox_name(label))))
    }

    /// Messages in a Gmail thread
    pub fn thread_id(self, thread_id: u64) -> Self {
        self.push(format!("X-GM-THRID {}", thread_id))
    }

    /// Message with a Gmail message id
    pub fn message_id(self, message_id: u64) -> Self {
        self.push(format!("X-GM-MSGID {}", message_id))
    }

    /// Messages with attachments
    pub fn has_attachment(self) -> Self {
        self.raw("has:attachment")
    }

    /// Gmail web search syntax
    pub fn raw(self, query: &str) -> Self {
        self.push(format!("X-GM-RAW {}", quote_imap_string(query)))
    }

    /// Fetch full messages along with the search results
    pub fn prefetch(mut self) -> Self {
        self.prefetch = true;
        self
    }

    /// Whether results should be fetched immediately
    pub fn wants_prefetch(&self) -> bool {
        self.prefetch
    }

    /// Render as a `UID SEARCH` argument
    pub fn to_imap(&self) -> String {
        if self.criteria.is_empty() {
            "ALL".to_string()
        } else {
            self.criteria.join(" ")
        }
    }
}

fn imap_date(date: NaiveDate) -> String {
    date.format("%d-%b-%Y").to_string()
}
