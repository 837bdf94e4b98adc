//! Protocol connections consumed by the session
//!
//! The session only talks to the servers through [`ImapTransport`] and
//! [`SmtpTransport`]. Mailbox names passed to these traits are already in
//! their modified UTF-7 wire form.

use async_trait::async_trait;

use crate::error::GmailboxResult;
use crate::parser::RawFetch;

pub mod imap;
pub mod smtp;
pub mod xoauth2;

pub use imap::AsyncImapTransport;
pub use smtp::LettreSmtpTransport;
pub use xoauth2::XOAuth2;

/// One entry of a LIST response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Name attributes such as `\Noselect` or `\Trash`
    pub attributes: Vec<String>,
    /// Hierarchy delimiter
    pub delimiter: Option<String>,
    /// Wire-encoded mailbox name
    pub name: String,
}

impl ListEntry {
    /// Check for an attribute, ignoring case
    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes
            .iter()
            .any(|attr| attr.eq_ignore_ascii_case(attribute))
    }

    /// Check whether the mailbox can be selected
    pub fn is_selectable(&self) -> bool {
        !self.has_attribute("\\Noselect") && !self.has_attribute("\\NonExistent")
    }
}

/// IMAP leg of a session
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImapTransport: Send {
    /// Authenticate with a password
    async fn login(&mut self, username: &str, password: &str) -> GmailboxResult<()>;

    /// Authenticate with an OAuth2 access token
    async fn authenticate_xoauth2(&mut self, username: &str, access_token: &str) -> GmailboxResult<()>;

    /// List every mailbox
    async fn list(&mut self) -> GmailboxResult<Vec<ListEntry>>;

    /// Select a mailbox
    async fn select(&mut self, mailbox: &str) -> GmailboxResult<()>;

    /// Create a mailbox
    async fn create(&mut self, mailbox: &str) -> GmailboxResult<()>;

    /// Delete a mailbox
    async fn delete(&mut self, mailbox: &str) -> GmailboxResult<()>;

    /// `UID STORE` in the selected mailbox
    async fn uid_store(&mut self, uid_set: &str, query: &str) -> GmailboxResult<()>;

    /// `UID COPY` from the selected mailbox
    async fn uid_copy(&mut self, uid_set: &str, mailbox: &str) -> GmailboxResult<()>;

    /// `UID SEARCH` in the selected mailbox
    async fn uid_search(&mut self, query: &str) -> GmailboxResult<Vec<u32>>;

    /// `UID FETCH` of full messages with Gmail attributes
    async fn uid_fetch(&mut self, uid_set: &str) -> GmailboxResult<Vec<RawFetch>>;

    /// Close the session
    async fn logout(&mut self) -> GmailboxResult<()>;
}

/// SMTP leg of a session
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SmtpTransport: Send {
    /// Authenticate with a password
    async fn login(&mut self, username: &str, password: &str) -> GmailboxResult<()>;

    /// Authenticate with an OAuth2 access token
    async fn authenticate_xoauth2(&mut self, username: &str, access_token: &str) -> GmailboxResult<()>;

    /// Submit an encoded message
    async fn sendmail(&mut self, from: &str, recipients: &[String], raw: &[u8]) -> GmailboxResult<()>;

    /// Close the connection
    async fn quit(&mut self) -> GmailboxResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_entry_selectable() {
        let entry = ListEntry {
            attributes: vec!["\\HasChildren".to_string(), "\\NoSelect".to_string()],
            delimiter: Some("/".to_string()),
            name: "[Gmail]".to_string(),
        };
        assert!(!entry.is_selectable());
        assert!(entry.has_attribute("\\haschildren"));

        let entry = ListEntry {
            attributes: vec!["\\All".to_string()],
            delimiter: Some("/".to_string()),
            name: "[Gmail]/All Mail".to_string(),
        };
        assert!(entry.is_selectable());
    }
}
