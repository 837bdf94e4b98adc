//! Gmailbox Core Library
//!
//! A client core for Gmail mailboxes reached over IMAP and SMTP:
//! - Header and address decoding, modified UTF-7 mailbox names
//! - Fetch response parsing into [`Message`] values
//! - Flag, label and move mutations mirrored after the server accepts them
//! - Thread assembly across the current and sent mailboxes
//! - Outgoing message composition, replies and forwards

pub mod codec;
pub mod config;
pub mod draft;
pub mod error;
pub mod mailbox;
pub mod message;
pub mod parser;
pub mod reply;
pub mod search;
pub mod session;
pub mod thread;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use draft::{Attachment, Draft, OutgoingMessage};
pub use error::{GmailboxError, GmailboxResult};
pub use mailbox::{Mailbox, SpecialUse};
pub use message::{Flag, Headers, Message};
pub use parser::RawFetch;
pub use reply::ComposeOptions;
pub use search::SearchQuery;
pub use session::Session;
pub use transport::{ImapTransport, ListEntry, SmtpTransport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Domain appended to bare usernames
pub const GMAIL_DOMAIN: &str = "gmail.com";

/// Gmail IMAP server
pub const GMAIL_IMAP_HOST: &str = "imap.gmail.com";
pub const GMAIL_IMAP_PORT: u16 = 993;

/// Gmail SMTP server
pub const GMAIL_SMTP_HOST: &str = "smtp.gmail.com";
pub const GMAIL_SMTP_PORT: u16 = 587;

/// Items requested for every message fetch
pub const FETCH_ITEMS: &str = "(UID BODY.PEEK[] FLAGS X-GM-THRID X-GM-MSGID X-GM-LABELS)";

/// Install a `tracing` subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over `level`. Fails if a global subscriber
/// is already set.
pub fn init_logging(level: &str) -> GmailboxResult<()> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| GmailboxError::config(format!("Invalid log level '{}': {}", level, e)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| GmailboxError::config(format!("Logging already initialized: {}", e)))?;

    tracing::info!("Gmailbox Core v{} logging at {}", VERSION, level);
    Ok(())
}
