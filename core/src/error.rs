//! Error types for Gmailbox Core

/// Result type alias for Gmailbox operations
pub type GmailboxResult<T> = Result<T, GmailboxError>;

/// Main error type for Gmailbox
#[derive(Debug, thiserror::Error)]
pub enum GmailboxError {
    /// Credentials rejected by either the IMAP or the SMTP server.
    ///
    /// Carries no detail so callers cannot tell which leg refused.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Malformed fetch response or message content
    #[error("Parse error: {0}")]
    Parse(String),

    /// MIME parsing errors
    #[error("MIME parsing error: {0}")]
    Mime(#[from] mailparse::MailParseError),

    /// Operation cannot run in the current state
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Command rejected by the server or protocol violation
    #[error("Transport error: {0}")]
    Transport(String),

    /// IMAP errors
    #[error("IMAP error: {0}")]
    Imap(#[from] async_imap::error::Error),

    /// SMTP transport errors
    #[error("SMTP transport error: {0}")]
    SmtpTransport(#[from] lettre::transport::smtp::Error),

    /// Message building errors
    #[error("Email error: {0}")]
    Email(#[from] lettre::error::Error),

    /// Address parsing errors
    #[error("Address parsing error: {0}")]
    AddressParsing(#[from] lettre::address::AddressError),

    /// Invalid content type for a part or attachment
    #[error("Content type error: {0}")]
    ContentType(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS errors
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    /// Unknown mailbox or message
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl GmailboxError {
    /// Create a new parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a new precondition error
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create a new transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a new not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Check if this is an authentication error
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::AuthenticationFailed)
    }

    /// Check if this error came from the connection to a server
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Imap(_) | Self::SmtpTransport(_) | Self::Io(_) | Self::Tls(_)
        )
    }

    /// Check if this error came from decoding message data
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::Mime(_))
    }
}
