//! XOAUTH2 SASL mechanism for Gmail IMAP

use tracing::warn;

/// XOAUTH2 credentials for one authentication exchange
pub struct XOAuth2 {
    /// Email address
    email: String,
    /// OAuth2 access token
    access_token: String,
    /// Whether the initial response went out
    sent: bool,
}

impl XOAuth2 {
    /// Create a new XOAUTH2 exchange
    pub fn new(email: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            access_token: access_token.into(),
            sent: false,
        }
    }

    /// Unencoded SASL initial response
    pub fn sasl_string(&self) -> String {
        format!("user={}\x01auth=Bearer {}\x01\x01", self.email, self.access_token)
    }

    /// Get the email address
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Check that both parts of the credential are present
    pub fn is_complete(&self) -> bool {
        !self.email.is_empty() && !self.access_token.is_empty()
    }
}

impl async_imap::Authenticator for XOAuth2 {
    type Response = Vec<u8>;

    /// First challenge gets the credentials. A second one carries the
    /// server's JSON error, answered with an empty line so the server
    /// sends its tagged NO.
    fn process(&mut self, challenge: &[u8]) -> Self::Response {
        if self.sent {
            warn!(
                "XOAUTH2 rejected for {}: {}",
                self.email,
                String::from_utf8_lossy(challenge)
            );
            return Vec::new();
        }
        self.sent = true;
        self.sasl_string().into_bytes()
    }
}
