//! SMTP leg over `lettre`

use async_trait::async_trait;
use lettre::address::{Address, Envelope};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::info;

use super::SmtpTransport;
use crate::config::ServerConfig;
use crate::error::{GmailboxError, GmailboxResult};

/// Port on which the server expects TLS from the first byte
const IMPLICIT_TLS_PORT: u16 = 465;

/// SMTP submission through a relay such as `smtp.gmail.com:587`
pub struct LettreSmtpTransport {
    host: String,
    port: u16,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl LettreSmtpTransport {
    /// Prepare a transport; nothing is sent until authentication
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            transport: None,
        }
    }

    /// Build an authenticated transport and check that the server accepts it
    async fn connect(&mut self, credentials: Credentials, mechanisms: Vec<Mechanism>) -> GmailboxResult<()> {
        let builder = if self.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)?
        };

        let transport = builder
            .port(self.port)
            .credentials(credentials)
            .authentication(mechanisms)
            .build();

        match transport.test_connection().await {
            Ok(true) => {
                info!("Connected to SMTP server {}:{}", self.host, self.port);
                self.transport = Some(transport);
                Ok(())
            }
            Ok(false) => Err(GmailboxError::transport(format!(
                "SMTP server {} did not answer",
                self.host
            ))),
            Err(e) if e.is_permanent() => Err(GmailboxError::AuthenticationFailed),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SmtpTransport for LettreSmtpTransport {
    async fn login(&mut self, username: &str, password: &str) -> GmailboxResult<()> {
        let credentials = Credentials::new(username.to_string(), password.to_string());
        self.connect(credentials, vec![Mechanism::Plain, Mechanism::Login])
            .await
    }

    async fn authenticate_xoauth2(&mut self, username: &str, access_token: &str) -> GmailboxResult<()> {
        let credentials = Credentials::new(username.to_string(), access_token.to_string());
        self.connect(credentials, vec![Mechanism::Xoauth2]).await
    }

    async fn sendmail(&mut self, from: &str, recipients: &[String], raw: &[u8]) -> GmailboxResult<()> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| GmailboxError::precondition("not logged in to SMTP server"))?;

        let from: Address = from.parse()?;
        let to = recipients
            .iter()
            .map(|r| r.parse::<Address>())
            .collect::<Result<Vec<_>, _>>()?;
        let envelope = Envelope::new(Some(from), to)?;

        transport.send_raw(&envelope, raw).await?;
        Ok(())
    }

    async fn quit(&mut self) -> GmailboxResult<()> {
        if self.transport.take().is_some() {
            info!("Disconnected from SMTP server {}", self.host);
        }
        Ok(())
    }
}
