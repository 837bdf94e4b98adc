//! IMAP leg over `async-imap` and native TLS

use async_imap::imap_proto::{AttributeValue, Response, Status};
use async_imap::types::{Fetch, Name, NameAttribute};
use async_imap::{Client, Session};
use async_trait::async_trait;
use futures::TryStreamExt;
use tokio::net::TcpStream;
use tokio_native_tls::TlsStream;
use tracing::{debug, info};

use super::xoauth2::XOAuth2;
use super::{ImapTransport, ListEntry};
use crate::codec::quote_imap_string;
use crate::config::ServerConfig;
use crate::error::{GmailboxError, GmailboxResult};
use crate::parser::RawFetch;
use crate::FETCH_ITEMS;

type ImapStream = TlsStream<TcpStream>;

/// IMAP connection to a TLS endpoint such as `imap.gmail.com:993`
pub struct AsyncImapTransport {
    host: String,
    client: Option<Client<ImapStream>>,
    session: Option<Session<ImapStream>>,
}

impl AsyncImapTransport {
    /// Open the TLS connection and read the server greeting
    pub async fn connect(config: &ServerConfig) -> GmailboxResult<Self> {
        let tcp = TcpStream::connect((config.host.as_str(), config.port)).await?;
        let connector = tokio_native_tls::TlsConnector::from(native_tls::TlsConnector::new()?);
        let tls = connector.connect(&config.host, tcp).await?;

        let mut client = Client::new(tls);
        match client.read_response().await {
            Some(Ok(_greeting)) => {}
            Some(Err(e)) => return Err(e.into()),
            None => {
                return Err(GmailboxError::transport(format!(
                    "{} closed the connection before greeting",
                    config.host
                )))
            }
        }

        info!("Connected to IMAP server {}:{}", config.host, config.port);
        Ok(Self {
            host: config.host.clone(),
            client: Some(client),
            session: None,
        })
    }

    fn take_client(&mut self) -> GmailboxResult<Client<ImapStream>> {
        self.client
            .take()
            .ok_or_else(|| GmailboxError::precondition("IMAP connection already authenticated"))
    }

    fn session(&mut self) -> GmailboxResult<&mut Session<ImapStream>> {
        self.session
            .as_mut()
            .ok_or_else(|| GmailboxError::precondition("not logged in to IMAP server"))
    }
}

/// Credential rejections become the uniform authentication error
fn auth_error(err: async_imap::error::Error) -> GmailboxError {
    match err {
        async_imap::error::Error::No(_) | async_imap::error::Error::Bad(_) => {
            GmailboxError::AuthenticationFailed
        }
        other => GmailboxError::Imap(other),
    }
}

#[async_trait]
impl ImapTransport for AsyncImapTransport {
    async fn login(&mut self, username: &str, password: &str) -> GmailboxResult<()> {
        let client = self.take_client()?;
        match client.login(username, password).await {
            Ok(session) => {
                self.session = Some(session);
                Ok(())
            }
            Err((err, client)) => {
                self.client = Some(client);
                Err(auth_error(err))
            }
        }
    }

    async fn authenticate_xoauth2(&mut self, username: &str, access_token: &str) -> GmailboxResult<()> {
        let client = self.take_client()?;
        match client
            .authenticate("XOAUTH2", XOAuth2::new(username, access_token))
            .await
        {
            Ok(session) => {
                self.session = Some(session);
                Ok(())
            }
            Err((err, client)) => {
                self.client = Some(client);
                Err(auth_error(err))
            }
        }
    }

    async fn list(&mut self) -> GmailboxResult<Vec<ListEntry>> {
        let session = self.session()?;
        let names: Vec<Name> = session.list(Some(""), Some("*")).await?.try_collect().await?;
        Ok(names.iter().map(list_entry).collect())
    }

    async fn select(&mut self, mailbox: &str) -> GmailboxResult<()> {
        self.session()?.select(mailbox).await?;
        Ok(())
    }

    async fn create(&mut self, mailbox: &str) -> GmailboxResult<()> {
        self.session()?.create(mailbox).await?;
        Ok(())
    }

    async fn delete(&mut self, mailbox: &str) -> GmailboxResult<()> {
        self.session()?.delete(mailbox).await?;
        Ok(())
    }

    async fn uid_store(&mut self, uid_set: &str, query: &str) -> GmailboxResult<()> {
        let session = self.session()?;
        let updates: Vec<Fetch> = session.uid_store(uid_set, query).await?.try_collect().await?;
        debug!("UID STORE {} returned {} updates", uid_set, updates.len());
        Ok(())
    }

    async fn uid_copy(&mut self, uid_set: &str, mailbox: &str) -> GmailboxResult<()> {
        self.session()?.uid_copy(uid_set, mailbox).await?;
        Ok(())
    }

    async fn uid_search(&mut self, query: &str) -> GmailboxResult<Vec<u32>> {
        let found = self.session()?.uid_search(query).await?;
        let mut uids: Vec<u32> = found.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    /// Issued as a raw command; the typed fetch API drops the Gmail attributes.
    async fn uid_fetch(&mut self, uid_set: &str) -> GmailboxResult<Vec<RawFetch>> {
        let session = self.session()?;
        let request = session
            .run_command(format!("UID FETCH {} {}", uid_set, FETCH_ITEMS))
            .await?;

        let mut fetched = Vec::new();
        loop {
            let response = match session.read_response().await {
                Some(response) => response?,
                None => return Err(GmailboxError::transport("connection closed during UID FETCH")),
            };

            match response.parsed() {
                Response::Fetch(seq, attributes) => {
                    if let Some(raw) = raw_fetch(*seq, attributes) {
                        fetched.push(raw);
                    }
                }
                Response::Done {
                    tag,
                    status,
                    information,
                    ..
                } if *tag == request => {
                    return match status {
                        Status::Ok => Ok(fetched),
                        _ => Err(GmailboxError::transport(format!(
                            "UID FETCH {} failed: {}",
                            uid_set,
                            information.as_deref().unwrap_or("no reason given")
                        ))),
                    };
                }
                _ => {}
            }
        }
    }

    async fn logout(&mut self) -> GmailboxResult<()> {
        if let Some(mut session) = self.session.take() {
            session.logout().await?;
            info!("Disconnected from IMAP server {}", self.host);
        }
        self.client = None;
        Ok(())
    }
}

fn list_entry(name: &Name) -> ListEntry {
    let attributes = name
        .attributes()
        .iter()
        .filter_map(|attr| match attr {
            NameAttribute::NoInferiors => Some("\\Noinferiors".to_string()),
            NameAttribute::NoSelect => Some("\\Noselect".to_string()),
            NameAttribute::Marked => Some("\\Marked".to_string()),
            NameAttribute::Unmarked => Some("\\Unmarked".to_string()),
            NameAttribute::All => Some("\\All".to_string()),
            NameAttribute::Archive => Some("\\Archive".to_string()),
            NameAttribute::Drafts => Some("\\Drafts".to_string()),
            NameAttribute::Flagged => Some("\\Flagged".to_string()),
            NameAttribute::Junk => Some("\\Junk".to_string()),
            NameAttribute::Sent => Some("\\Sent".to_string()),
            NameAttribute::Trash => Some("\\Trash".to_string()),
            NameAttribute::Extension(ext) => Some(ext.to_string()),
            #[allow(unreachable_patterns)]
            _ => None,
        })
        .collect();

    ListEntry {
        attributes,
        delimiter: name.delimiter().map(str::to_string),
        name: name.name().to_string(),
    }
}

/// Fetch attributes the parser reads back from the metadata line
#[derive(Debug, Default)]
struct FetchAttributes {
    seq: u32,
    uid: Option<u32>,
    flags: Vec<String>,
    thread_id: Option<u64>,
    message_id: Option<u64>,
    labels: Vec<String>,
}

impl FetchAttributes {
    fn render(&self) -> String {
        let mut line = format!("* {} FETCH (", self.seq);
        if let Some(uid) = self.uid {
            line.push_str(&format!("UID {} ", uid));
        }
        line.push_str(&format!("FLAGS ({})", self.flags.join(" ")));
        if let Some(thread_id) = self.thread_id {
            line.push_str(&format!(" X-GM-THRID {}", thread_id));
        }
        if let Some(message_id) = self.message_id {
            line.push_str(&format!(" X-GM-MSGID {}", message_id));
        }
        let labels: Vec<String> = self.labels.iter().map(|l| quote_imap_string(l)).collect();
        line.push_str(&format!(" X-GM-LABELS ({}))", labels.join(" ")));
        line
    }
}

fn raw_fetch(seq: u32, attributes: &[AttributeValue<'_>]) -> Option<RawFetch> {
    let mut fetch = FetchAttributes {
        seq,
        ..Default::default()
    };
    let mut body = None;

    for attr in attributes {
        match attr {
            AttributeValue::Uid(uid) => fetch.uid = Some(*uid),
            AttributeValue::Flags(flags) => fetch.flags = flags.iter().map(|f| f.to_string()).collect(),
            AttributeValue::GmailThrId(id) => fetch.thread_id = Some(*id),
            AttributeValue::GmailMsgId(id) => fetch.message_id = Some(*id),
            AttributeValue::GmailLabels(labels) => {
                fetch.labels = labels.iter().map(|l| l.to_string()).collect()
            }
            AttributeValue::BodySection { data: Some(data), .. } => body = Some(data.to_vec()),
            AttributeValue::Rfc822(Some(data)) => body = Some(data.to_vec()),
            _ => {}
        }
    }

    body.map(|rfc822| RawFetch::new(fetch.render(), rfc822))
}
