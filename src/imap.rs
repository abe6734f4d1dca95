//! IMAP over implicit TLS

use async_imap::types::Fetch;
use async_imap::Session;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use crate::config::MailboxConfig;
use crate::error::{Result, WatchError};
use crate::mailbox::{MailboxConnector, MailboxSession};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

type ImapStream = TlsStream<TcpStream>;

/// Opens authenticated IMAP sessions with the configured folder selected
pub struct ImapConnector {
    host: String,
    port: u16,
    username: String,
    password: String,
    folder: String,
    tls: TlsConnector,
}

impl ImapConnector {
    pub fn new(config: &MailboxConfig) -> Self {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Self {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            password: config.password.clone(),
            folder: config.folder.clone(),
            tls: TlsConnector::from(Arc::new(tls_config)),
        }
    }

    async fn open_stream(&self) -> Result<ImapStream> {
        let addr = format!("{}:{}", self.host, self.port);

        let tcp = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
            .await
            .map_err(|_| WatchError::Connection(format!("TCP connect to {} timed out", addr)))?
            .map_err(|e| WatchError::Connection(format!("TCP connect to {} failed: {}", addr, e)))?;

        let server_name = ServerName::try_from(self.host.clone())
            .map_err(|e| WatchError::Connection(format!("invalid host {}: {}", self.host, e)))?;

        debug!("TCP connected to {}, starting TLS handshake", addr);
        self.tls
            .connect(server_name, tcp)
            .await
            .map_err(|e| WatchError::Connection(format!("TLS handshake with {} failed: {}", self.host, e)))
    }
}

#[async_trait]
impl MailboxConnector for ImapConnector {
    async fn connect(&self) -> Result<Box<dyn MailboxSession>> {
        let stream = self.open_stream().await?;
        let client = async_imap::Client::new(stream);

        let mut session = client
            .login(&self.username, &self.password)
            .await
            .map_err(|(e, _)| match e {
                async_imap::error::Error::No(msg) | async_imap::error::Error::Bad(msg) => {
                    WatchError::Authentication(format!("{} rejected: {}", self.username, msg))
                }
                other => WatchError::from(other),
            })?;

        session.select(&self.folder).await?;
        info!("IMAP session established for {} ({})", self.username, self.folder);

        Ok(Box::new(ImapSession { session }))
    }

    fn describe(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

/// Live session. Ids are UIDs so they stay valid across reconnects.
pub struct ImapSession {
    session: Session<ImapStream>,
}

#[async_trait]
impl MailboxSession for ImapSession {
    async fn search(&mut self, query: &str) -> Result<Vec<u32>> {
        let mut uids: Vec<u32> = self.session.uid_search(query).await?.into_iter().collect();
        uids.sort_unstable();
        debug!("Search {:?} matched {} messages", query, uids.len());
        Ok(uids)
    }

    async fn fetch(&mut self, uid: u32) -> Result<Option<Vec<u8>>> {
        let fetches: Vec<Fetch> = self
            .session
            .uid_fetch(uid.to_string(), "(UID BODY.PEEK[])")
            .await?
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<std::result::Result<_, _>>()?;

        let body = fetches
            .iter()
            .find(|f| f.uid == Some(uid))
            .or_else(|| fetches.first())
            .and_then(|f| f.body())
            .map(<[u8]>::to_vec);
        Ok(body)
    }

    async fn mark_seen(&mut self, uid: u32) -> Result<()> {
        let responses = self
            .session
            .uid_store(uid.to_string(), "+FLAGS (\\Seen)")
            .await?
            .collect::<Vec<_>>()
            .await;

        for response in responses {
            response?;
        }
        Ok(())
    }

    async fn noop(&mut self) -> Result<()> {
        self.session.noop().await?;
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        self.session.logout().await?;
        Ok(())
    }
}
