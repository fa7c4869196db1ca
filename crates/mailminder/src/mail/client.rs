//! IMAP client for reading a mailbox without modifying it.

use std::time::Duration;

use async_imap::Session;
use async_native_tls::TlsConnector;
use futures_util::StreamExt;
use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};

use crate::config::MailConfig;
use crate::error::ConfigError;

use super::error::{MailError, Result};

type AsyncTcpStream = async_io::Async<std::net::TcpStream>;
type TlsStream = async_native_tls::TlsStream<AsyncTcpStream>;

/// Connection settings with the password already resolved.
#[derive(Clone)]
pub struct ImapSettings {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub username: String,
    pub password: SecretString,
    pub folder: String,
    pub batch_size: usize,
    pub timeout: Duration,
}

impl std::fmt::Debug for ImapSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("folder", &self.folder)
            .finish_non_exhaustive()
    }
}

impl ImapSettings {
    pub fn from_config(config: &MailConfig) -> std::result::Result<Self, ConfigError> {
        config.require_connection_fields()?;
        let password = config
            .password_source()
            .resolve()
            .map_err(|source| ConfigError::Secret {
                name: "mail.password",
                source,
            })?;
        if config.password.is_some() {
            warn!("Using a direct mail password in the config file; prefer password_env_var or password_file");
        }

        Ok(Self {
            host: config.host.clone(),
            port: config.port,
            use_tls: config.use_tls,
            username: config.username.clone(),
            password,
            folder: config.folder.clone(),
            batch_size: config.batch_size,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

pub struct ImapClient {
    session: Option<Session<TlsStream>>,
    settings: ImapSettings,
}

impl ImapClient {
    pub fn new(settings: ImapSettings) -> Self {
        Self {
            session: None,
            settings,
        }
    }

    /// Connects over TLS and logs in with the configured password.
    pub async fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            debug!("Already connected to IMAP server");
            return Ok(());
        }

        if !self.settings.use_tls {
            return Err(MailError::ConfigError(
                "TLS is required for IMAP connections".to_string(),
            ));
        }

        let addr = format!("{}:{}", self.settings.host, self.settings.port);
        info!("Connecting to IMAP server at {}", addr);

        let std_stream = std::net::TcpStream::connect(&addr)
            .map_err(|e| MailError::ConnectionFailed(e.to_string()))?;
        std_stream
            .set_nonblocking(true)
            .map_err(|e| MailError::ConnectionFailed(e.to_string()))?;
        let tcp_stream = async_io::Async::new(std_stream)
            .map_err(|e| MailError::ConnectionFailed(e.to_string()))?;

        let tls_stream = TlsConnector::new()
            .connect(&self.settings.host, tcp_stream)
            .await?;

        let client = async_imap::Client::new(tls_stream);
        let session = client
            .login(
                &self.settings.username,
                self.settings.password.expose_secret(),
            )
            .await
            .map_err(|(e, _)| MailError::AuthenticationFailed(e.to_string()))?;

        info!("Authenticated to IMAP server as {}", self.settings.username);
        self.session = Some(session);
        Ok(())
    }

    fn session_mut(&mut self) -> Result<&mut Session<TlsStream>> {
        self.session
            .as_mut()
            .ok_or_else(|| MailError::ConnectionFailed("Not connected".to_string()))
    }

    /// Opens a folder read-only with EXAMINE, so nothing is marked as read.
    /// Returns the folder's UIDVALIDITY.
    pub async fn examine_folder(&mut self, folder: &str) -> Result<u32> {
        let session = self.session_mut()?;
        debug!("Examining folder: {}", folder);

        let mailbox = session.examine(folder).await.map_err(|e| {
            let text = e.to_string();
            if text.contains("Mailbox doesn't exist") || text.contains("NO") {
                MailError::FolderNotFound(folder.to_string())
            } else {
                MailError::ProtocolError(text)
            }
        })?;

        mailbox.uid_validity.ok_or_else(|| {
            MailError::ProtocolError("Server did not provide UIDVALIDITY".to_string())
        })
    }

    /// Returns the UIDs strictly greater than `last_uid`, ascending.
    pub async fn search_since_uid(&mut self, last_uid: u32) -> Result<Vec<u32>> {
        let session = self.session_mut()?;

        let query = format!("UID {}:*", last_uid.saturating_add(1));
        let uids = session
            .uid_search(&query)
            .await
            .map_err(|e| MailError::ProtocolError(e.to_string()))?;

        // `n:*` always matches the newest message, even when its UID is below n.
        let mut uids: Vec<u32> = uids.into_iter().filter(|uid| *uid > last_uid).collect();
        uids.sort_unstable();
        debug!("Found {} messages after UID {}", uids.len(), last_uid);
        Ok(uids)
    }

    /// Fetches full messages with BODY.PEEK[] so their flags are unchanged.
    pub async fn fetch_peek(&mut self, uids: &[u32]) -> Result<Vec<(u32, Vec<u8>)>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let uid_set = uids
            .iter()
            .map(|u| u.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let session = self.session_mut()?;

        let mut fetches = session
            .uid_fetch(&uid_set, "(UID BODY.PEEK[])")
            .await
            .map_err(|e| MailError::ProtocolError(e.to_string()))?;

        let mut results = Vec::with_capacity(uids.len());
        while let Some(fetch) = fetches.next().await {
            match fetch {
                Ok(fetch) => match (fetch.uid, fetch.body()) {
                    (Some(uid), Some(body)) => results.push((uid, body.to_vec())),
                    _ => warn!("Fetched message is missing UID or body"),
                },
                Err(e) => warn!("Error fetching message: {}", e),
            }
        }
        Ok(results)
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            session
                .logout()
                .await
                .map_err(|e| MailError::ProtocolError(e.to_string()))?;
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn settings(&self) -> &ImapSettings {
        &self.settings
    }
}

impl Drop for ImapClient {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!("ImapClient dropped without explicit disconnect");
        }
    }
}
