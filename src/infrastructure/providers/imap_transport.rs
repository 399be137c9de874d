/// IMAP Mail Transport
///
/// `MailTransport` implementation over async-imap. TLS sessions go through
/// async-native-tls; plain sessions are accepted for local servers.
use crate::domain::entities::MailAccount;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{MailSession, MailTransport, MessageContent, MessageRef};
use crate::domain::services::fingerprint;
use async_imap::types::NameAttribute;
use async_imap::Session;
use async_native_tls::TlsConnector;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::io::{AsyncRead, AsyncWrite};
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncReadCompatExt;

#[derive(Debug, Clone, Copy, Default)]
pub struct ImapTransport;

impl ImapTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MailTransport for ImapTransport {
    async fn open(&self, account: &MailAccount) -> DomainResult<Box<dyn MailSession>> {
        // Connect to IMAP server
        let addr = format!("{}:{}", account.host, account.port);
        let tcp_stream = TcpStream::connect(&addr).await.map_err(|e| {
            DomainError::Connection(format!("Failed to connect to IMAP server {}: {}", addr, e))
        })?;

        // Convert tokio stream to futures compat
        let tcp_stream = tcp_stream.compat();

        if account.use_tls {
            let tls_stream = TlsConnector::new()
                .connect(&account.host, tcp_stream)
                .await
                .map_err(|e| {
                    DomainError::Connection(format!("Failed to establish TLS connection: {}", e))
                })?;
            let session = login(async_imap::Client::new(tls_stream), account).await?;
            Ok(Box::new(ImapSession { session }))
        } else {
            tracing::warn!(account_id = %account.id, "Opening unencrypted IMAP session");
            let session = login(async_imap::Client::new(tcp_stream), account).await?;
            Ok(Box::new(ImapSession { session }))
        }
    }
}

async fn login<T>(client: async_imap::Client<T>, account: &MailAccount) -> DomainResult<Session<T>>
where
    T: AsyncRead + AsyncWrite + Unpin + std::fmt::Debug + Send,
{
    client
        .login(&account.username, &account.password)
        .await
        .map_err(|(e, _)| {
            DomainError::Connection(format!("Failed to authenticate with IMAP server: {:?}", e))
        })
}

/// Most UIDs sent in one `UID FETCH`, counting each `a:b` range once
const UID_SET_CHUNK: usize = 500;

/// IMAP `SEARCH SINCE` compares calendar days in the server's timezone, so
/// the search starts a full day before the watermark. Messages seen on the
/// previous pass are filtered by fingerprint.
fn search_query(since: Option<DateTime<Utc>>) -> String {
    match since {
        Some(since) => format!("SINCE {}", (since - Duration::days(1)).format("%d-%b-%Y")),
        None => "ALL".to_string(),
    }
}

/// Sorted UIDs as `UID FETCH` sets: consecutive runs collapse to `a:b` and
/// each set holds at most `UID_SET_CHUNK` entries.
fn uid_sets(uids: &[u32]) -> Vec<String> {
    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for &uid in uids {
        match ranges.last_mut() {
            Some((_, end)) if end.checked_add(1) == Some(uid) => *end = uid,
            Some((_, end)) if *end == uid => {}
            _ => ranges.push((uid, uid)),
        }
    }
    ranges
        .chunks(UID_SET_CHUNK)
        .map(|chunk| {
            chunk
                .iter()
                .map(|&(start, end)| {
                    if start == end {
                        start.to_string()
                    } else {
                        format!("{}:{}", start, end)
                    }
                })
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect()
}

/// The parts of an envelope FETCH response the engine needs
struct EnvelopeRow {
    uid: Option<u32>,
    message_id: Option<String>,
    internal_date: Option<DateTime<Utc>>,
}

/// Turn envelope responses into message refs. A failed or UID-less response
/// fails the whole folder so the watermark cannot move past it.
fn collect_refs(
    folder: &str,
    rows: impl IntoIterator<Item = Result<EnvelopeRow, String>>,
) -> DomainResult<Vec<MessageRef>> {
    let mut refs = Vec::new();
    for row in rows {
        let row = row.map_err(|e| {
            DomainError::Transient(format!("Failed to fetch envelope in {}: {}", folder, e))
        })?;
        let uid = row.uid.ok_or_else(|| {
            DomainError::Transient(format!("Envelope without UID in {}", folder))
        })?;
        refs.push(MessageRef {
            folder: folder.to_string(),
            uid,
            message_id: row.message_id,
            internal_date: row.internal_date,
        });
    }
    refs.sort_by_key(|r| r.uid);
    Ok(refs)
}

struct ImapSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + std::fmt::Debug + Send,
{
    session: Session<T>,
}

#[async_trait]
impl<T> MailSession for ImapSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + std::fmt::Debug + Send,
{
    async fn list_folders(&mut self) -> DomainResult<Vec<String>> {
        let mut names = self
            .session
            .list(Some(""), Some("*"))
            .await
            .map_err(|e| DomainError::Transient(format!("Failed to list folders: {:?}", e)))?;

        let mut folders = Vec::new();
        while let Some(result) = names.next().await {
            let name =
                result.map_err(|e| DomainError::Transient(format!("Bad LIST response: {:?}", e)))?;
            let selectable = !name
                .attributes()
                .iter()
                .any(|attr| matches!(attr, NameAttribute::NoSelect));
            if selectable {
                folders.push(name.name().to_string());
            }
        }
        Ok(folders)
    }

    async fn fetch_since(
        &mut self,
        folder: &str,
        since: Option<DateTime<Utc>>,
    ) -> DomainResult<Vec<MessageRef>> {
        self.session
            .select(folder)
            .await
            .map_err(|e| DomainError::Transient(format!("Failed to select {}: {:?}", folder, e)))?;

        let uids = self
            .session
            .uid_search(search_query(since))
            .await
            .map_err(|e| DomainError::Transient(format!("Failed to search {}: {:?}", folder, e)))?;

        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let mut uids: Vec<u32> = uids.into_iter().collect();
        uids.sort_unstable();

        let mut rows = Vec::with_capacity(uids.len());
        for set in uid_sets(&uids) {
            let mut fetches = self
                .session
                .uid_fetch(set, "(UID ENVELOPE INTERNALDATE)")
                .await
                .map_err(|e| {
                    DomainError::Transient(format!("Failed to fetch envelopes: {:?}", e))
                })?;

            while let Some(result) = fetches.next().await {
                rows.push(result.map_err(|e| format!("{:?}", e)).map(|fetch| EnvelopeRow {
                    uid: fetch.uid,
                    message_id: fetch
                        .envelope()
                        .and_then(|envelope| envelope.message_id.as_ref())
                        .map(|id| String::from_utf8_lossy(id).to_string())
                        .and_then(|id| fingerprint::normalize_message_id(&id)),
                    internal_date: fetch.internal_date().map(|d| d.with_timezone(&Utc)),
                }));
            }
        }

        collect_refs(folder, rows)
    }

    async fn fetch_body(&mut self, message: &MessageRef) -> DomainResult<MessageContent> {
        let mut fetches = self
            .session
            .uid_fetch(message.uid.to_string(), "BODY.PEEK[]")
            .await
            .map_err(|e| {
                DomainError::Transient(format!("Failed to fetch UID {}: {:?}", message.uid, e))
            })?;

        let mut body = None;
        while let Some(result) = fetches.next().await {
            match result {
                Ok(fetch) => {
                    if let Some(bytes) = fetch.body() {
                        body = Some(bytes.to_vec());
                    }
                }
                Err(e) => {
                    tracing::warn!(uid = message.uid, "Failed to fetch body: {:?}", e);
                }
            }
        }

        body.map(MessageContent::new).ok_or_else(|| {
            DomainError::Transient(format!(
                "Server returned no body for UID {} in {}",
                message.uid, message.folder
            ))
        })
    }

    async fn deliver(&mut self, folder: &str, content: &MessageContent) -> DomainResult<()> {
        self.session
            .append(folder, &content.raw)
            .await
            .map_err(|e| DomainError::Transient(format!("Failed to append to {}: {:?}", folder, e)))
    }

    async fn close(&mut self) -> DomainResult<()> {
        self.session
            .logout()
            .await
            .map_err(|e| DomainError::Transient(format!("Logout failed: {:?}", e)))
    }
}
