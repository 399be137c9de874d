#![allow(dead_code)]
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use mailvault::domain::entities::MailAccount;
use mailvault::domain::errors::{DomainError, DomainResult};
use mailvault::domain::ports::{MailSession, MailTransport, MessageContent, MessageRef};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

type FetchHook = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone)]
pub struct FakeMessage {
    pub uid: u32,
    pub message_id: Option<String>,
    pub internal_date: DateTime<Utc>,
    pub raw: Vec<u8>,
}

#[derive(Default)]
struct Mailbox {
    folders: Vec<(String, Vec<FakeMessage>)>,
    fail_open: bool,
    failing_folders: HashSet<String>,
    rejecting_folders: HashSet<String>,
    delivered: Vec<(String, Vec<u8>)>,
    opens: usize,
    closes: usize,
    body_fetches: usize,
    fetch_hook: Option<FetchHook>,
}

/// In-memory IMAP server stand-in with failure injection
#[derive(Clone, Default)]
pub struct FakeTransport {
    mailbox: Arc<Mutex<Mailbox>>,
}

pub fn received_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 30, 10, 0, 0).unwrap()
}

/// A small RFC 5322 message; `message_id` None leaves the header out.
pub fn raw_message(message_id: Option<&str>, subject: &str) -> Vec<u8> {
    let mut raw = String::new();
    if let Some(id) = message_id {
        raw.push_str(&format!("Message-ID: <{}>\r\n", id));
    }
    raw.push_str("From: Alice Example <alice@example.com>\r\n");
    raw.push_str("To: bob@example.com\r\n");
    raw.push_str(&format!("Subject: {}\r\n", subject));
    raw.push_str("Date: Mon, 30 Sep 2024 10:00:00 +0000\r\n");
    raw.push_str("\r\n");
    raw.push_str(&format!("Body of {}\r\n", subject));
    raw.into_bytes()
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a folder holding `count` messages with distinct Message-IDs.
    pub fn with_folder(self, name: &str, count: u32) -> Self {
        let messages = (1..=count)
            .map(|uid| {
                let id = format!("{}-{}@example.com", name.to_lowercase(), uid);
                FakeMessage {
                    uid,
                    message_id: Some(id.clone()),
                    internal_date: received_at(),
                    raw: raw_message(Some(&id), &format!("{} message {}", name, uid)),
                }
            })
            .collect();
        self.with_messages(name, messages)
    }

    pub fn with_messages(self, name: &str, messages: Vec<FakeMessage>) -> Self {
        self.mailbox
            .lock()
            .unwrap()
            .folders
            .push((name.to_string(), messages));
        self
    }

    pub fn fail_open(&self) {
        self.mailbox.lock().unwrap().fail_open = true;
    }

    pub fn fail_folder(&self, name: &str) {
        self.mailbox
            .lock()
            .unwrap()
            .failing_folders
            .insert(name.to_string());
    }

    pub fn reject_deliveries_to(&self, name: &str) {
        self.mailbox
            .lock()
            .unwrap()
            .rejecting_folders
            .insert(name.to_string());
    }

    /// Run `hook` whenever a folder's message list is fetched.
    pub fn on_fetch(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        self.mailbox.lock().unwrap().fetch_hook = Some(Arc::new(hook));
    }

    pub fn delivered(&self) -> Vec<(String, Vec<u8>)> {
        self.mailbox.lock().unwrap().delivered.clone()
    }

    pub fn opens(&self) -> usize {
        self.mailbox.lock().unwrap().opens
    }

    pub fn closes(&self) -> usize {
        self.mailbox.lock().unwrap().closes
    }

    pub fn body_fetches(&self) -> usize {
        self.mailbox.lock().unwrap().body_fetches
    }
}

#[async_trait]
impl MailTransport for FakeTransport {
    async fn open(&self, _account: &MailAccount) -> DomainResult<Box<dyn MailSession>> {
        let mut mailbox = self.mailbox.lock().unwrap();
        if mailbox.fail_open {
            return Err(DomainError::Connection(
                "authentication failed".to_string(),
            ));
        }
        mailbox.opens += 1;
        Ok(Box::new(FakeSession {
            mailbox: self.mailbox.clone(),
        }))
    }
}

struct FakeSession {
    mailbox: Arc<Mutex<Mailbox>>,
}

#[async_trait]
impl MailSession for FakeSession {
    async fn list_folders(&mut self) -> DomainResult<Vec<String>> {
        let mailbox = self.mailbox.lock().unwrap();
        Ok(mailbox.folders.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn fetch_since(
        &mut self,
        folder: &str,
        since: Option<DateTime<Utc>>,
    ) -> DomainResult<Vec<MessageRef>> {
        let hook = self.mailbox.lock().unwrap().fetch_hook.clone();
        if let Some(hook) = hook {
            hook(folder);
        }

        let mailbox = self.mailbox.lock().unwrap();
        if mailbox.failing_folders.contains(folder) {
            return Err(DomainError::Transient(format!(
                "SELECT {} timed out",
                folder
            )));
        }
        let messages = mailbox
            .folders
            .iter()
            .find(|(name, _)| name == folder)
            .map(|(_, messages)| messages.clone())
            .unwrap_or_default();

        Ok(messages
            .into_iter()
            .filter(|m| since.map_or(true, |since| m.internal_date >= since))
            .map(|m| MessageRef {
                folder: folder.to_string(),
                uid: m.uid,
                message_id: m.message_id,
                internal_date: Some(m.internal_date),
            })
            .collect())
    }

    async fn fetch_body(&mut self, message: &MessageRef) -> DomainResult<MessageContent> {
        let mut mailbox = self.mailbox.lock().unwrap();
        mailbox.body_fetches += 1;
        mailbox
            .folders
            .iter()
            .find(|(name, _)| name == &message.folder)
            .and_then(|(_, messages)| messages.iter().find(|m| m.uid == message.uid))
            .map(|m| MessageContent::new(m.raw.clone()))
            .ok_or_else(|| DomainError::Transient(format!("UID {} vanished", message.uid)))
    }

    async fn deliver(&mut self, folder: &str, content: &MessageContent) -> DomainResult<()> {
        let mut mailbox = self.mailbox.lock().unwrap();
        if mailbox.rejecting_folders.contains(folder) {
            return Err(DomainError::Transient(format!(
                "APPEND to {} rejected",
                folder
            )));
        }
        mailbox
            .delivered
            .push((folder.to_string(), content.raw.clone()));
        Ok(())
    }

    async fn close(&mut self) -> DomainResult<()> {
        self.mailbox.lock().unwrap().closes += 1;
        Ok(())
    }
}
