//! Shared helpers for driving a [`Bot`] without a network.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use shell_bot::session::SessionEventKind;
use shell_bot::transport::{ChatInfo, InboundFile, KeypadChange};
use shell_bot::{
    Bot, ContextDefaults, Event, Identity, InboundMessage, MessageId, OutgoingMessage, Result,
    SessionEvent, ShellBotError, Transport,
};

pub const OWNER: Identity = Identity(1);

/// Upper bound for waiting on process events.
const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Something the bot did through the transport.
#[derive(Debug, Clone)]
pub enum Outbound {
    Sent {
        chat: Identity,
        id: MessageId,
        message: OutgoingMessage,
    },
    Edited {
        chat: Identity,
        id: MessageId,
        text: String,
    },
    File {
        chat: Identity,
        id: MessageId,
        path: PathBuf,
    },
}

/// In-memory transport that records every request.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    next_id: AtomicI64,
    log: Mutex<Vec<Outbound>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    fail_sends: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1000),
            ..Self::default()
        }
    }

    /// Make later `send` calls fail.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Content served for an inbound file id.
    pub fn add_file(&self, id: &str, content: &[u8]) {
        self.files.lock().unwrap().insert(id.to_string(), content.to_vec());
    }

    pub fn log(&self) -> Vec<Outbound> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }

    /// Messages sent to `chat`, in order.
    pub fn sent(&self, chat: Identity) -> Vec<(MessageId, OutgoingMessage)> {
        self.log()
            .into_iter()
            .filter_map(|entry| match entry {
                Outbound::Sent {
                    chat: to,
                    id,
                    message,
                } if to == chat => Some((id, message)),
                _ => None,
            })
            .collect()
    }

    /// Texts of the messages sent to `chat`.
    pub fn texts(&self, chat: Identity) -> Vec<String> {
        self.sent(chat).into_iter().map(|(_, m)| m.text).collect()
    }

    pub fn last_text(&self, chat: Identity) -> Option<String> {
        self.texts(chat).pop()
    }

    /// Edits made in `chat`.
    pub fn edits(&self, chat: Identity) -> Vec<(MessageId, String)> {
        self.log()
            .into_iter()
            .filter_map(|entry| match entry {
                Outbound::Edited { chat: to, id, text } if to == chat => Some((id, text)),
                _ => None,
            })
            .collect()
    }

    /// Files sent to `chat`.
    pub fn files_sent(&self, chat: Identity) -> Vec<(MessageId, PathBuf)> {
        self.log()
            .into_iter()
            .filter_map(|entry| match entry {
                Outbound::File { chat: to, id, path } if to == chat => Some((id, path)),
                _ => None,
            })
            .collect()
    }

    fn next_id(&self) -> MessageId {
        MessageId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, chat: Identity, message: OutgoingMessage) -> Result<MessageId> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ShellBotError::Transport("send rejected".into()));
        }
        let id = self.next_id();
        self.log
            .lock()
            .unwrap()
            .push(Outbound::Sent { chat, id, message });
        Ok(id)
    }

    async fn edit(
        &self,
        chat: Identity,
        message: MessageId,
        text: &str,
        _link_previews: bool,
    ) -> Result<()> {
        self.log.lock().unwrap().push(Outbound::Edited {
            chat,
            id: message,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_file(
        &self,
        chat: Identity,
        path: &Path,
        _reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        tokio::fs::metadata(path).await?;
        let id = self.next_id();
        self.log.lock().unwrap().push(Outbound::File {
            chat,
            id,
            path: path.to_path_buf(),
        });
        Ok(id)
    }

    async fn download(&self, file: &InboundFile, dest: &Path) -> Result<u64> {
        let content = self
            .files
            .lock()
            .unwrap()
            .get(&file.id)
            .cloned()
            .ok_or_else(|| ShellBotError::Transport("file not found".into()))?;
        tokio::fs::write(dest, &content).await?;
        Ok(content.len() as u64)
    }

    fn link(&self, token: Option<&str>) -> String {
        format!("https://t.me/test_bot?start={}", token.unwrap_or_default())
    }
}

/// A bot wired to a [`MemoryTransport`], driven one event at a time.
pub struct Harness {
    pub bot: Bot,
    pub rx: mpsc::Receiver<Event>,
    pub transport: Arc<MemoryTransport>,
    next_message: i64,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_defaults(ContextDefaults::for_tests())
    }

    pub fn with_defaults(defaults: ContextDefaults) -> Self {
        let transport = Arc::new(MemoryTransport::new());
        let (bot, rx) = Bot::new(transport.clone(), OWNER, defaults);
        Self {
            bot,
            rx,
            transport,
            next_message: 1,
        }
    }

    /// Build a message from `chat` with a fresh id.
    pub fn message(&mut self, chat: &ChatInfo, text: &str) -> InboundMessage {
        self.next_message += 1;
        InboundMessage::text(self.next_message, chat.clone(), text)
    }

    /// Deliver a message and return its id.
    pub async fn deliver(&mut self, msg: InboundMessage) -> MessageId {
        let id = msg.id;
        self.bot.handle(Event::Message(msg)).await;
        id
    }

    /// Deliver a text message from `chat`.
    pub async fn say(&mut self, chat: &ChatInfo, text: &str) -> MessageId {
        let msg = self.message(chat, text);
        self.deliver(msg).await
    }

    /// Handle queued events until one matches `done`. Returns the number
    /// of output events handled on the way.
    pub async fn pump_until(&mut self, done: impl Fn(&Event) -> bool) -> usize {
        let mut outputs = 0;
        loop {
            let event = tokio::time::timeout(EVENT_TIMEOUT, self.rx.recv())
                .await
                .expect("timed out waiting for an event")
                .expect("event queue closed");
            if is_output(&event) {
                outputs += 1;
            }
            let finished = done(&event);
            self.bot.handle(event).await;
            if finished {
                return outputs;
            }
        }
    }

    /// Handle events until the running command exits.
    pub async fn pump_until_exit(&mut self) -> usize {
        self.pump_until(is_exit).await
    }

    /// Handle events until at least one output event arrived.
    pub async fn pump_output(&mut self) {
        self.pump_until(is_output).await;
    }

    /// Handle events until an output chunk contains `needle`.
    pub async fn pump_until_output(&mut self, needle: &str) {
        self.pump_until(|event| output_contains(event, needle)).await;
    }

    /// Everything published in `chat`: sent texts followed by edits.
    pub fn published(&self, chat: Identity) -> String {
        self.transport
            .texts(chat)
            .into_iter()
            .chain(self.transport.edits(chat).into_iter().map(|(_, text)| text))
            .collect()
    }
}

pub fn output_contains(event: &Event, needle: &str) -> bool {
    match event {
        Event::Session(SessionEvent {
            kind: SessionEventKind::Output(data),
            ..
        }) => String::from_utf8_lossy(data).contains(needle),
        _ => false,
    }
}

pub fn is_output(event: &Event) -> bool {
    matches!(
        event,
        Event::Session(SessionEvent {
            kind: SessionEventKind::Output(_),
            ..
        })
    )
}

pub fn is_exit(event: &Event) -> bool {
    matches!(
        event,
        Event::Session(SessionEvent {
            kind: SessionEventKind::Exited(_),
            ..
        })
    )
}

pub fn owner_chat() -> ChatInfo {
    ChatInfo::user(OWNER.0, "Owner")
}

pub fn keypad_hidden(message: &OutgoingMessage) -> bool {
    message.keypad == KeypadChange::Hide
}
