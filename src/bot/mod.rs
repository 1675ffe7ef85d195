//! The bot: routing, command dispatch and session plumbing.
//!
//! A single [`Bot`] owns every piece of mutable state (access control,
//! contexts, pending uploads) and processes [`Event`]s one at a time from
//! one queue. Inbound messages, process output, process exits and
//! finished file transfers all arrive through that queue, so a command
//! and the exit of the session it targets are never handled concurrently.

mod commands;
mod dispatcher;
mod files;
mod router;

pub use commands::{parse_bool, parse_env, parse_size, Command, EnvRequest, HELP_TEXT};
pub use files::{download_target, file_name, PendingUploads};
pub use router::{resolve, Route};

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::access::AccessController;
use crate::output::Frame;
use crate::pty::key_sequence;
use crate::session::{
    ContextDefaults, ContextStore, Session, SessionEvent, SessionEventKind,
};
use crate::transport::{
    Identity, InboundFile, InboundMessage, KeypadChange, MessageId, OutgoingMessage, Transport,
};
use crate::Result;

/// Capacity of the event queue.
pub const EVENT_QUEUE: usize = 256;

const ACCESS_DENIED: &str = "Access denied.";
const NO_COMMAND: &str = "No command is running.";

/// Everything the bot reacts to.
#[derive(Debug)]
pub enum Event {
    /// A new or edited chat message.
    Message(InboundMessage),
    /// Output or exit of a running command.
    Session(SessionEvent),
    /// A file requested with `/upload` was delivered as `message`.
    UploadSent {
        chat: Identity,
        message: MessageId,
        path: PathBuf,
    },
    /// A file sent in reply to `target` was written to `path`.
    DownloadFinished {
        chat: Identity,
        /// The message that carried the file.
        reply_to: MessageId,
        target: MessageId,
        path: PathBuf,
        result: Result<u64>,
    },
}

impl From<InboundMessage> for Event {
    fn from(msg: InboundMessage) -> Self {
        Event::Message(msg)
    }
}

impl From<SessionEvent> for Event {
    fn from(event: SessionEvent) -> Self {
        Event::Session(event)
    }
}

/// Sends replies into one chat, logging delivery failures.
#[derive(Clone)]
struct Reply {
    transport: Arc<dyn Transport>,
    chat: Identity,
}

impl Reply {
    async fn send(&self, message: OutgoingMessage) -> Option<MessageId> {
        match self.transport.send(self.chat, message).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(chat = %self.chat, error = %e, "failed to deliver reply");
                None
            }
        }
    }

    async fn text(&self, text: impl Into<String>) -> Option<MessageId> {
        self.send(OutgoingMessage::new(text)).await
    }

    async fn text_to(
        &self,
        reply_to: impl Into<Option<MessageId>>,
        text: impl Into<String>,
    ) -> Option<MessageId> {
        self.send(OutgoingMessage::new(text).reply_to(reply_to)).await
    }
}

/// The process-wide registry and event handler.
pub struct Bot {
    transport: Arc<dyn Transport>,
    access: AccessController,
    contexts: ContextStore,
    uploads: PendingUploads,
    events: mpsc::Sender<Event>,
    skip_queued: bool,
}

impl Bot {
    /// Create a bot for `owner` and the receiving end of its event queue.
    pub fn new(
        transport: Arc<dyn Transport>,
        owner: Identity,
        defaults: ContextDefaults,
    ) -> (Self, mpsc::Receiver<Event>) {
        let (events, rx) = mpsc::channel(EVENT_QUEUE);
        let bot = Self {
            transport,
            access: AccessController::new(owner),
            contexts: ContextStore::new(defaults),
            uploads: PendingUploads::new(),
            events,
            skip_queued: true,
        };
        (bot, rx)
    }

    /// Whether messages sent before startup are ignored (default: yes).
    pub fn skip_queued(mut self, skip: bool) -> Self {
        self.skip_queued = skip;
        self
    }

    /// Sender for feeding events into the queue.
    pub fn events(&self) -> mpsc::Sender<Event> {
        self.events.clone()
    }

    pub fn access(&self) -> &AccessController {
        &self.access
    }

    pub fn contexts(&self) -> &ContextStore {
        &self.contexts
    }

    pub fn uploads(&self) -> &PendingUploads {
        &self.uploads
    }

    /// Process events until the queue closes.
    pub async fn run(mut self, mut events: mpsc::Receiver<Event>) {
        info!(owner = %self.access.owner(), "bot started");
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        info!("event queue closed, bot stopped");
    }

    /// Handle a single event.
    pub async fn handle(&mut self, event: Event) {
        match event {
            Event::Message(msg) => self.handle_message(msg).await,
            Event::Session(event) => self.handle_session_event(event).await,
            Event::UploadSent {
                chat,
                message,
                path,
            } => {
                debug!(%chat, %message, path = %path.display(), "upload registered");
                self.uploads.register(chat, message, path);
            }
            Event::DownloadFinished {
                chat,
                reply_to,
                target,
                path,
                result,
            } => {
                let reply = self.reply(chat);
                match result {
                    Ok(bytes) => {
                        info!(%chat, path = %path.display(), bytes, "file written");
                        reply
                            .text_to(reply_to, format!("File written: {}", path.display()))
                            .await;
                    }
                    Err(e) => {
                        warn!(%chat, path = %path.display(), error = %e, "download failed");
                        self.uploads.discard(chat, target);
                        reply
                            .text_to(reply_to, format!("Couldn't write file: {}", e))
                            .await;
                    }
                }
            }
        }
    }

    fn reply(&self, chat: Identity) -> Reply {
        Reply {
            transport: self.transport.clone(),
            chat,
        }
    }

    async fn handle_message(&mut self, msg: InboundMessage) {
        if msg.queued && self.skip_queued {
            debug!(chat = %msg.chat.id, message = %msg.id, "skipping queued message");
            return;
        }

        let command = if msg.edited {
            None
        } else {
            msg.text.as_deref().and_then(Command::parse)
        };

        let (identity, redeemed) = match resolve(&self.access, &msg, command.as_ref()) {
            Route::Allowed { identity, redeemed } => (identity, redeemed),
            Route::Denied { notify } => {
                if notify {
                    self.reply(msg.chat.id).text(ACCESS_DENIED).await;
                }
                return;
            }
        };
        self.contexts.get_or_create(identity);

        if msg.edited {
            self.handle_edit(identity, &msg).await;
        } else if let Some(command) = command {
            self.dispatch(&msg, identity, command).await;
        } else if msg.reply_to.is_some_and(|target| target.from_bot) {
            self.handle_reply(identity, &msg).await;
        } else {
            self.handle_plain(identity, &msg).await;
        }

        if redeemed {
            self.notify_owner(&msg).await;
        }
    }

    /// Tell the owner that a chat redeemed a token.
    async fn notify_owner(&self, msg: &InboundMessage) {
        let kind = if msg.chat.is_user { "User" } else { "Chat" };
        let mut text = format!("{} {}", kind, msg.chat.name);
        if let Some(username) = &msg.chat.username {
            text.push_str(&format!(" (@{})", username));
        }
        text.push_str(&format!(
            " can now use the bot. To revoke, use:\n/revoke {}",
            msg.chat.id
        ));
        self.reply(self.access.owner()).text(text).await;
    }

    /// A reply to one of the bot's messages: a file download, editor
    /// content or terminal input.
    async fn handle_reply(&mut self, identity: Identity, msg: &InboundMessage) {
        let Some(target) = msg.reply_to else {
            return;
        };
        if let Some(file) = &msg.file {
            self.start_download(identity, msg, target.id, file.clone());
            return;
        }

        let reply = self.reply(msg.chat.id);
        let text = msg.text_or_empty();
        let ctx = self.contexts.get_or_create(identity);
        match &mut ctx.session {
            Some(Session::Editor(editor)) => {
                match editor.handle_reply(target.id, msg.id, text).await {
                    Ok(true) => {
                        let notice = format!("File written: {}", editor.path().display());
                        reply.text_to(msg.id, notice).await;
                    }
                    Ok(false) => debug!(%identity, "reply does not target the edited file"),
                    Err(e) => {
                        reply
                            .text_to(msg.id, format!("Couldn't write file: {}", e))
                            .await;
                    }
                }
            }
            Some(Session::Shell(shell)) => {
                if let Err(e) = shell.send_input(text, true) {
                    reply
                        .text_to(msg.id, format!("Couldn't send input: {}", e))
                        .await;
                }
            }
            None => {
                reply.text(NO_COMMAND).await;
            }
        }
    }

    /// An edited message only matters to the editor.
    async fn handle_edit(&mut self, identity: Identity, msg: &InboundMessage) {
        let reply = self.reply(msg.chat.id);
        let Some(editor) = self
            .contexts
            .get_mut(identity)
            .and_then(|ctx| ctx.editor_mut())
        else {
            return;
        };
        if let Err(e) = editor.handle_edit(msg.id, msg.text_or_empty()).await {
            reply
                .text_to(msg.id, format!("Couldn't write file: {}", e))
                .await;
        }
    }

    /// Plain text outside a reply: keypad buttons while the keypad shows.
    async fn handle_plain(&mut self, identity: Identity, msg: &InboundMessage) {
        let reply = self.reply(msg.chat.id);
        let Some(shell) = self
            .contexts
            .get_mut(identity)
            .and_then(|ctx| ctx.shell_session_mut())
            .filter(|shell| shell.keypad_visible())
        else {
            return;
        };
        let Some(sequence) = key_sequence(msg.text_or_empty()) else {
            return;
        };
        if let Err(e) = shell.send_raw(sequence) {
            reply
                .text_to(msg.id, format!("Couldn't send key: {}", e))
                .await;
        }
    }

    fn start_download(
        &mut self,
        identity: Identity,
        msg: &InboundMessage,
        target: MessageId,
        file: InboundFile,
    ) {
        let chat = msg.chat.id;
        let ctx = self.contexts.get_or_create(identity);
        let Some(path) = download_target(&self.uploads, ctx, chat, target, &file) else {
            debug!(%chat, %target, "file reply without a destination");
            return;
        };

        let transport = self.transport.clone();
        let events = self.events.clone();
        let reply_to = msg.id;
        tokio::spawn(async move {
            let result = transport.download(&file, &path).await;
            let event = Event::DownloadFinished {
                chat,
                reply_to,
                target,
                path,
                result,
            };
            if events.send(event).await.is_err() {
                debug!(%chat, "event queue closed before download report");
            }
        });
    }

    async fn handle_session_event(&mut self, event: SessionEvent) {
        let SessionEvent {
            identity,
            session,
            kind,
        } = event;
        let Some(ctx) = self.contexts.get_mut(identity) else {
            debug!(%identity, %session, "event for a discarded context");
            return;
        };

        match kind {
            SessionEventKind::Output(data) => {
                let silent = ctx.silent;
                let link_previews = ctx.link_previews;
                let Some(shell) = ctx
                    .shell_session_mut()
                    .filter(|shell| shell.id() == session)
                else {
                    debug!(%identity, %session, "output of a finished session");
                    return;
                };

                let chat = shell.chat();
                let thread = shell.initial_message();
                for frame in shell.frame_output(&data, silent) {
                    match frame {
                        Frame::Send(text) => {
                            let message = OutgoingMessage::new(text)
                                .reply_to(thread)
                                .link_previews(link_previews)
                                .silent(silent);
                            match self.transport.send(chat, message).await {
                                Ok(id) => shell.record_output_message(id),
                                Err(e) => warn!(%chat, error = %e, "failed to send output"),
                            }
                        }
                        Frame::Edit(id, text) => {
                            if let Err(e) =
                                self.transport.edit(chat, id, &text, link_previews).await
                            {
                                warn!(%chat, message = %id, error = %e, "failed to edit output");
                            }
                        }
                    }
                }
            }
            SessionEventKind::Exited(report) => {
                let Some(shell) = ctx.finish_shell(session) else {
                    debug!(%identity, %session, "exit of a finished session");
                    return;
                };
                let mut message =
                    OutgoingMessage::new(report.to_string()).reply_to(shell.initial_message());
                if shell.keypad_visible() {
                    message = message.keypad(KeypadChange::Hide);
                }
                self.reply(shell.chat()).send(message).await;
            }
        }
    }
}
