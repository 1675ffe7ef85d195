//! Telegram transport built on teloxide long polling.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, FileId, InputFile, KeyboardButton, KeyboardMarkup, KeyboardRemove,
    LinkPreviewOptions, Message, MessageId as TgMessageId, ReplyMarkup, ReplyParameters,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
    ChatInfo, Identity, InboundFile, InboundMessage, KeypadChange, MessageId, OutgoingMessage,
    ReplyTarget, Transport,
};
use crate::error::ShellBotError;
use crate::Result;

type HandlerResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Telegram Bot API client.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: teloxide::Bot,
    me: Identity,
    username: String,
    started: i64,
}

impl TelegramTransport {
    /// Authenticate with `token` and fetch the bot's own account.
    pub async fn connect(token: &str) -> Result<Self> {
        let bot = teloxide::Bot::new(token);
        let me = bot.get_me().await.map_err(transport_error)?;
        let username = me.user.username.clone().unwrap_or_default();
        info!(bot = %username, "connected to Telegram");

        Ok(Self {
            bot,
            me: Identity(me.user.id.0 as i64),
            username,
            started: unix_now(),
        })
    }

    /// Bot account name, without the `@`.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Poll for updates and forward new and edited messages into `events`
    /// until the process is interrupted.
    pub async fn listen<E>(&self, events: mpsc::Sender<E>)
    where
        E: From<InboundMessage> + Send + 'static,
    {
        let me = self.me;
        let started = self.started;
        let edits = events.clone();

        let handler = dptree::entry()
            .branch(Update::filter_message().endpoint(move |msg: Message| {
                let events = events.clone();
                async move {
                    forward(convert(&msg, me, started, false), &events).await;
                    HandlerResult::Ok(())
                }
            }))
            .branch(
                Update::filter_edited_message().endpoint(move |msg: Message| {
                    let events = edits.clone();
                    async move {
                        forward(convert(&msg, me, started, true), &events).await;
                        HandlerResult::Ok(())
                    }
                }),
            );

        Dispatcher::builder(self.bot.clone(), handler)
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
        info!("stopped polling for updates");
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send(&self, chat: Identity, message: OutgoingMessage) -> Result<MessageId> {
        let mut request = self
            .bot
            .send_message(ChatId(chat.0), message.text)
            .link_preview_options(preview_options(message.link_previews))
            .disable_notification(message.silent);
        if let Some(id) = message.reply_to {
            request = request.reply_parameters(ReplyParameters::new(tg_message(id)));
        }
        match message.keypad {
            KeypadChange::Unchanged => {}
            KeypadChange::Show(rows) => {
                let keyboard = KeyboardMarkup::new(
                    rows.into_iter()
                        .map(|row| row.into_iter().map(KeyboardButton::new).collect::<Vec<_>>()),
                )
                .resize_keyboard();
                request = request.reply_markup(ReplyMarkup::Keyboard(keyboard));
            }
            KeypadChange::Hide => {
                request = request.reply_markup(ReplyMarkup::KeyboardRemove(KeyboardRemove::new()));
            }
        }

        let sent = request.await.map_err(transport_error)?;
        Ok(MessageId(i64::from(sent.id.0)))
    }

    async fn edit(
        &self,
        chat: Identity,
        message: MessageId,
        text: &str,
        link_previews: bool,
    ) -> Result<()> {
        self.bot
            .edit_message_text(ChatId(chat.0), tg_message(message), text)
            .link_preview_options(preview_options(link_previews))
            .await
            .map_err(transport_error)?;
        Ok(())
    }

    async fn send_file(
        &self,
        chat: Identity,
        path: &Path,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        let mut request = self
            .bot
            .send_document(ChatId(chat.0), InputFile::file(path.to_path_buf()));
        if let Some(id) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(tg_message(id)));
        }
        let sent = request.await.map_err(transport_error)?;
        Ok(MessageId(i64::from(sent.id.0)))
    }

    async fn download(&self, file: &InboundFile, dest: &Path) -> Result<u64> {
        let remote = self
            .bot
            .get_file(FileId(file.id.clone()))
            .await
            .map_err(transport_error)?;
        let mut out = tokio::fs::File::create(dest).await?;
        self.bot
            .download_file(&remote.path, &mut out)
            .await
            .map_err(transport_error)?;
        let written = tokio::fs::metadata(dest).await?.len();
        debug!(path = %dest.display(), bytes = written, "downloaded file");
        Ok(written)
    }

    fn link(&self, token: Option<&str>) -> String {
        match token {
            Some(token) => format!("https://t.me/{}?start={}", self.username, token),
            None => format!("https://t.me/{}", self.username),
        }
    }
}

async fn forward<E: From<InboundMessage>>(msg: InboundMessage, events: &mpsc::Sender<E>) {
    if events.send(E::from(msg)).await.is_err() {
        warn!("event queue closed, dropping inbound message");
    }
}

fn convert(msg: &Message, me: Identity, started: i64, edited: bool) -> InboundMessage {
    let chat = &msg.chat;
    let name = match chat.title() {
        Some(title) => title.to_string(),
        None => [chat.first_name(), chat.last_name()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" "),
    };

    let reply_to = msg.reply_to_message().map(|target| ReplyTarget {
        id: MessageId(i64::from(target.id.0)),
        from_bot: target
            .from
            .as_ref()
            .is_some_and(|user| Identity(user.id.0 as i64) == me),
    });
    let file = msg.document().map(|doc| InboundFile {
        id: doc.file.id.0.clone(),
        name: doc.file_name.clone(),
    });

    InboundMessage {
        id: MessageId(i64::from(msg.id.0)),
        chat: ChatInfo {
            id: Identity(chat.id.0),
            name,
            username: chat.username().map(str::to_string),
            is_user: chat.is_private(),
        },
        sender: msg.from.as_ref().map(|user| Identity(user.id.0 as i64)),
        text: msg.text().or_else(|| msg.caption()).map(str::to_string),
        reply_to,
        file,
        edited,
        queued: !edited && msg.date.timestamp() < started,
    }
}

fn preview_options(enabled: bool) -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: !enabled,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}

fn tg_message(id: MessageId) -> TgMessageId {
    TgMessageId(id.0 as i32)
}

fn transport_error(e: impl std::fmt::Display) -> ShellBotError {
    ShellBotError::Transport(e.to_string())
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_options() {
        assert!(preview_options(false).is_disabled);
        assert!(!preview_options(true).is_disabled);
    }

    #[test]
    fn test_message_id_conversion() {
        assert_eq!(tg_message(MessageId(42)), TgMessageId(42));
    }

    #[test]
    fn test_transport_error_message() {
        let err = transport_error("Bad Request: message is not modified");
        assert!(matches!(err, ShellBotError::Transport(_)));
        assert!(err.to_string().contains("not modified"));
    }
}
