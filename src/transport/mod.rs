//! Chat transport abstraction.
//!
//! The bot core talks to the messaging service only through the
//! [`Transport`] trait: deliver and edit messages, send and fetch files,
//! and build deep links. The Telegram implementation lives in
//! [`telegram`]; tests use an in-memory implementation.

mod types;

pub mod telegram;

pub use types::{
    ChatInfo, Identity, InboundFile, InboundMessage, KeypadChange, MessageId, OutgoingMessage,
    ReplyTarget,
};

use std::path::Path;

use async_trait::async_trait;

use crate::Result;

/// Maximum length of a single outbound text message.
pub const MAX_MESSAGE_LEN: usize = 4000;

/// Outbound side of a messaging service.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a message to `chat` and return its identifier.
    async fn send(&self, chat: Identity, message: OutgoingMessage) -> Result<MessageId>;

    /// Replace the text of a message previously sent by the bot.
    async fn edit(
        &self,
        chat: Identity,
        message: MessageId,
        text: &str,
        link_previews: bool,
    ) -> Result<()>;

    /// Send a local file as a document.
    async fn send_file(
        &self,
        chat: Identity,
        path: &Path,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId>;

    /// Write an inbound file to `dest`, overwriting it. Returns the byte count.
    async fn download(&self, file: &InboundFile, dest: &Path) -> Result<u64>;

    /// Link that opens a chat with the bot, optionally carrying a start token.
    fn link(&self, token: Option<&str>) -> String;
}
