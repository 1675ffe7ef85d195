//! Message types exchanged with the chat transport.

use std::fmt;
use std::str::FromStr;

/// Routing key for a chat or a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(pub i64);

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Identity {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Identity)
    }
}

/// Identifier of a message within a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chat an inbound message was posted in.
#[derive(Debug, Clone)]
pub struct ChatInfo {
    pub id: Identity,
    /// Display name (title for groups, full name for users).
    pub name: String,
    pub username: Option<String>,
    /// Whether this is a private chat with a user.
    pub is_user: bool,
}

impl ChatInfo {
    /// Private chat with the given user id.
    pub fn user(id: i64, name: impl Into<String>) -> Self {
        Self {
            id: Identity(id),
            name: name.into(),
            username: None,
            is_user: true,
        }
    }

    /// Group chat with the given id.
    pub fn group(id: i64, title: impl Into<String>) -> Self {
        Self {
            id: Identity(id),
            name: title.into(),
            username: None,
            is_user: false,
        }
    }
}

/// The message an inbound message replies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyTarget {
    pub id: MessageId,
    /// Whether the target was sent by the bot itself.
    pub from_bot: bool,
}

/// A file attached to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFile {
    /// Transport-specific file identifier.
    pub id: String,
    /// Declared file name, if any.
    pub name: Option<String>,
}

/// A message received from the transport.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: MessageId,
    pub chat: ChatInfo,
    /// The user who sent the message, when known.
    pub sender: Option<Identity>,
    /// Text or caption.
    pub text: Option<String>,
    pub reply_to: Option<ReplyTarget>,
    pub file: Option<InboundFile>,
    /// The message is an edit of an earlier message.
    pub edited: bool,
    /// The message was sent before the bot started.
    pub queued: bool,
}

impl InboundMessage {
    /// Plain text message in `chat`, sent by the chat itself.
    pub fn text(id: i64, chat: ChatInfo, text: impl Into<String>) -> Self {
        let sender = Some(chat.id);
        Self {
            id: MessageId(id),
            chat,
            sender,
            text: Some(text.into()),
            reply_to: None,
            file: None,
            edited: false,
            queued: false,
        }
    }

    /// Set the sender identity.
    pub fn from_sender(mut self, sender: Identity) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Mark this message as a reply to one of the bot's messages.
    pub fn replying_to(mut self, id: MessageId) -> Self {
        self.reply_to = Some(ReplyTarget { id, from_bot: true });
        self
    }

    /// Attach a file.
    pub fn with_file(mut self, file: InboundFile) -> Self {
        self.file = Some(file);
        self
    }

    /// Mark this message as edited.
    pub fn edited(mut self) -> Self {
        self.edited = true;
        self
    }

    /// The text, or an empty string.
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

/// Change to the auxiliary key surface carried by an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum KeypadChange {
    #[default]
    Unchanged,
    /// Show buttons with these labels, row by row.
    Show(Vec<Vec<String>>),
    Hide,
}

/// A message to be delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub reply_to: Option<MessageId>,
    pub link_previews: bool,
    /// Deliver without notification.
    pub silent: bool,
    pub keypad: KeypadChange,
}

impl OutgoingMessage {
    /// Create a plain text message with link previews disabled.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reply_to: None,
            link_previews: false,
            silent: false,
            keypad: KeypadChange::Unchanged,
        }
    }

    /// Thread the message under another message.
    pub fn reply_to(mut self, id: impl Into<Option<MessageId>>) -> Self {
        self.reply_to = id.into();
        self
    }

    /// Enable or disable link previews.
    pub fn link_previews(mut self, enabled: bool) -> Self {
        self.link_previews = enabled;
        self
    }

    /// Deliver without notification.
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Show or hide the key surface.
    pub fn keypad(mut self, change: KeypadChange) -> Self {
        self.keypad = change;
        self
    }
}
