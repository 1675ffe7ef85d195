//! Editing a small text file through chat messages.
//!
//! The file content is published as one message. A reply to that message
//! replaces the file with the reply text; editing that reply afterwards
//! rewrites the file again.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::SessionId;
use crate::error::ShellBotError;
use crate::transport::MessageId;
use crate::Result;

/// Largest file that can be edited, in bytes.
pub const MAX_EDIT_SIZE: usize = 3500;

/// A file bound to a context for editing.
#[derive(Debug)]
pub struct EditorSession {
    id: SessionId,
    path: PathBuf,
    message: Option<MessageId>,
    reply: Option<MessageId>,
}

impl EditorSession {
    /// Open `path` for editing and return the session with the current
    /// content. A missing file is treated as empty.
    pub async fn open(path: PathBuf) -> Result<(Self, String)> {
        let content = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        if content.len() > MAX_EDIT_SIZE {
            return Err(ShellBotError::UnsupportedState(format!(
                "file is larger than {} bytes",
                MAX_EDIT_SIZE
            )));
        }
        let content = String::from_utf8(content)
            .map_err(|_| ShellBotError::UnsupportedState("file is not UTF-8 text".into()))?;

        let session = Self {
            id: SessionId::next(),
            path,
            message: None,
            reply: None,
        };
        info!(session = %session.id, path = %session.path.display(), "editing file");
        Ok((session, content))
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// File being edited.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Message showing the file content.
    pub fn message(&self) -> Option<MessageId> {
        self.message
    }

    pub fn bind_message(&mut self, message: MessageId) {
        self.message = Some(message);
    }

    /// Handle a reply. Returns `false` when it does not target the file
    /// message.
    pub async fn handle_reply(
        &mut self,
        reply_to: MessageId,
        reply: MessageId,
        text: &str,
    ) -> Result<bool> {
        if self.message != Some(reply_to) {
            return Ok(false);
        }
        self.write(text).await?;
        self.reply = Some(reply);
        Ok(true)
    }

    /// Handle an edited message. Returns `false` unless it is the reply
    /// that last replaced the file.
    pub async fn handle_edit(&mut self, message: MessageId, text: &str) -> Result<bool> {
        if self.reply != Some(message) {
            return Ok(false);
        }
        self.write(text).await?;
        Ok(true)
    }

    async fn write(&self, text: &str) -> Result<()> {
        tokio::fs::write(&self.path, text).await?;
        debug!(session = %self.id, bytes = text.len(), "file written");
        Ok(())
    }
}
