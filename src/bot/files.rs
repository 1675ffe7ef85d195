//! Correlation of file messages with local paths.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::session::Context;
use crate::transport::{Identity, InboundFile, MessageId};

/// Files the bot sent out, keyed by the chat and message that carried
/// them. A file sent in reply to one of these messages overwrites the
/// remembered path.
#[derive(Debug, Default)]
pub struct PendingUploads {
    paths: HashMap<(Identity, MessageId), PathBuf>,
}

impl PendingUploads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember that `message` in `chat` carried the file at `path`.
    pub fn register(&mut self, chat: Identity, message: MessageId, path: PathBuf) {
        self.paths.insert((chat, message), path);
    }

    pub fn get(&self, chat: Identity, message: MessageId) -> Option<&Path> {
        self.paths.get(&(chat, message)).map(PathBuf::as_path)
    }

    /// Forget an entry, e.g. after a failed download.
    pub fn discard(&mut self, chat: Identity, message: MessageId) -> Option<PathBuf> {
        self.paths.remove(&(chat, message))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Where a file sent in reply to `target` should be written, if anywhere.
///
/// A remembered upload wins; otherwise a reply to the context's last
/// directory notice lands in the working directory.
pub fn download_target(
    uploads: &PendingUploads,
    context: &Context,
    chat: Identity,
    target: MessageId,
    file: &InboundFile,
) -> Option<PathBuf> {
    if let Some(path) = uploads.get(chat, target) {
        return Some(path.to_path_buf());
    }
    (context.last_file_notice == Some(target)).then(|| context.cwd.join(file_name(file)))
}

/// Local name for an inbound file: the declared name without any
/// directory part, or one derived from the file id.
pub fn file_name(file: &InboundFile) -> String {
    file.name
        .as_deref()
        .and_then(|name| Path::new(name).file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            let id: String = file
                .id
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
                .take(32)
                .collect();
            format!("file_{}", id)
        })
}
