//! Mapping of process output onto chat messages.
//!
//! In silent mode consecutive chunks are appended to one message that is
//! edited in place; otherwise every chunk becomes a new message. A silent
//! message that would grow past the length limit is continued in a new
//! message.

use crate::transport::{MessageId, MAX_MESSAGE_LEN};

/// One transport action produced by the framer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Send a new message; report its id with [`OutputFramer::record_sent`].
    Send(String),
    /// Replace the text of an existing output message.
    Edit(MessageId, String),
}

/// Output message state of one shell session.
#[derive(Debug)]
pub struct OutputFramer {
    current: Option<MessageId>,
    text: String,
    max_len: usize,
}

impl OutputFramer {
    /// Create a framer with the transport's message limit.
    pub fn new() -> Self {
        Self::with_limit(MAX_MESSAGE_LEN)
    }

    /// Create a framer with a custom message limit.
    pub fn with_limit(max_len: usize) -> Self {
        Self {
            current: None,
            text: String::new(),
            max_len: max_len.max(1),
        }
    }

    /// Identifier of the message currently receiving output.
    pub fn last_message(&self) -> Option<MessageId> {
        self.current
    }

    /// Frames needed to publish `chunk`.
    pub fn frame(&mut self, chunk: &str, silent: bool) -> Vec<Frame> {
        if chunk.is_empty() {
            return Vec::new();
        }

        if let Some(id) = self.current {
            if silent && char_len(&self.text) + char_len(chunk) <= self.max_len {
                self.text.push_str(chunk);
                return vec![Frame::Edit(id, self.text.clone())];
            }
        }

        self.current = None;
        self.text.clear();
        if chunk.trim().is_empty() {
            // Blank messages cannot be delivered; wait for real content.
            return Vec::new();
        }

        let pieces = split_chars(chunk, self.max_len);
        if let Some(last) = pieces.last() {
            self.text = last.clone();
        }
        pieces.into_iter().map(Frame::Send).collect()
    }

    /// Record the id of a message sent for a [`Frame::Send`].
    pub fn record_sent(&mut self, id: MessageId) {
        self.current = Some(id);
    }

    /// Forget the current message; the next chunk starts a new one.
    pub fn reset(&mut self) {
        self.current = None;
        self.text.clear();
    }
}

impl Default for OutputFramer {
    fn default() -> Self {
        Self::new()
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split `text` into pieces of at most `max_len` characters, preferring
/// line boundaries.
pub fn split_chars(text: &str, max_len: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = char_len(line);
        if current_len + line_len > max_len && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > max_len {
            let chars: Vec<char> = line.chars().collect();
            for part in chars.chunks(max_len) {
                let part: String = part.iter().collect();
                if part.chars().count() == max_len {
                    pieces.push(part);
                } else {
                    current_len = part.chars().count();
                    current = part;
                }
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
