//! Session management module.
//!
//! A [`Context`] holds the settings of one identity and at most one
//! [`Session`]: either a running command ([`ShellSession`]) or a file
//! being edited ([`EditorSession`]). Contexts live in a [`ContextStore`].

mod context;
mod editor;
mod id;
mod shell;
mod state;
mod store;

pub use context::{sanitized_env, Context, ContextDefaults};
pub use editor::{EditorSession, MAX_EDIT_SIZE};
pub use id::SessionId;
pub use shell::{ExitReport, ShellSession};
pub use state::ShellState;
pub use store::ContextStore;

use crate::transport::Identity;

/// The live session of a context.
#[derive(Debug)]
pub enum Session {
    Shell(Box<ShellSession>),
    Editor(EditorSession),
}

impl Session {
    pub fn id(&self) -> SessionId {
        match self {
            Session::Shell(shell) => shell.id(),
            Session::Editor(editor) => editor.id(),
        }
    }
}

/// Event emitted by a running command.
#[derive(Debug)]
pub struct SessionEvent {
    pub identity: Identity,
    pub session: SessionId,
    pub kind: SessionEventKind,
}

#[derive(Debug)]
pub enum SessionEventKind {
    /// Raw PTY output.
    Output(Vec<u8>),
    /// The process ended; always the last event of a session.
    Exited(ExitReport),
}
