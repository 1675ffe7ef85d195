//! # shell-bot
//!
//! Drive interactive shell sessions on a host through a chat bot.
//!
//! Every allowed chat gets a [`Context`](session::Context) with its own
//! shell, environment, working directory and terminal size, and at most
//! one live session: a command running under a pseudo-terminal, or a
//! small text file being edited. Output is streamed back as messages,
//! replies become terminal input, and commands such as `/cancel`,
//! `/resize` or `/keypad` control the running process.
//!
//! ## Features
//!
//! - **PTY sessions**: commands run under a real terminal via portable-pty
//! - **Flood control**: silent mode coalesces output into one edited message
//! - **Access control**: owner, granted chats and one-time tokens
//! - **File transfer**: `/upload` files and reply with a file to overwrite them
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use shell_bot::transport::telegram::TelegramTransport;
//! use shell_bot::{Bot, ContextDefaults, Identity};
//!
//! #[tokio::main]
//! async fn main() -> shell_bot::Result<()> {
//!     shell_bot::logging::try_init().ok();
//!
//!     let transport = TelegramTransport::connect("123456:ABC-DEF").await?;
//!     let (bot, rx) = Bot::new(
//!         Arc::new(transport.clone()),
//!         Identity(987654321),
//!         ContextDefaults::from_host(),
//!     );
//!     let events = bot.events();
//!
//!     tokio::select! {
//!         () = bot.run(rx) => {}
//!         () = transport.listen(events) => {}
//!     }
//!     Ok(())
//! }
//! ```

pub mod access;
pub mod bot;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod pty;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use access::AccessController;
pub use bot::{Bot, Event};
pub use error::{Result, ShellBotError};
pub use output::{OutputFramer, OutputSanitizer};
pub use pty::{NativePty, PtySize, Signal, SpawnOptions};
pub use session::{
    Context, ContextDefaults, ContextStore, EditorSession, Session, SessionEvent, SessionId,
    ShellSession, ShellState,
};
pub use transport::{Identity, InboundMessage, MessageId, OutgoingMessage, Transport};
