//! Error types for shell-bot.

use thiserror::Error;

/// Main error type for shell-bot operations.
#[derive(Error, Debug)]
pub enum ShellBotError {
    /// The identity is neither the owner nor granted.
    #[error("access denied")]
    AccessDenied,

    /// The one-time token is unknown or was already used.
    #[error("invalid or already used token")]
    InvalidToken,

    /// The target context still holds a live session.
    #[error("a session is active")]
    SessionActive,

    /// The operation needs a running session.
    #[error("no active session")]
    NoActiveSession,

    /// A session is already running in this context.
    #[error("a session is already active")]
    SessionAlreadyActive,

    /// Input or signal could not reach the process.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// The operation is not supported in the current session state.
    #[error("unsupported state: {0}")]
    UnsupportedState(String),

    /// The process could not be started.
    #[error("spawn failed: {0}")]
    Spawn(String),

    /// PTY-related error.
    #[error("PTY error: {0}")]
    Pty(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid shell state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: crate::session::ShellState,
        to: crate::session::ShellState,
    },

    /// The chat transport rejected a request.
    #[error("transport error: {0}")]
    Transport(String),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience Result type for shell-bot operations.
pub type Result<T> = std::result::Result<T, ShellBotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_display() {
        let err = ShellBotError::Delivery("process has exited".into());
        assert!(err.to_string().contains("delivery failed"));
        assert!(err.to_string().contains("process has exited"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ShellBotError = io_err.into();
        assert!(matches!(err, ShellBotError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_spawn_error_display() {
        let err = ShellBotError::Spawn("no such file".into());
        assert!(err.to_string().contains("spawn failed"));
    }

    #[test]
    fn test_state_transition_display() {
        use crate::session::ShellState;
        let err = ShellBotError::InvalidStateTransition {
            from: ShellState::Exited,
            to: ShellState::Running,
        };
        assert!(err.to_string().contains("Exited"));
        assert!(err.to_string().contains("Running"));
    }
}
