//! PTY (Pseudo-Terminal) abstraction layer.
//!
//! Spawns a shell running one command line under a pseudo-terminal and
//! exposes its output, input, geometry and process group, along with the
//! key sequences and signals that can be sent to it.

mod keys;
mod native;
mod pump;
mod signal;

pub use keys::{ctrl_code, key_sequence, keypad_labels, Key, KEYPAD};
pub use native::{available_shells, default_shell, resolve_shell, NativePty, PtyProcess};
pub use pump::{pump_input, pump_output};
pub use signal::Signal;

use std::collections::HashMap;
use std::path::PathBuf;

/// Size of a PTY in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtySize {
    /// Number of rows (height).
    pub rows: u16,
    /// Number of columns (width).
    pub cols: u16,
}

impl PtySize {
    /// Create a new PtySize with the given dimensions.
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }
}

impl Default for PtySize {
    fn default() -> Self {
        Self { rows: 20, cols: 40 }
    }
}

impl From<PtySize> for portable_pty::PtySize {
    fn from(size: PtySize) -> Self {
        portable_pty::PtySize {
            rows: size.rows,
            cols: size.cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

/// Everything needed to start a command under a PTY.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    /// Shell used to interpret the command line.
    pub shell: String,
    /// Command line passed to the shell.
    pub command: String,
    /// Working directory.
    pub cwd: PathBuf,
    /// Complete environment of the child.
    pub env: HashMap<String, String>,
    /// Run the shell as an interactive shell (loads rc files).
    pub interactive: bool,
    /// Initial terminal size.
    pub size: PtySize,
}

impl SpawnOptions {
    /// Arguments passed to the shell.
    pub fn shell_args(&self) -> [&str; 2] {
        let flag = if self.interactive { "-ic" } else { "-c" };
        [flag, self.command.as_str()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pty_size_default() {
        let size = PtySize::default();
        assert_eq!(size.rows, 20);
        assert_eq!(size.cols, 40);
    }

    #[test]
    fn test_pty_size_conversion() {
        let native: portable_pty::PtySize = PtySize::new(24, 80).into();
        assert_eq!(native.rows, 24);
        assert_eq!(native.cols, 80);
        assert_eq!(native.pixel_width, 0);
    }

    #[test]
    fn test_shell_args() {
        let mut options = SpawnOptions {
            shell: "/bin/sh".into(),
            command: "ls -la".into(),
            cwd: PathBuf::from("/"),
            env: HashMap::new(),
            interactive: false,
            size: PtySize::default(),
        };
        assert_eq!(options.shell_args(), ["-c", "ls -la"]);

        options.interactive = true;
        assert_eq!(options.shell_args(), ["-ic", "ls -la"]);
    }
}
