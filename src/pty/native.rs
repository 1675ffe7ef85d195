//! Native PTY implementation using portable-pty.

use std::io::{Read, Write};
use std::path::Path;

use portable_pty::{native_pty_system, CommandBuilder};
use tracing::debug;

use super::{PtySize, SpawnOptions};
use crate::error::ShellBotError;
use crate::Result;

/// Get the default shell for the current platform.
pub fn default_shell() -> String {
    #[cfg(unix)]
    {
        std::env::var("SHELL")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| available_shells().into_iter().next())
            .unwrap_or_else(|| "/bin/sh".to_string())
    }
    #[cfg(windows)]
    {
        "powershell.exe".to_string()
    }
}

/// Shells listed in `/etc/shells` that exist on this host.
pub fn available_shells() -> Vec<String> {
    let listed = std::fs::read_to_string("/etc/shells").unwrap_or_default();
    let mut shells: Vec<String> = Vec::new();
    for line in listed.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if Path::new(line).is_file() && !shells.iter().any(|s| s == line) {
            shells.push(line.to_string());
        }
    }
    shells
}

/// Resolve a user-supplied shell name to a usable shell path.
///
/// Accepts an entry of `/etc/shells`, the file name of such an entry
/// (`bash`), or an absolute path to an existing file.
pub fn resolve_shell(name: &str) -> Option<String> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let shells = available_shells();
    if let Some(found) = shells.iter().find(|s| *s == name) {
        return Some(found.clone());
    }
    if !name.contains('/') {
        if let Some(found) = shells
            .iter()
            .find(|s| Path::new(s).file_name().is_some_and(|f| f == name))
        {
            return Some(found.clone());
        }
    }
    let path = Path::new(name);
    (path.is_absolute() && path.is_file()).then(|| name.to_string())
}

/// Wrapper around the native PTY system.
pub struct NativePty {
    pty_system: Box<dyn portable_pty::PtySystem + Send>,
}

impl NativePty {
    /// Create a new NativePty instance.
    pub fn new() -> Self {
        Self {
            pty_system: native_pty_system(),
        }
    }

    /// Start `options.command` through `options.shell` in a new PTY.
    ///
    /// The child gets exactly `options.env` as its environment and starts
    /// in `options.cwd`. The slave side is closed here so that reads on
    /// the master hit EOF once every process holding the terminal exits.
    pub fn spawn(&self, options: &SpawnOptions) -> Result<PtyProcess> {
        let pair = self
            .pty_system
            .openpty(options.size.into())
            .map_err(|e| ShellBotError::Pty(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&options.shell);
        cmd.args(options.shell_args());
        cmd.cwd(&options.cwd);
        cmd.env_clear();
        for (key, value) in &options.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| ShellBotError::Spawn(e.to_string()))?;
        drop(pair.slave);

        let pid = child.process_id().unwrap_or(0);
        debug!(pid, shell = %options.shell, "spawned PTY process");

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| ShellBotError::Pty(e.to_string()))?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| ShellBotError::Pty(e.to_string()))?;

        Ok(PtyProcess {
            master: pair.master,
            child: Some(child),
            reader: Some(reader),
            writer: Some(writer),
            pid,
        })
    }
}

impl Default for NativePty {
    fn default() -> Self {
        Self::new()
    }
}

/// A spawned process attached to a PTY master.
pub struct PtyProcess {
    master: Box<dyn portable_pty::MasterPty + Send>,
    child: Option<Box<dyn portable_pty::Child + Send + Sync>>,
    reader: Option<Box<dyn Read + Send>>,
    writer: Option<Box<dyn Write + Send>>,
    /// Process ID of the shell.
    pub pid: u32,
}

impl PtyProcess {
    /// Take the output reader (can only be called once).
    pub fn take_reader(&mut self) -> Result<Box<dyn Read + Send>> {
        self.reader
            .take()
            .ok_or_else(|| ShellBotError::Pty("reader already taken".into()))
    }

    /// Take the input writer (can only be called once).
    pub fn take_writer(&mut self) -> Result<Box<dyn Write + Send>> {
        self.writer
            .take()
            .ok_or_else(|| ShellBotError::Pty("writer already taken".into()))
    }

    /// Take the child handle for exit status collection.
    pub fn take_child(&mut self) -> Result<Box<dyn portable_pty::Child + Send + Sync>> {
        self.child
            .take()
            .ok_or_else(|| ShellBotError::Pty("child already taken".into()))
    }

    /// Change the terminal geometry; the foreground job receives SIGWINCH.
    pub fn resize(&self, size: PtySize) -> Result<()> {
        self.master
            .resize(size.into())
            .map_err(|e| ShellBotError::Pty(e.to_string()))
    }

    /// Current terminal geometry.
    pub fn size(&self) -> Result<PtySize> {
        self.master
            .get_size()
            .map(|s| PtySize::new(s.rows, s.cols))
            .map_err(|e| ShellBotError::Pty(e.to_string()))
    }

    /// Process group currently in the foreground of the terminal.
    #[cfg(unix)]
    pub fn foreground_group(&self) -> Option<i32> {
        self.master.process_group_leader()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn options(command: &str) -> SpawnOptions {
        SpawnOptions {
            shell: "/bin/sh".into(),
            command: command.into(),
            cwd: std::env::temp_dir(),
            env: HashMap::from([("PATH".to_string(), "/usr/bin:/bin".to_string())]),
            interactive: false,
            size: PtySize::new(24, 80),
        }
    }

    #[test]
    fn test_default_shell() {
        let shell = default_shell();
        assert!(!shell.is_empty());

        #[cfg(unix)]
        {
            assert!(shell.starts_with('/') || !shell.contains('/'));
        }
    }

    #[test]
    #[cfg(unix)]
    fn test_resolve_shell() {
        assert_eq!(resolve_shell("/bin/sh").as_deref(), Some("/bin/sh"));
        assert!(resolve_shell("").is_none());
        assert!(resolve_shell("/definitely/not/a/shell").is_none());
    }

    #[test]
    #[cfg(unix)]
    fn test_spawn_and_wait() {
        let pty = NativePty::new();
        let mut process = pty.spawn(&options("exit 3")).unwrap();
        assert!(process.pid > 0, "PID should be positive");

        let mut child = process.take_child().unwrap();
        let status = child.wait().unwrap();
        assert_eq!(status.exit_code(), 3);
    }

    #[test]
    #[cfg(unix)]
    fn test_spawn_reads_output() {
        let pty = NativePty::new();
        let mut process = pty.spawn(&options("echo SHELL_BOT_TEST_OUTPUT")).unwrap();
        let mut reader = process.take_reader().unwrap();

        let mut output = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    output.extend_from_slice(&buf[..n]);
                    if String::from_utf8_lossy(&output).contains("SHELL_BOT_TEST_OUTPUT") {
                        break;
                    }
                }
                Err(_) => break,
            }
        }

        assert!(String::from_utf8_lossy(&output).contains("SHELL_BOT_TEST_OUTPUT"));
    }

    #[test]
    #[cfg(unix)]
    fn test_resize_updates_geometry() {
        let pty = NativePty::new();
        let process = pty.spawn(&options("sleep 1")).unwrap();
        process.resize(PtySize::new(30, 100)).unwrap();
        assert_eq!(process.size().unwrap(), PtySize::new(30, 100));
    }

    #[test]
    fn test_takes_are_single_use() {
        let pty = NativePty::new();
        if let Ok(mut process) = pty.spawn(&options("true")) {
            assert!(process.take_writer().is_ok());
            assert!(process.take_writer().is_err());
        }
    }
}
