//! Per-identity settings and the session slot.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{EditorSession, Session, SessionEvent, SessionId, ShellSession};
use crate::error::ShellBotError;
use crate::pty::{default_shell, PtySize, SpawnOptions};
use crate::transport::{Identity, MessageId};
use crate::Result;

/// Prefix of variables that configure the bot itself; never passed on.
const PRIVATE_ENV_PREFIX: &str = "SHELL_BOT_";

/// Settings a new context starts with.
#[derive(Debug, Clone)]
pub struct ContextDefaults {
    pub shell: String,
    pub cwd: PathBuf,
    pub size: PtySize,
    pub silent: bool,
    pub interactive: bool,
    pub link_previews: bool,
    pub env: HashMap<String, String>,
}

impl ContextDefaults {
    /// Defaults derived from the host: login shell, home directory and
    /// the sanitized process environment.
    pub fn from_host() -> Self {
        let cwd = std::env::var_os("HOME")
            .map(PathBuf::from)
            .filter(|home| home.is_dir())
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("/"));

        Self {
            shell: default_shell(),
            cwd,
            size: PtySize::default(),
            silent: true,
            interactive: false,
            link_previews: false,
            env: sanitized_env(),
        }
    }

    /// Small deterministic defaults for tests.
    pub fn for_tests() -> Self {
        Self {
            shell: "/bin/sh".into(),
            cwd: std::env::temp_dir(),
            size: PtySize::default(),
            silent: true,
            interactive: false,
            link_previews: false,
            env: HashMap::from([
                ("PATH".to_string(), "/usr/local/bin:/usr/bin:/bin".to_string()),
                ("TERM".to_string(), "xterm-256color".to_string()),
            ]),
        }
    }
}

impl Default for ContextDefaults {
    fn default() -> Self {
        Self::from_host()
    }
}

/// The process environment without the bot's own variables, with a
/// terminal type suitable for the PTY.
pub fn sanitized_env() -> HashMap<String, String> {
    let mut env: HashMap<String, String> = std::env::vars()
        .filter(|(key, _)| !key.starts_with(PRIVATE_ENV_PREFIX))
        .collect();
    env.insert("TERM".into(), "xterm-256color".into());
    env
}

/// Everything the bot keeps for one identity.
#[derive(Debug)]
pub struct Context {
    pub identity: Identity,
    pub shell: String,
    pub env: HashMap<String, String>,
    pub cwd: PathBuf,
    pub size: PtySize,
    /// Coalesce output into one edited message.
    pub silent: bool,
    /// Start the shell as an interactive shell.
    pub interactive: bool,
    pub link_previews: bool,
    pub session: Option<Session>,
    /// Last working directory notice; files sent in reply land in `cwd`.
    pub last_file_notice: Option<MessageId>,
}

impl Context {
    pub fn new(identity: Identity, defaults: &ContextDefaults) -> Self {
        Self {
            identity,
            shell: defaults.shell.clone(),
            env: defaults.env.clone(),
            cwd: defaults.cwd.clone(),
            size: defaults.size,
            silent: defaults.silent,
            interactive: defaults.interactive,
            link_previews: defaults.link_previews,
            session: None,
            last_file_notice: None,
        }
    }

    /// The running command, if any.
    pub fn shell_session(&self) -> Option<&ShellSession> {
        match &self.session {
            Some(Session::Shell(shell)) => Some(&**shell),
            _ => None,
        }
    }

    pub fn shell_session_mut(&mut self) -> Option<&mut ShellSession> {
        match &mut self.session {
            Some(Session::Shell(shell)) => Some(&mut **shell),
            _ => None,
        }
    }

    /// The file being edited, if any.
    pub fn editor(&self) -> Option<&EditorSession> {
        match &self.session {
            Some(Session::Editor(editor)) => Some(editor),
            _ => None,
        }
    }

    pub fn editor_mut(&mut self) -> Option<&mut EditorSession> {
        match &mut self.session {
            Some(Session::Editor(editor)) => Some(editor),
            _ => None,
        }
    }

    /// Whether a command is running in this context.
    pub fn is_running(&self) -> bool {
        self.shell_session().is_some()
    }

    /// Spawn parameters for `command` under the current settings.
    pub fn spawn_options(&self, command: &str) -> SpawnOptions {
        SpawnOptions {
            shell: self.shell.clone(),
            command: command.to_string(),
            cwd: self.cwd.clone(),
            env: self.env.clone(),
            interactive: self.interactive,
            size: self.size,
        }
    }

    /// Start `command`, publishing to `chat`, detaching an active editor
    /// first.
    ///
    /// Fails with [`ShellBotError::SessionAlreadyActive`] while a command
    /// runs. The context is unchanged when spawning fails, except that
    /// the editor stays detached.
    pub fn start_shell<E>(
        &mut self,
        chat: Identity,
        command: &str,
        events: mpsc::Sender<E>,
    ) -> Result<&mut ShellSession>
    where
        E: From<SessionEvent> + Send + 'static,
    {
        if self.is_running() {
            return Err(ShellBotError::SessionAlreadyActive);
        }
        self.detach_editor();

        let shell = ShellSession::start(self.identity, chat, &self.spawn_options(command), events)?;
        let session = self.session.insert(Session::Shell(Box::new(shell)));
        match session {
            Session::Shell(shell) => Ok(&mut **shell),
            Session::Editor(_) => Err(ShellBotError::SessionAlreadyActive),
        }
    }

    /// Bind an editor, replacing any previous one.
    pub fn attach_editor(&mut self, editor: EditorSession) -> Result<()> {
        if self.is_running() {
            return Err(ShellBotError::SessionAlreadyActive);
        }
        self.session = Some(Session::Editor(editor));
        Ok(())
    }

    /// Stop editing. Returns the detached editor.
    pub fn detach_editor(&mut self) -> Option<EditorSession> {
        match self.session.take() {
            Some(Session::Editor(editor)) => {
                debug!(identity = %self.identity, path = %editor.path().display(), "editor detached");
                Some(editor)
            }
            other => {
                self.session = other;
                None
            }
        }
    }

    /// Clear the session slot after command `id` exited.
    ///
    /// Returns `None` when `id` is not the current command.
    pub fn finish_shell(&mut self, id: SessionId) -> Option<Box<ShellSession>> {
        match self.session.take() {
            Some(Session::Shell(mut shell)) if shell.id() == id => {
                if let Err(e) = shell.mark_exited() {
                    warn!(session = %id, error = %e, "exit of a finished session");
                }
                Some(shell)
            }
            other => {
                self.session = other;
                None
            }
        }
    }

    /// Show or hide the keypad of the running command. Returns whether
    /// it is now visible.
    pub fn toggle_keypad(&mut self) -> Result<bool> {
        self.shell_session_mut()
            .map(ShellSession::toggle_keypad)
            .ok_or_else(|| ShellBotError::UnsupportedState("no command is running".into()))
    }

    /// Set the terminal size for future commands and apply it to the
    /// running one, if any.
    pub fn resize(&mut self, size: PtySize) -> Result<()> {
        if let Some(shell) = self.shell_session_mut() {
            shell.resize(size)?;
        }
        self.size = size;
        Ok(())
    }

    /// Message to thread a "not while running" notice under, when a
    /// command is running.
    pub fn busy_thread(&self, fallback: MessageId) -> Option<MessageId> {
        self.shell_session()
            .map(|shell| shell.initial_message().unwrap_or(fallback))
    }

    /// Resolve `path` against the working directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        normalize(&self.cwd.join(path.trim()))
    }

    /// Change the working directory to `path`, which must be a readable
    /// directory. The directory stays unchanged on failure.
    pub async fn change_dir(&mut self, path: &str) -> Result<&Path> {
        let target = self.resolve_path(path);
        let _listing = tokio::fs::read_dir(&target).await?;
        debug!(identity = %self.identity, cwd = %target.display(), "changed directory");
        self.cwd = target;
        Ok(&self.cwd)
    }

    /// Value of an environment variable.
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// Set a variable, or remove it when `value` is empty.
    pub fn set_env_var(&mut self, key: &str, value: &str) {
        if value.is_empty() {
            self.env.remove(key);
        } else {
            self.env.insert(key.to_string(), value.to_string());
        }
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}
