//! Interactive process bridged to the chat through a PTY.

use std::fmt;
use std::io::Read;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use super::{SessionEvent, SessionEventKind, SessionId, ShellState};
use crate::error::ShellBotError;
use crate::output::{Frame, OutputFramer, OutputSanitizer};
use crate::pty::{pump_input, pump_output, NativePty, PtyProcess, PtySize, Signal, SpawnOptions};
use crate::transport::{Identity, MessageId};
use crate::Result;

/// Pending writes buffered towards the PTY.
const INPUT_QUEUE: usize = 64;

/// Output chunks buffered between the PTY reader and the supervisor.
const OUTPUT_QUEUE: usize = 64;

/// How long output is still collected after the process exited.
const DRAIN_QUIET: Duration = Duration::from_millis(250);

/// Delay between the two resizes of a redraw.
const REDRAW_NUDGE: Duration = Duration::from_millis(50);

/// How a session process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReport {
    /// The process exited with this status code.
    Code(u32),
    /// The process was killed by a signal, named like `SIGTERM` when known.
    Signaled(String),
    /// The exit status could not be collected.
    Failed(String),
}

impl ExitReport {
    /// Check whether the process exited successfully.
    pub fn success(&self) -> bool {
        matches!(self, ExitReport::Code(0))
    }
}

impl fmt::Display for ExitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReport::Code(0) => write!(f, "Command exited successfully."),
            ExitReport::Code(code) => write!(f, "Command exited with code {}.", code),
            ExitReport::Signaled(signal) => write!(f, "Command terminated by {}.", signal),
            ExitReport::Failed(reason) => write!(f, "Command failed: {}", reason),
        }
    }
}

/// A running command line.
pub struct ShellSession {
    id: SessionId,
    state: ShellState,
    chat: Identity,
    command: String,
    pid: u32,
    size: PtySize,
    meta_pending: bool,
    keypad_visible: bool,
    initial_message: Option<MessageId>,
    sanitizer: OutputSanitizer,
    framer: OutputFramer,
    input: Option<mpsc::Sender<Vec<u8>>>,
    process: PtyProcess,
}

impl ShellSession {
    /// Spawn `options.command` and start streaming its output.
    ///
    /// Output chunks and the final exit report are delivered as
    /// [`SessionEvent`]s through `events`, tagged with `identity` and the
    /// new session's id; `chat` is where output should be published.
    /// Must be called inside a tokio runtime.
    pub fn start<E>(
        identity: Identity,
        chat: Identity,
        options: &SpawnOptions,
        events: mpsc::Sender<E>,
    ) -> Result<Self>
    where
        E: From<SessionEvent> + Send + 'static,
    {
        let id = SessionId::next();
        let mut state = ShellState::Starting;

        let mut process = match NativePty::new().spawn(options) {
            Ok(process) => process,
            Err(e) => {
                state.transition_to(ShellState::Exited)?;
                warn!(%identity, session = %id, error = %e, "failed to start command");
                return Err(e);
            }
        };
        let reader = process.take_reader()?;
        let writer = process.take_writer()?;
        let child = process.take_child()?;

        let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE);
        tokio::spawn(pump_input(writer, input_rx));
        tokio::spawn(supervise(identity, id, reader, child, events));

        state.transition_to(ShellState::Running)?;
        info!(
            %identity,
            session = %id,
            pid = process.pid,
            command = %options.command,
            "command started"
        );

        Ok(Self {
            id,
            state,
            chat,
            command: options.command.clone(),
            pid: process.pid,
            size: options.size,
            meta_pending: false,
            keypad_visible: false,
            initial_message: None,
            sanitizer: OutputSanitizer::new(),
            framer: OutputFramer::new(),
            input: Some(input_tx),
            process,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> ShellState {
        self.state
    }

    /// Chat that receives the output.
    pub fn chat(&self) -> Identity {
        self.chat
    }

    /// Command line given to the shell.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Current terminal geometry.
    pub fn size(&self) -> PtySize {
        self.size
    }

    /// Whether the next input is Alt-prefixed.
    pub fn meta_pending(&self) -> bool {
        self.meta_pending
    }

    pub fn keypad_visible(&self) -> bool {
        self.keypad_visible
    }

    /// Announcement message that session messages reply to.
    pub fn initial_message(&self) -> Option<MessageId> {
        self.initial_message
    }

    pub fn set_initial_message(&mut self, message: MessageId) {
        self.initial_message = Some(message);
    }

    /// Message currently receiving output, if any.
    pub fn last_output_message(&self) -> Option<MessageId> {
        self.framer.last_message()
    }

    /// Write `text` to the process as typed keys, optionally followed by
    /// Enter. Line breaks are sent as Enter (CR).
    pub fn send_input(&mut self, text: &str, append_newline: bool) -> Result<()> {
        let mut data = encode_keys(text.as_bytes());
        if append_newline {
            data.push(b'\r');
        }
        self.send_raw(&data)
    }

    /// Write key bytes (escape sequences, control codes) unchanged.
    ///
    /// A pending Alt prefix is sent as ESC before the bytes and then cleared.
    pub fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        let mut bytes = Vec::with_capacity(data.len() + 1);
        if self.meta_pending {
            bytes.push(0x1b);
        }
        bytes.extend_from_slice(data);
        self.write(bytes)?;
        self.meta_pending = false;
        Ok(())
    }

    /// Toggle the Alt prefix, or set it when `value` is given.
    /// Returns the new state.
    pub fn toggle_meta(&mut self, value: Option<bool>) -> bool {
        self.meta_pending = value.unwrap_or(!self.meta_pending);
        self.meta_pending
    }

    /// Send `signal` to the foreground process group or to the root process.
    #[cfg(unix)]
    pub fn send_signal(&self, signal: Signal, to_group: bool) -> Result<()> {
        if !self.state.is_running() {
            return Err(ShellBotError::Delivery("process has exited".into()));
        }
        let pid = i32::try_from(self.pid)
            .ok()
            .filter(|pid| *pid > 0)
            .ok_or_else(|| ShellBotError::Delivery("process id unknown".into()))?;

        if to_group {
            let group = self
                .process
                .foreground_group()
                .filter(|group| *group > 0)
                .unwrap_or(pid);
            debug!(session = %self.id, group, %signal, "signalling process group");
            signal.send_to_group(group)
        } else {
            debug!(session = %self.id, pid, %signal, "signalling process");
            signal.send_to_process(pid)
        }
    }

    /// Signal end of input (Ctrl+D) without terminating the process.
    ///
    /// Succeeds without effect once input is closed.
    pub fn send_eof(&mut self) -> Result<()> {
        let Some(input) = self.input.as_ref() else {
            return Ok(());
        };
        match input.try_send(vec![0x04]) {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(_)) => {
                debug!(session = %self.id, "EOF after input closed");
                self.input = None;
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                Err(ShellBotError::Delivery("input buffer is full".into()))
            }
        }
    }

    /// Change the terminal geometry of the running process.
    ///
    /// Has no effect once the process exited.
    pub fn resize(&mut self, size: PtySize) -> Result<()> {
        if !self.state.is_running() {
            return Ok(());
        }
        self.process.resize(size)?;
        self.size = size;
        debug!(session = %self.id, rows = size.rows, cols = size.cols, "resized");
        Ok(())
    }

    /// Make a full-screen application repaint by briefly shrinking the
    /// terminal and restoring it.
    pub async fn redraw(&self) -> Result<()> {
        if !self.state.is_running() {
            return Err(ShellBotError::NoActiveSession);
        }
        let nudged = PtySize::new(self.size.rows, self.size.cols.saturating_sub(1).max(1));
        self.process.resize(nudged)?;
        tokio::time::sleep(REDRAW_NUDGE).await;
        self.process.resize(self.size)
    }

    /// Flip keypad visibility and return the new state.
    pub fn toggle_keypad(&mut self) -> bool {
        self.keypad_visible = !self.keypad_visible;
        self.keypad_visible
    }

    /// Turn raw PTY output into message frames.
    pub fn frame_output(&mut self, data: &[u8], silent: bool) -> Vec<Frame> {
        let text = self.sanitizer.feed(data);
        self.framer.frame(&text, silent)
    }

    /// Record the id of a message sent for a [`Frame::Send`].
    pub fn record_output_message(&mut self, message: MessageId) {
        self.framer.record_sent(message);
    }

    /// Mark the process as ended and close its input.
    pub fn mark_exited(&mut self) -> Result<()> {
        self.state.transition_to(ShellState::Exited)?;
        self.input = None;
        Ok(())
    }

    fn write(&self, data: Vec<u8>) -> Result<()> {
        if !self.state.is_running() {
            return Err(ShellBotError::Delivery("process has exited".into()));
        }
        let input = self
            .input
            .as_ref()
            .ok_or_else(|| ShellBotError::Delivery("input is closed".into()))?;
        input.try_send(data).map_err(|e| match e {
            TrySendError::Full(_) => ShellBotError::Delivery("input buffer is full".into()),
            TrySendError::Closed(_) => ShellBotError::Delivery("input is closed".into()),
        })
    }
}

impl fmt::Debug for ShellSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("command", &self.command)
            .field("pid", &self.pid)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Forward PTY output and the exit status of one session.
///
/// After the process exits, output is still drained until the PTY closes
/// or stays quiet for [`DRAIN_QUIET`]; then exactly one exit event is sent.
async fn supervise<E>(
    identity: Identity,
    session: SessionId,
    reader: Box<dyn Read + Send>,
    mut child: Box<dyn portable_pty::Child + Send + Sync>,
    events: mpsc::Sender<E>,
) where
    E: From<SessionEvent> + Send + 'static,
{
    let (chunk_tx, mut chunk_rx) = mpsc::channel::<Vec<u8>>(OUTPUT_QUEUE);
    tokio::spawn(pump_output(reader, chunk_tx));

    let mut wait = tokio::task::spawn_blocking(move || child.wait());
    let mut exited: Option<ExitReport> = None;

    loop {
        let chunk = if exited.is_some() {
            tokio::time::timeout(DRAIN_QUIET, chunk_rx.recv())
                .await
                .unwrap_or(None)
        } else {
            tokio::select! {
                chunk = chunk_rx.recv() => chunk,
                status = &mut wait => {
                    exited = Some(exit_report(status));
                    continue;
                }
            }
        };

        let Some(mut data) = chunk else { break };
        while let Ok(more) = chunk_rx.try_recv() {
            data.extend(more);
        }
        let event = SessionEvent {
            identity,
            session,
            kind: SessionEventKind::Output(data),
        };
        if events.send(event.into()).await.is_err() {
            debug!(%session, "event queue closed, stopping supervisor");
            return;
        }
    }

    let report = match exited {
        Some(report) => report,
        None => exit_report(wait.await),
    };
    info!(%identity, %session, report = %report, "command exited");

    let event = SessionEvent {
        identity,
        session,
        kind: SessionEventKind::Exited(report),
    };
    if events.send(event.into()).await.is_err() {
        debug!(%session, "event queue closed before exit report");
    }
}

/// Map chat line breaks to the Enter key.
fn encode_keys(text: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut bytes = text.iter().peekable();
    while let Some(&byte) = bytes.next() {
        match byte {
            b'\r' if bytes.peek() == Some(&&b'\n') => {}
            b'\n' => out.push(b'\r'),
            other => out.push(other),
        }
    }
    out
}

fn exit_report(
    status: std::result::Result<
        std::io::Result<portable_pty::ExitStatus>,
        tokio::task::JoinError,
    >,
) -> ExitReport {
    match status {
        Ok(Ok(status)) => match status.signal() {
            Some(signal) => ExitReport::Signaled(signal_name(signal)),
            None => ExitReport::Code(status.exit_code()),
        },
        Ok(Err(e)) => ExitReport::Failed(e.to_string()),
        Err(e) => ExitReport::Failed(e.to_string()),
    }
}

/// portable-pty reports signals by their description ("Terminated").
#[cfg(unix)]
fn signal_name(signal: &str) -> String {
    Signal::from_description(signal)
        .map(|known| known.name().to_string())
        .unwrap_or_else(|| signal.to_string())
}

#[cfg(not(unix))]
fn signal_name(signal: &str) -> String {
    signal.to_string()
}

#[cfg(test)]
#[cfg(unix)]
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
            size: PtySize::new(20, 40),
        }
    }

    fn start(command: &str, tx: mpsc::Sender<SessionEvent>) -> ShellSession {
        ShellSession::start(Identity(1), Identity(1), &options(command), tx).unwrap()
    }

    /// Collect output until the exit report arrives.
    async fn run_to_exit(
        session: &mut ShellSession,
        rx: &mut mpsc::Receiver<SessionEvent>,
    ) -> (String, ExitReport) {
        let mut output = String::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("timed out waiting for session event")
                .expect("event channel closed");
            assert_eq!(event.session, session.id());
            match event.kind {
                SessionEventKind::Output(data) => {
                    output.push_str(&String::from_utf8_lossy(&data));
                }
                SessionEventKind::Exited(report) => {
                    session.mark_exited().unwrap();
                    return (output, report);
                }
            }
        }
    }

    /// Collect output until it contains `needle`.
    async fn wait_for_output(rx: &mut mpsc::Receiver<SessionEvent>, needle: &str) {
        let mut output = String::new();
        while !output.contains(needle) {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("timed out waiting for output")
                .expect("event channel closed");
            if let SessionEventKind::Output(data) = event.kind {
                output.push_str(&String::from_utf8_lossy(&data));
            }
        }
    }

    /// Start a command that dumps the first `count` raw input bytes.
    async fn raw_reader(count: usize) -> (ShellSession, mpsc::Receiver<SessionEvent>) {
        let (tx, mut rx) = mpsc::channel(64);
        let command = format!("stty raw -echo; echo ready; head -c {} | od -An -c", count);
        let session = start(&command, tx);
        wait_for_output(&mut rx, "ready").await;
        (session, rx)
    }

    #[tokio::test]
    async fn test_output_and_exit_code() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut session = start("echo hello; exit 3", tx);
        assert_eq!(session.state(), ShellState::Running);
        assert!(session.pid() > 0);

        let (output, report) = run_to_exit(&mut session, &mut rx).await;
        assert!(output.contains("hello"));
        assert_eq!(report, ExitReport::Code(3));
        assert_eq!(session.state(), ShellState::Exited);
    }

    #[tokio::test]
    async fn test_input_reaches_process() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut session = start("read line; echo got:$line", tx);

        session.send_input("abc", true).unwrap();
        let (output, report) = run_to_exit(&mut session, &mut rx).await;
        assert!(output.contains("got:abc"));
        assert!(report.success());
    }

    #[tokio::test]
    async fn test_enter_is_carriage_return_in_raw_mode() {
        let (mut session, mut rx) = raw_reader(4).await;

        session.send_input("a\nb", true).unwrap();
        let (output, _) = run_to_exit(&mut session, &mut rx).await;
        assert!(output.contains("a  \\r   b  \\r"), "{:?}", output);
        assert!(!output.contains("\\n"), "{:?}", output);
    }

    #[tokio::test]
    async fn test_alt_prefix_applies_to_control_codes() {
        let (mut session, mut rx) = raw_reader(2).await;

        session.toggle_meta(None);
        session.send_raw(&[0x18]).unwrap();
        assert!(!session.meta_pending());

        let (output, _) = run_to_exit(&mut session, &mut rx).await;
        assert!(output.contains("033 030"), "{:?}", output);
    }

    #[tokio::test]
    async fn test_meta_prefix_is_consumed_once() {
        let (tx, _rx) = mpsc::channel::<SessionEvent>(64);
        let mut session = start("sleep 5", tx);

        assert!(session.toggle_meta(None));
        session.send_input("x", false).unwrap();
        assert!(!session.meta_pending());

        assert!(session.toggle_meta(Some(true)));
        assert!(session.toggle_meta(Some(true)));
        assert!(!session.toggle_meta(None));

        session.send_signal(Signal::TERM, false).unwrap();
    }

    #[tokio::test]
    async fn test_interrupt_group_ends_command() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut session = start("sleep 30", tx);

        tokio::time::sleep(Duration::from_millis(200)).await;
        session.send_signal(Signal::INT, true).unwrap();

        let (_, report) = run_to_exit(&mut session, &mut rx).await;
        assert_eq!(report, ExitReport::Signaled("SIGINT".into()));
    }

    #[tokio::test]
    async fn test_terminate_root_process() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut session = start("sleep 30", tx);

        session.send_signal(Signal::TERM, false).unwrap();
        let (_, report) = run_to_exit(&mut session, &mut rx).await;
        assert_eq!(report, ExitReport::Signaled("SIGTERM".into()));
        assert_eq!(report.to_string(), "Command terminated by SIGTERM.");
    }

    #[tokio::test]
    async fn test_signal_after_exit_fails() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut session = start("true", tx);
        run_to_exit(&mut session, &mut rx).await;

        let err = session.send_signal(Signal::INT, true).unwrap_err();
        assert!(matches!(err, ShellBotError::Delivery(_)));
        assert!(session.send_input("late", true).is_err());
    }

    #[tokio::test]
    async fn test_eof_after_exit_is_noop() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut session = start("cat", tx);

        session.send_eof().unwrap();
        let (_, report) = run_to_exit(&mut session, &mut rx).await;
        assert!(report.success());
        assert!(session.send_eof().is_ok());
    }

    #[tokio::test]
    async fn test_resize_live_and_after_exit() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut session = start("sleep 1", tx);

        session.resize(PtySize::new(24, 80)).unwrap();
        assert_eq!(session.size(), PtySize::new(24, 80));
        session.redraw().await.unwrap();
        assert_eq!(session.size(), PtySize::new(24, 80));

        run_to_exit(&mut session, &mut rx).await;
        assert!(session.resize(PtySize::new(10, 10)).is_ok());
        assert_eq!(session.size(), PtySize::new(24, 80));
    }

    #[tokio::test]
    async fn test_keypad_toggle() {
        let (tx, _rx) = mpsc::channel::<SessionEvent>(64);
        let mut session = start("sleep 5", tx);

        assert!(session.toggle_keypad());
        assert!(session.keypad_visible());
        assert!(!session.toggle_keypad());

        session.send_signal(Signal::TERM, false).unwrap();
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let (tx, _rx) = mpsc::channel::<SessionEvent>(1);
        let mut bad = options("true");
        bad.shell = "/definitely/not/a/shell".into();
        let err = ShellSession::start(Identity(1), Identity(1), &bad, tx).unwrap_err();
        assert!(matches!(err, ShellBotError::Spawn(_)));
    }

    #[test]
    fn test_exit_report_display() {
        assert_eq!(ExitReport::Code(0).to_string(), "Command exited successfully.");
        assert_eq!(ExitReport::Code(2).to_string(), "Command exited with code 2.");
        assert!(ExitReport::Failed("boom".into()).to_string().contains("boom"));
    }

    #[test]
    fn test_exit_report_from_status() {
        let killed = portable_pty::ExitStatus::with_signal("Terminated");
        assert_eq!(
            exit_report(Ok(Ok(killed))),
            ExitReport::Signaled("SIGTERM".into())
        );
        let odd = portable_pty::ExitStatus::with_signal("Signal 99");
        assert_eq!(exit_report(Ok(Ok(odd))), ExitReport::Signaled("Signal 99".into()));
        let done = portable_pty::ExitStatus::with_exit_code(4);
        assert_eq!(exit_report(Ok(Ok(done))), ExitReport::Code(4));
    }

    #[test]
    fn test_encode_keys() {
        assert_eq!(encode_keys(b"ls\n"), b"ls\r");
        assert_eq!(encode_keys(b"a\r\nb"), b"a\rb");
        assert_eq!(encode_keys(b"\x1b[A"), b"\x1b[A");
    }
}
