//! Command handlers.
//!
//! Every handler validates its preconditions first and answers with a
//! fixed message when they are not met, so a failed command never leaves
//! the context half changed.

use std::fmt::Write as _;

use tracing::{debug, info, warn};

use super::commands::{parse_bool, parse_env, parse_size, Command, EnvRequest, HELP_TEXT};
use super::{Bot, Event, Reply, NO_COMMAND};
use crate::error::ShellBotError;
use crate::pty::{available_shells, ctrl_code, keypad_labels, resolve_shell, Signal};
use crate::session::{EditorSession, Session};
use crate::transport::{Identity, InboundMessage, KeypadChange, OutgoingMessage};

const WELCOME: &str = "Welcome! Use /run to execute commands, and reply to my messages to send \
                       input. /help for more info.";

impl Bot {
    /// Execute `command` on behalf of `identity`.
    pub(super) async fn dispatch(
        &mut self,
        msg: &InboundMessage,
        identity: Identity,
        command: Command,
    ) {
        let reply = self.reply(msg.chat.id);
        debug!(%identity, chat = %msg.chat.id, ?command, "dispatching command");

        match command {
            Command::Run(args) => self.run_command(msg, identity, &args, &reply).await,
            Command::RunOrEnter(args) => {
                if self.contexts.get_or_create(identity).is_running() {
                    self.enter(identity, &args, true, &reply).await;
                } else {
                    self.run_command(msg, identity, &args, &reply).await;
                }
            }
            Command::Enter(args) => self.enter(identity, &args, true, &reply).await,
            Command::Type(args) => {
                let text = if args.is_empty() { " " } else { args.as_str() };
                self.enter(identity, text, false, &reply).await;
            }
            Command::Ctrl(args) => self.ctrl(identity, &args, &reply).await,
            Command::Alt(args) => self.alt(identity, &args, &reply).await,
            Command::Cancel(args) => self.signal(msg, identity, &args, true, &reply).await,
            Command::Kill(args) => self.signal(msg, identity, &args, false, &reply).await,
            Command::End => {
                let ctx = self.contexts.get_or_create(identity);
                match ctx.shell_session_mut() {
                    Some(shell) => {
                        if let Err(e) = shell.send_eof() {
                            reply.text_to(msg.id, format!("Couldn't send EOF: {}", e)).await;
                        }
                    }
                    None => {
                        reply.text(NO_COMMAND).await;
                    }
                }
            }
            Command::Redraw => {
                let ctx = self.contexts.get_or_create(identity);
                match ctx.shell_session() {
                    Some(shell) => {
                        if let Err(e) = shell.redraw().await {
                            reply.text_to(msg.id, format!("Couldn't redraw: {}", e)).await;
                        }
                    }
                    None => {
                        reply.text(NO_COMMAND).await;
                    }
                }
            }
            Command::Keypad => self.keypad(identity, &reply).await,
            Command::Status => self.status(msg, identity, &reply).await,
            Command::Shell(args) => self.shell(msg, identity, &args, &reply).await,
            Command::Cd(args) => self.cd(msg, identity, &args, &reply).await,
            Command::Env(args) => self.env(msg, identity, &args, &reply).await,
            Command::Resize(args) => {
                let Some(size) = parse_size(&args) else {
                    reply
                        .text("Use /resize <columns> <rows> to resize the terminal.")
                        .await;
                    return;
                };
                match self.contexts.get_or_create(identity).resize(size) {
                    Ok(()) => {
                        reply.text_to(msg.id, "Terminal resized.").await;
                    }
                    Err(e) => {
                        reply.text_to(msg.id, format!("Couldn't resize: {}", e)).await;
                    }
                }
            }
            Command::SetSilent(args) => {
                let Some(silent) = parse_bool(&args) else {
                    reply
                        .text(
                            "Use /setsilent [yes|no] to control whether new output from the \
                             command will be sent silently.",
                        )
                        .await;
                    return;
                };
                self.contexts.get_or_create(identity).silent = silent;
                let text = if silent {
                    "Output will be sent silently."
                } else {
                    "Output will not be sent silently."
                };
                reply.text(text).await;
            }
            Command::SetInteractive(args) => {
                let Some(interactive) = parse_bool(&args) else {
                    reply
                        .text(
                            "Use /setinteractive [yes|no] to control whether shell is \
                             interactive. Enabling it will cause your aliases in i.e. .bashrc \
                             to be honored, but can cause bugs in some shells such as fish.",
                        )
                        .await;
                    return;
                };
                let ctx = self.contexts.get_or_create(identity);
                if let Some(thread) = ctx.busy_thread(msg.id) {
                    reply
                        .text_to(
                            thread,
                            "Can't change the interactive flag while a command is running.",
                        )
                        .await;
                    return;
                }
                ctx.interactive = interactive;
                let text = if interactive {
                    "Commands will be started with interactive shells."
                } else {
                    "Commands will be started with non-interactive shells."
                };
                reply.text(text).await;
            }
            Command::SetLinkPreviews(args) => {
                let Some(previews) = parse_bool(&args) else {
                    reply
                        .text(
                            "Use /setlinkpreviews [yes|no] to control whether links in the \
                             output get expanded.",
                        )
                        .await;
                    return;
                };
                self.contexts.get_or_create(identity).link_previews = previews;
                let text = if previews {
                    "Links in the output will be expanded."
                } else {
                    "Links in the output will not be expanded."
                };
                reply.text(text).await;
            }
            Command::Grant(args) => self.grant(msg, identity, &args, &reply).await,
            Command::Revoke(args) => self.revoke(msg, identity, &args, &reply).await,
            Command::Token => self.token(identity, &reply).await,
            Command::Upload(args) => self.upload(msg, identity, &args, &reply).await,
            Command::Edit(args) => self.edit(msg, identity, &args, &reply).await,
            Command::Start(token) => {
                let own_token = !token.is_empty()
                    && self.access.is_owner(identity)
                    && self.access.revoke_token(&token);
                if own_token {
                    info!("owner revoked a pending token by redeeming it");
                    reply
                        .text("You were already authenticated; the token has been revoked.")
                        .await;
                } else {
                    reply.text(WELCOME).await;
                }
            }
            Command::Help => {
                reply.text(HELP_TEXT).await;
            }
            Command::Unknown(name) => {
                debug!(%identity, command = %name, "unknown command");
                reply.text_to(msg.id, "Invalid command.").await;
            }
        }
    }

    async fn run_command(
        &mut self,
        msg: &InboundMessage,
        identity: Identity,
        args: &str,
        reply: &Reply,
    ) {
        if args.is_empty() {
            reply.text("Use /run <command> to execute something.").await;
            return;
        }
        let ctx = self.contexts.get_or_create(identity);
        if let Some(thread) = ctx.busy_thread(msg.id) {
            reply.text_to(thread, "A command is already running.").await;
            return;
        }

        info!(%identity, chat = %msg.chat.name, command = %args, "running command");
        match ctx.start_shell(msg.chat.id, args, self.events.clone()) {
            Ok(shell) => shell.set_initial_message(msg.id),
            Err(e) => {
                reply
                    .text_to(msg.id, format!("Couldn't start the command: {}", e))
                    .await;
            }
        }
    }

    async fn enter(&mut self, identity: Identity, text: &str, newline: bool, reply: &Reply) {
        let ctx = self.contexts.get_or_create(identity);
        let Some(shell) = ctx.shell_session_mut() else {
            reply.text(NO_COMMAND).await;
            return;
        };
        if let Err(e) = shell.send_input(text, newline) {
            reply.text(format!("Couldn't send input: {}", e)).await;
        }
    }

    async fn ctrl(&mut self, identity: Identity, args: &str, reply: &Reply) {
        let ctx = self.contexts.get_or_create(identity);
        let Some(shell) = ctx.shell_session_mut() else {
            reply.text(NO_COMMAND).await;
            return;
        };
        let Some(code) = ctrl_code(args) else {
            reply
                .text("Use /ctrl <letter> to send Ctrl+letter to the process.")
                .await;
            return;
        };
        if let Err(e) = shell.send_raw(&[code]) {
            reply.text(format!("Couldn't send input: {}", e)).await;
        }
    }

    async fn alt(&mut self, identity: Identity, args: &str, reply: &Reply) {
        let ctx = self.contexts.get_or_create(identity);
        let Some(shell) = ctx.shell_session_mut() else {
            reply.text(NO_COMMAND).await;
            return;
        };
        if args.is_empty() {
            let pending = shell.toggle_meta(None);
            debug!(%identity, pending, "alt prefix toggled");
            return;
        }
        shell.toggle_meta(Some(true));
        if let Err(e) = shell.send_input(args, false) {
            reply.text(format!("Couldn't send input: {}", e)).await;
        }
    }

    async fn signal(
        &mut self,
        msg: &InboundMessage,
        identity: Identity,
        args: &str,
        to_group: bool,
        reply: &Reply,
    ) {
        let ctx = self.contexts.get_or_create(identity);
        let Some(shell) = ctx.shell_session() else {
            reply.text(NO_COMMAND).await;
            return;
        };
        let signal = if args.is_empty() {
            Ok(if to_group { Signal::INT } else { Signal::TERM })
        } else {
            args.parse::<Signal>()
        };

        #[cfg(unix)]
        let result = signal.and_then(|signal| shell.send_signal(signal, to_group));
        #[cfg(not(unix))]
        let result = signal.and_then(|_| {
            let _ = shell;
            Err(ShellBotError::Delivery(
                "signals are not supported on this platform".into(),
            ))
        });

        if let Err(e) = result {
            warn!(%identity, error = %e, "signal delivery failed");
            reply
                .text_to(msg.id, format!("Couldn't send signal: {}", e))
                .await;
        }
    }

    async fn keypad(&mut self, identity: Identity, reply: &Reply) {
        let ctx = self.contexts.get_or_create(identity);
        let visible = match ctx.toggle_keypad() {
            Ok(visible) => visible,
            Err(_) => {
                reply.text(NO_COMMAND).await;
                return;
            }
        };
        let thread = ctx.shell_session().and_then(|shell| shell.initial_message());

        let message = if visible {
            OutgoingMessage::new("Keypad shown.").keypad(KeypadChange::Show(keypad_labels()))
        } else {
            OutgoingMessage::new("Keypad hidden.").keypad(KeypadChange::Hide)
        };
        if reply.send(message.reply_to(thread)).await.is_none() {
            // The chat still shows the old surface.
            if let Some(ctx) = self.contexts.get_mut(identity) {
                let _ = ctx.toggle_keypad();
            }
            reply.text("Couldn't toggle the keypad.").await;
        }
    }

    async fn status(&mut self, msg: &InboundMessage, identity: Identity, reply: &Reply) {
        let ctx = self.contexts.get_or_create(identity);
        let mut text = String::new();
        let mut thread = None;

        match &ctx.session {
            Some(Session::Editor(editor)) => {
                let _ = writeln!(text, "Editing file: {}\n", editor.path().display());
            }
            Some(Session::Shell(shell)) => {
                let _ = writeln!(text, "Command running, PID {}.\n", shell.pid());
                thread = shell.initial_message();
            }
            None => text.push_str("No command is running.\n\n"),
        }

        let yes_no = |flag: bool| if flag { "yes" } else { "no" };
        let _ = writeln!(text, "Shell: {}", ctx.shell);
        let _ = writeln!(text, "Size: {}x{}", ctx.size.cols, ctx.size.rows);
        let _ = writeln!(text, "Directory: {}", ctx.cwd.display());
        let _ = writeln!(text, "Silent: {}", yes_no(ctx.silent));
        let _ = writeln!(text, "Interactive shell: {}", yes_no(ctx.interactive));
        let _ = writeln!(text, "Link previews: {}", yes_no(ctx.link_previews));
        let _ = writeln!(text, "UID/GID: {}", process_ids());

        if self.access.is_owner(msg.chat.id) {
            let granted = self.access.granted();
            if granted.is_empty() {
                text.push_str("\nUse /grant or /token to allow other chats to use the bot.");
            } else {
                text.push_str("\nGranted chats:\n");
                let ids: Vec<String> = granted.iter().map(Identity::to_string).collect();
                text.push_str(&ids.join("\n"));
            }
        }

        reply.text_to(thread, text.trim_end()).await;
    }

    async fn shell(&mut self, msg: &InboundMessage, identity: Identity, args: &str, reply: &Reply) {
        let ctx = self.contexts.get_or_create(identity);
        if args.is_empty() {
            let others: Vec<String> = available_shells()
                .into_iter()
                .filter(|shell| *shell != ctx.shell)
                .collect();
            let mut text = format!("Current shell: {}", ctx.shell);
            if !others.is_empty() {
                text.push_str("\n\nOther shells:\n");
                text.push_str(&others.join("\n"));
            }
            reply.text(text).await;
            return;
        }

        if let Some(thread) = ctx.busy_thread(msg.id) {
            reply
                .text_to(thread, "Can't change the shell while a command is running.")
                .await;
            return;
        }
        match resolve_shell(args) {
            Some(shell) => {
                info!(%identity, %shell, "shell changed");
                ctx.shell = shell;
                reply.text("Shell changed.").await;
            }
            None => {
                reply.text("Couldn't change the shell.").await;
            }
        }
    }

    async fn cd(&mut self, msg: &InboundMessage, identity: Identity, args: &str, reply: &Reply) {
        let ctx = self.contexts.get_or_create(identity);
        if !args.is_empty() {
            if let Some(thread) = ctx.busy_thread(msg.id) {
                reply
                    .text_to(
                        thread,
                        "Can't change the directory while a command is running.",
                    )
                    .await;
                return;
            }
            if let Err(e) = ctx.change_dir(args).await {
                let text = match e {
                    ShellBotError::Io(io) => io.to_string(),
                    other => other.to_string(),
                };
                reply.text(text).await;
                return;
            }
        }

        let notice = format!("Now at: {}", ctx.cwd.display());
        if let Some(id) = reply.text(notice).await {
            ctx.last_file_notice = Some(id);
        }
    }

    async fn env(&mut self, msg: &InboundMessage, identity: Identity, args: &str, reply: &Reply) {
        let Some(request) = parse_env(args) else {
            reply
                .text_to(
                    msg.id,
                    "Use /env <name> to see the value of a variable, or /env <name>=<value> \
                     to change it.",
                )
                .await;
            return;
        };

        let ctx = self.contexts.get_or_create(identity);
        let key = match request {
            EnvRequest::Show(key) => key,
            EnvRequest::Set(key, value) => {
                if let Some(thread) = ctx.busy_thread(msg.id) {
                    reply
                        .text_to(
                            thread,
                            "Can't change the environment while a command is running.",
                        )
                        .await;
                    return;
                }
                ctx.set_env_var(&key, &value);
                key
            }
        };

        let text = match ctx.env_var(&key) {
            Some(value) => format!("{}={:?}", key, value),
            None => format!("{} unset", key),
        };
        reply.text_to(msg.id, text).await;
    }

    async fn grant(&mut self, msg: &InboundMessage, identity: Identity, args: &str, reply: &Reply) {
        if !self.access.is_owner(identity) {
            debug!(%identity, "grant from a non-owner ignored");
            return;
        }
        let Ok(target) = args.parse::<Identity>() else {
            reply
                .text("Use /grant <id> or /revoke <id> to control whether the chat with that ID can use this bot.")
                .await;
            return;
        };
        match self.access.grant(target) {
            Ok(()) => {
                reply
                    .text_to(
                        msg.id,
                        format!(
                            "Chat {} can now use this bot. To revoke, use:\n/revoke {}",
                            target, target
                        ),
                    )
                    .await;
            }
            Err(e) => {
                reply.text_to(msg.id, format!("Couldn't grant access: {}", e)).await;
            }
        }
    }

    async fn revoke(&mut self, msg: &InboundMessage, identity: Identity, args: &str, reply: &Reply) {
        if !self.access.is_owner(identity) {
            debug!(%identity, "revoke from a non-owner ignored");
            return;
        }
        let Ok(target) = args.parse::<Identity>() else {
            reply
                .text("Use /grant <id> or /revoke <id> to control whether the chat with that ID can use this bot.")
                .await;
            return;
        };
        if self.access.is_owner(target) {
            reply.text_to(msg.id, "The owner can't be revoked.").await;
            return;
        }
        match self.access.revoke(target, &mut self.contexts) {
            Ok(()) => {
                reply
                    .text_to(msg.id, format!("Chat {} has been revoked successfully.", target))
                    .await;
            }
            Err(ShellBotError::SessionActive) => {
                reply
                    .text_to(
                        msg.id,
                        "Couldn't revoke the specified chat, because a command is running there.",
                    )
                    .await;
            }
            Err(e) => {
                reply.text_to(msg.id, format!("Couldn't revoke access: {}", e)).await;
            }
        }
    }

    async fn token(&mut self, identity: Identity, reply: &Reply) {
        if !self.access.is_owner(identity) {
            debug!(%identity, "token request from a non-owner ignored");
            return;
        }
        let token = match self.access.issue_token() {
            Ok(token) => token,
            Err(e) => {
                reply.text(format!("Couldn't generate a token: {}", e)).await;
                return;
            }
        };
        let text = format!(
            "One-time access token generated. The following link can be used to get access \
             to the bot:\n{}\nOr by forwarding me this:",
            self.transport.link(Some(&token))
        );
        reply.text(text).await;
        reply.text(format!("/start {}", token)).await;
    }

    async fn upload(&mut self, msg: &InboundMessage, identity: Identity, args: &str, reply: &Reply) {
        if args.is_empty() {
            reply.text("Use /upload <file> and I'll send it to you.").await;
            return;
        }
        let path = self.contexts.get_or_create(identity).resolve_path(args);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                reply
                    .text(format!("Couldn't open file: {} is not a file", path.display()))
                    .await;
                return;
            }
            Err(e) => {
                reply.text(format!("Couldn't open file: {}", e)).await;
                return;
            }
        }

        let transport = self.transport.clone();
        let events = self.events.clone();
        let chat = msg.chat.id;
        let reply = reply.clone();
        tokio::spawn(async move {
            match transport.send_file(chat, &path, None).await {
                Ok(message) => {
                    info!(%chat, path = %path.display(), "file sent");
                    let event = Event::UploadSent {
                        chat,
                        message,
                        path,
                    };
                    if events.send(event).await.is_err() {
                        debug!(%chat, "event queue closed before upload report");
                    }
                }
                Err(e) => {
                    warn!(%chat, path = %path.display(), error = %e, "file send failed");
                    reply.text(format!("Couldn't send file: {}", e)).await;
                }
            }
        });
    }

    async fn edit(&mut self, msg: &InboundMessage, identity: Identity, args: &str, reply: &Reply) {
        let ctx = self.contexts.get_or_create(identity);
        if let Some(thread) = ctx.busy_thread(msg.id) {
            reply
                .text_to(thread, "Can't edit a file while a command is running.")
                .await;
            return;
        }
        if args.is_empty() {
            let text = match ctx.detach_editor() {
                Some(editor) => format!("Stopped editing {}.", editor.path().display()),
                None => "Use /edit <file> to edit a small text file.".to_string(),
            };
            reply.text(text).await;
            return;
        }

        let path = ctx.resolve_path(args);
        let (mut editor, content) = match EditorSession::open(path).await {
            Ok(opened) => opened,
            Err(e) => {
                reply.text_to(msg.id, format!("Couldn't open file: {}", e)).await;
                return;
            }
        };

        reply
            .text(format!(
                "Editing {}. Reply to the next message with the new content; edit your reply \
                 to change it again.",
                editor.path().display()
            ))
            .await;
        let shown = if content.is_empty() { "(empty file)".to_string() } else { content };
        let Some(message) = reply.text(shown).await else {
            return;
        };
        editor.bind_message(message);

        let ctx = self.contexts.get_or_create(identity);
        if let Err(e) = ctx.attach_editor(editor) {
            reply.text(format!("Couldn't edit the file: {}", e)).await;
        }
    }
}

/// `uid` or `uid/gid` when they differ.
#[cfg(unix)]
fn process_ids() -> String {
    // SAFETY: getuid and getgid cannot fail and touch no memory.
    let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
    if uid == gid {
        uid.to_string()
    } else {
        format!("{}/{}", uid, gid)
    }
}

#[cfg(not(unix))]
fn process_ids() -> String {
    "n/a".to_string()
}
