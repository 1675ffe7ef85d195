//! Command parsing and argument validation.
//!
//! Turns message text into a [`Command`] and validates the argument
//! shapes commands accept. Nothing here touches bot state.

use std::sync::LazyLock;

use regex::Regex;

use crate::pty::PtySize;

/// `<cols>x<rows>`, `<cols> <rows>`, `<cols>,<rows>`, `<cols>;<rows>` or
/// `<cols> by <rows>`.
static SIZE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d+)\s*(?:\sby\s|x|\s|,|;)\s*(\d+)$").expect("size pattern is valid")
});

/// A protocol command with its raw argument tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/run <command line>`
    Run(String),
    /// `/r <text>`: `/enter` while a command runs, `/run` otherwise.
    RunOrEnter(String),
    Enter(String),
    Type(String),
    Ctrl(String),
    Alt(String),
    /// `/cancel [signal]`: signal the foreground process group.
    Cancel(String),
    /// `/kill [signal]`: signal the root process.
    Kill(String),
    End,
    Redraw,
    Keypad,
    Status,
    Shell(String),
    Cd(String),
    Env(String),
    Resize(String),
    SetSilent(String),
    SetInteractive(String),
    SetLinkPreviews(String),
    Grant(String),
    Revoke(String),
    Token,
    Upload(String),
    Edit(String),
    Start(String),
    Help,
    Unknown(String),
}

impl Command {
    /// Parse `/name[@bot] [args]`. Returns `None` for text that is not a
    /// command.
    pub fn parse(text: &str) -> Option<Command> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let (head, args) = match rest.find(char::is_whitespace) {
            Some(idx) => (&rest[..idx], rest[idx..].trim()),
            None => (rest, ""),
        };
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
        if name.is_empty() {
            return None;
        }
        let args = args.to_string();

        Some(match name.as_str() {
            "run" => Command::Run(args),
            "r" => Command::RunOrEnter(args),
            "enter" => Command::Enter(args),
            "type" => Command::Type(args),
            "ctrl" => Command::Ctrl(args),
            "alt" => Command::Alt(args),
            "cancel" => Command::Cancel(args),
            "kill" => Command::Kill(args),
            "end" => Command::End,
            "redraw" => Command::Redraw,
            "keypad" => Command::Keypad,
            "status" => Command::Status,
            "shell" => Command::Shell(args),
            "cd" => Command::Cd(args),
            "env" => Command::Env(args),
            "resize" => Command::Resize(args),
            "setsilent" => Command::SetSilent(args),
            "setinteractive" => Command::SetInteractive(args),
            "setlinkpreviews" => Command::SetLinkPreviews(args),
            "grant" => Command::Grant(args),
            "revoke" => Command::Revoke(args),
            "token" => Command::Token,
            "upload" => Command::Upload(args),
            "edit" => Command::Edit(args),
            "start" => Command::Start(args),
            "help" => Command::Help,
            _ => Command::Unknown(name),
        })
    }
}

/// Parse a terminal size; both dimensions must be positive.
pub fn parse_size(args: &str) -> Option<PtySize> {
    let caps = SIZE_PATTERN.captures(args.trim())?;
    let cols: u16 = caps[1].parse().ok()?;
    let rows: u16 = caps[2].parse().ok()?;
    (cols > 0 && rows > 0).then(|| PtySize::new(rows, cols))
}

/// Parse a yes/no setting value.
pub fn parse_bool(args: &str) -> Option<bool> {
    match args.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "on" | "1" => Some(true),
        "no" | "n" | "false" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// What `/env` was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvRequest {
    Show(String),
    /// Set a variable; an empty value unsets it.
    Set(String, String),
}

/// Parse `/env NAME`, `/env NAME=value` or `/env NAME value`.
pub fn parse_env(args: &str) -> Option<EnvRequest> {
    let args = args.trim_start();
    let split = args.find('=').or_else(|| args.find(char::is_whitespace));

    let (key, value) = match split {
        Some(idx) => (args[..idx].trim(), Some(&args[idx + 1..])),
        None => (args.trim(), None),
    };
    let valid = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return None;
    }

    Some(match value {
        Some(value) => EnvRequest::Set(key.to_string(), value.to_string()),
        None => EnvRequest::Show(key.to_string()),
    })
}

pub const HELP_TEXT: &str = "\
Use /run <command> and I'll execute it for you. While it's running, you can:

‣ Reply to one of my messages to send input to the command, or use /enter.
‣ Use /end to send an EOF (Ctrl+D) to the command.
‣ Use /cancel to send SIGINT (Ctrl+C) to the process group, or the signal you choose.
‣ Use /kill to send SIGTERM to the root process, or the signal you choose.
‣ For graphical applications, use /redraw to force a repaint of the screen.
‣ Use /type or /ctrl to press keys, /alt to send the next key with Alt, or /keypad to show a keyboard for special keys.

You can see the current status and settings for this chat with /status. Use /env to manipulate the environment, /cd to change the current directory, /shell to see or change the shell used to run commands and /resize to change the size of the terminal.

By default, output messages are sent silently (without sound) and links are not expanded. This can be changed through /setsilent and /setlinkpreviews.

Additional features

Use /upload <file> and I'll send you that file. If you reply to that message by uploading me a file, I'll overwrite it with yours. Files sent in reply to a /cd message are saved in that directory.
Use /edit <file> to edit a small text file: reply to the file message with the new content.";
