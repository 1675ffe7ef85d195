//! POSIX signal names and delivery.

use std::fmt;
use std::str::FromStr;

use crate::error::ShellBotError;
use crate::Result;

/// A named POSIX signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal {
    name: &'static str,
    #[cfg(unix)]
    number: libc::c_int,
}

#[cfg(unix)]
const SIGNALS: &[(&str, libc::c_int)] = &[
    ("SIGHUP", libc::SIGHUP),
    ("SIGINT", libc::SIGINT),
    ("SIGQUIT", libc::SIGQUIT),
    ("SIGILL", libc::SIGILL),
    ("SIGTRAP", libc::SIGTRAP),
    ("SIGABRT", libc::SIGABRT),
    ("SIGBUS", libc::SIGBUS),
    ("SIGFPE", libc::SIGFPE),
    ("SIGKILL", libc::SIGKILL),
    ("SIGSEGV", libc::SIGSEGV),
    ("SIGPIPE", libc::SIGPIPE),
    ("SIGALRM", libc::SIGALRM),
    ("SIGTERM", libc::SIGTERM),
    ("SIGCHLD", libc::SIGCHLD),
    ("SIGCONT", libc::SIGCONT),
    ("SIGSTOP", libc::SIGSTOP),
    ("SIGTSTP", libc::SIGTSTP),
    ("SIGTTIN", libc::SIGTTIN),
    ("SIGTTOU", libc::SIGTTOU),
    ("SIGURG", libc::SIGURG),
    ("SIGXCPU", libc::SIGXCPU),
    ("SIGXFSZ", libc::SIGXFSZ),
    ("SIGVTALRM", libc::SIGVTALRM),
    ("SIGPROF", libc::SIGPROF),
    ("SIGWINCH", libc::SIGWINCH),
    ("SIGIO", libc::SIGIO),
    ("SIGSYS", libc::SIGSYS),
];

impl Signal {
    /// SIGINT, sent by `/cancel`.
    #[cfg(unix)]
    pub const INT: Signal = Signal {
        name: "SIGINT",
        number: libc::SIGINT,
    };

    /// SIGTERM, sent by `/kill`.
    #[cfg(unix)]
    pub const TERM: Signal = Signal {
        name: "SIGTERM",
        number: libc::SIGTERM,
    };

    /// Canonical name, e.g. `SIGINT`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Normalize a user-supplied signal name: trimmed, uppercased and
    /// prefixed with `SIG` when missing.
    pub fn normalize(name: &str) -> String {
        let upper = name.trim().to_ascii_uppercase();
        if upper.starts_with("SIG") {
            upper
        } else {
            format!("SIG{}", upper)
        }
    }

    /// Look up a signal by name or by its `strsignal(3)` description,
    /// e.g. `Terminated` for SIGTERM.
    #[cfg(unix)]
    pub fn from_description(description: &str) -> Option<Signal> {
        if let Ok(signal) = description.parse() {
            return Some(signal);
        }
        SIGNALS
            .iter()
            .find(|&&(_, number)| describe(number).is_some_and(|d| d == description))
            .map(|&(name, number)| Signal { name, number })
    }

    /// Deliver the signal to process `pid`.
    #[cfg(unix)]
    pub fn send_to_process(&self, pid: i32) -> Result<()> {
        // SAFETY: kill(2) has no memory-safety preconditions.
        let rc = unsafe { libc::kill(pid, self.number) };
        check(rc, self.name)
    }

    /// Deliver the signal to every member of process group `pgid`.
    #[cfg(unix)]
    pub fn send_to_group(&self, pgid: i32) -> Result<()> {
        // SAFETY: killpg(2) has no memory-safety preconditions.
        let rc = unsafe { libc::killpg(pgid, self.number) };
        check(rc, self.name)
    }
}

#[cfg(unix)]
fn describe(number: libc::c_int) -> Option<String> {
    // SAFETY: strsignal returns null or a NUL-terminated string, copied
    // out before any other strsignal call can overwrite it.
    unsafe {
        let text = libc::strsignal(number);
        if text.is_null() {
            None
        } else {
            Some(std::ffi::CStr::from_ptr(text).to_string_lossy().into_owned())
        }
    }
}

#[cfg(unix)]
fn check(rc: libc::c_int, name: &str) -> Result<()> {
    if rc == 0 {
        Ok(())
    } else {
        let err = std::io::Error::last_os_error();
        Err(ShellBotError::Delivery(format!("{}: {}", name, err)))
    }
}

impl FromStr for Signal {
    type Err = ShellBotError;

    fn from_str(s: &str) -> Result<Self> {
        let name = Signal::normalize(s);
        let well_formed = name.len() > 3 && name[3..].chars().all(|c| c.is_ascii_uppercase());
        if !well_formed {
            return Err(ShellBotError::Delivery(format!("invalid signal name: {}", s)));
        }

        #[cfg(unix)]
        {
            SIGNALS
                .iter()
                .find(|(known, _)| *known == name)
                .map(|&(name, number)| Signal { name, number })
                .ok_or_else(|| ShellBotError::Delivery(format!("unknown signal: {}", name)))
        }
        #[cfg(not(unix))]
        {
            Err(ShellBotError::Delivery(format!(
                "signals are not supported on this platform: {}",
                name
            )))
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
