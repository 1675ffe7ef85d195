//! Command-line interface for shell-bot.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Bot API token (overrides config file).
    pub token: Option<String>,
    /// Owner chat identity (overrides config file).
    pub owner: Option<i64>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('t') | Long("token") => {
                result.token = Some(parser.value()?.parse()?);
            }
            Short('o') | Long("owner") => {
                let value: String = parser.value()?.parse()?;
                result.owner = Some(
                    value
                        .trim()
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("owner", value))?,
                );
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"shell-bot {version}
Drive interactive shell sessions on this host through a Telegram bot

USAGE:
    shell-bot [OPTIONS]

OPTIONS:
    -c, --config <FILE>     Path to configuration file [default: config.json]
    -t, --token <TOKEN>     Bot API token
    -o, --owner <ID>        Chat ID of the bot owner
    -l, --log-level <LVL>   Log level (error, warn, info, debug, trace)
    -h, --help              Print help
    -V, --version           Print version

ENVIRONMENT VARIABLES:
    SHELL_BOT_TOKEN         Bot API token (overrides config)
    SHELL_BOT_OWNER         Owner chat ID (overrides config)
    SHELL_BOT_LOG_LEVEL     Log level (overrides config)
    RUST_LOG                Alternative log level setting

Variables starting with SHELL_BOT_ are not passed on to commands.

EXAMPLES:
    # Start with ./config.json
    shell-bot

    # Start without a config file
    shell-bot -t 123456:ABC-DEF -o 987654321
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("shell-bot {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
