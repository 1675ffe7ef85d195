//! Output processing.
//!
//! - Terminal control sequence stripping
//! - Framing of output text into chat messages
//!
//! # Example
//!
//! ```
//! use shell_bot::output::{Frame, OutputFramer, OutputSanitizer};
//!
//! let text = OutputSanitizer::strip_ansi(b"\x1b[31mRed text\x1b[0m");
//! assert_eq!(text, "Red text");
//!
//! let mut framer = OutputFramer::new();
//! assert_eq!(framer.frame(&text, true), vec![Frame::Send("Red text".into())]);
//! ```

mod framing;
mod sanitizer;

pub use framing::{split_chars, Frame, OutputFramer};
pub use sanitizer::OutputSanitizer;
