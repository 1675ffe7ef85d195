//! Output sanitization for stripping terminal control sequences.

use vte::{Params, Parser, Perform};

/// Streaming output sanitizer using a VTE parser.
///
/// Escape sequences may be split across PTY reads, so the parser state is
/// kept between calls to [`OutputSanitizer::feed`].
pub struct OutputSanitizer {
    parser: Parser,
    extractor: PlainTextExtractor,
}

impl OutputSanitizer {
    /// Create a sanitizer with an empty parser state.
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            extractor: PlainTextExtractor::default(),
        }
    }

    /// Feed raw PTY bytes and return the plain text they contain.
    pub fn feed(&mut self, input: &[u8]) -> String {
        self.parser.advance(&mut self.extractor, input);
        self.extractor.take()
    }

    /// Strip control sequences from a complete buffer.
    pub fn strip_ansi(input: &[u8]) -> String {
        Self::new().feed(input)
    }
}

impl Default for OutputSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

/// VTE performer that extracts plain text.
#[derive(Default)]
struct PlainTextExtractor {
    output: String,
    /// A bare CR was seen; the next text overwrites the current line.
    carriage_return: bool,
}

impl PlainTextExtractor {
    fn take(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    /// Drop the part of the current line still held in the buffer.
    fn rewind_line(&mut self) {
        if std::mem::take(&mut self.carriage_return) {
            let start = self.output.rfind('\n').map_or(0, |i| i + 1);
            self.output.truncate(start);
        }
    }
}

impl Perform for PlainTextExtractor {
    fn print(&mut self, c: char) {
        self.rewind_line();
        self.output.push(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\r' => self.carriage_return = true,
            b'\n' => {
                self.carriage_return = false;
                self.output.push('\n');
            }
            b'\t' => {
                self.rewind_line();
                self.output.push('\t');
            }
            // Backspace erases the previous character on the current line.
            0x08 => {
                if self.output.chars().last().is_some_and(|c| c != '\n') {
                    self.output.pop();
                }
            }
            // BEL and the rest are dropped.
            _ => {}
        }
    }

    fn hook(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, _action: char) {}

    fn put(&mut self, _byte: u8) {}

    fn unhook(&mut self) {}

    fn osc_dispatch(&mut self, _params: &[&[u8]], _bell_terminated: bool) {}

    fn csi_dispatch(
        &mut self,
        _params: &Params,
        _intermediates: &[u8],
        _ignore: bool,
        _action: char,
    ) {
    }

    fn esc_dispatch(&mut self, _intermediates: &[u8], _ignore: bool, _byte: u8) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text() {
        assert_eq!(OutputSanitizer::strip_ansi(b"hello world"), "hello world");
    }

    #[test]
    fn test_strip_color_codes() {
        assert_eq!(OutputSanitizer::strip_ansi(b"\x1b[31mred\x1b[0m"), "red");
    }

    #[test]
    fn test_crlf_becomes_lf() {
        assert_eq!(
            OutputSanitizer::strip_ansi(b"line1\r\nline2\r\n"),
            "line1\nline2\n"
        );
    }

    #[test]
    fn test_carriage_return_rewrites_line() {
        assert_eq!(
            OutputSanitizer::strip_ansi(b"done\n10%\r20%\r30%\r\n"),
            "done\n30%\n"
        );
    }

    #[test]
    fn test_carriage_return_across_chunks() {
        let mut sanitizer = OutputSanitizer::new();
        assert_eq!(sanitizer.feed(b"a\n10%\r"), "a\n10%");
        assert_eq!(sanitizer.feed(b"20%\r\n"), "20%\n");
    }

    #[test]
    fn test_strip_cursor_movement() {
        assert_eq!(OutputSanitizer::strip_ansi(b"\x1b[2J\x1b[Hcontent"), "content");
    }

    #[test]
    fn test_osc_title() {
        let input = b"\x1b]0;Window Title\x07actual content";
        assert_eq!(OutputSanitizer::strip_ansi(input), "actual content");
    }

    #[test]
    fn test_backspace_erases() {
        assert_eq!(OutputSanitizer::strip_ansi(b"abc\x08\x08d"), "ad");
        assert_eq!(OutputSanitizer::strip_ansi(b"a\n\x08b"), "a\nb");
    }

    #[test]
    fn test_sequence_split_across_chunks() {
        let mut sanitizer = OutputSanitizer::new();
        assert_eq!(sanitizer.feed(b"before\x1b["), "before");
        assert_eq!(sanitizer.feed(b"31mafter"), "after");
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let bytes = "héllo".as_bytes();
        let mut sanitizer = OutputSanitizer::new();
        let mut out = sanitizer.feed(&bytes[..2]);
        out.push_str(&sanitizer.feed(&bytes[2..]));
        assert_eq!(out, "héllo");
    }

    #[test]
    fn test_only_escape_codes() {
        assert_eq!(OutputSanitizer::strip_ansi(b"\x1b[31m\x1b[0m\x1b[2J"), "");
    }
}
