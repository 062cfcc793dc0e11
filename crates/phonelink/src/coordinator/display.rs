//! Operator-facing terminal output.
//!
//! Status lines are plain human-readable text, one per line. Relayed output
//! and status go to stdout, diagnostics to stderr.

use std::io::Write;
use std::sync::{Arc, Mutex};

/// Destination for human-readable status lines.
pub trait Terminal {
    fn out(&mut self, line: &str);
    fn err(&mut self, line: &str);
}

/// Writes to the real stdout/stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdTerminal;

impl Terminal for StdTerminal {
    fn out(&mut self, line: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{line}");
        let _ = stdout.flush();
    }

    fn err(&mut self, line: &str) {
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }
}

/// Which stream a recorded line was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Out,
    Err,
}

/// Records lines in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct BufferTerminal {
    lines: Arc<Mutex<Vec<(Stream, String)>>>,
}

impl BufferTerminal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn lines(&self) -> Vec<(Stream, String)> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Whether any line on `stream` equals `text`.
    pub fn contains(&self, stream: Stream, text: &str) -> bool {
        self.lines().iter().any(|(s, l)| *s == stream && l == text)
    }

    fn push(&self, stream: Stream, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((stream, line.to_string()));
        }
    }
}

impl Terminal for BufferTerminal {
    fn out(&mut self, line: &str) {
        self.push(Stream::Out, line);
    }

    fn err(&mut self, line: &str) {
        self.push(Stream::Err, line);
    }
}

/// Longest line shown in one piece. Longer output is split.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// Reassembles chunked output into complete lines for display.
///
/// Output without newlines is emitted in pieces of at most `max_line`
/// bytes, so a chatty process cannot grow the buffer without bound.
#[derive(Debug)]
pub struct LineAssembler {
    partial: Vec<u8>,
    max_line: usize,
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_BYTES)
    }
}

impl LineAssembler {
    pub fn new(max_line: usize) -> Self {
        Self {
            partial: Vec::new(),
            max_line: max_line.max(4),
        }
    }

    /// Append a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(chunk);
        let mut lines = Vec::new();
        if let Some(last_nl) = self.partial.iter().rposition(|&b| b == b'\n') {
            let rest = self.partial.split_off(last_nl + 1);
            let complete = std::mem::replace(&mut self.partial, rest);
            lines.extend(complete[..last_nl].split(|&b| b == b'\n').map(decode_line));
        }
        while self.partial.len() > self.max_line {
            let rest = self.partial.split_off(char_cut(&self.partial, self.max_line));
            let head = std::mem::replace(&mut self.partial, rest);
            lines.push(decode_line(&head));
        }
        lines
    }

    /// Take whatever unterminated text is left.
    pub fn flush(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.partial);
        Some(decode_line(&rest))
    }
}

/// Largest cut point `<= at` that does not split a UTF-8 sequence.
/// `bytes` must be longer than `at`.
fn char_cut(bytes: &[u8], at: usize) -> usize {
    let mut cut = at;
    while cut > 0 && bytes[cut] & 0xC0 == 0x80 {
        cut -= 1;
    }
    if cut == 0 { at } else { cut }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn assembles_lines_across_chunks() {
        let mut lines = LineAssembler::default();
        assert!(lines.push(b"Phone IP: 19").is_empty());
        assert_eq!(lines.push(b"2.168.1.5\nPort"), vec!["Phone IP: 192.168.1.5"]);
        assert_eq!(lines.push(b": 8080\r\n\nready"), vec!["Port: 8080", ""]);
        assert_eq!(lines.flush().as_deref(), Some("ready"));
        assert_eq!(lines.flush(), None);
    }

    #[test]
    fn multibyte_chars_split_across_chunks_survive() {
        let mut lines = LineAssembler::default();
        let text = "héllo\n".as_bytes();
        assert!(lines.push(&text[..2]).is_empty());
        assert_eq!(lines.push(&text[2..]), vec!["héllo"]);
    }

    #[test]
    fn output_without_newlines_is_split_at_the_ceiling() {
        let mut lines = LineAssembler::new(8);
        assert!(lines.push(b"abcdef").is_empty());
        assert_eq!(lines.push(b"ghijklmnopqrs"), vec!["abcdefgh", "ijklmnop"]);
        assert_eq!(lines.push(b"\n"), vec!["qrs"]);
        assert_eq!(lines.flush(), None);
    }

    #[test]
    fn ceiling_split_keeps_chars_whole() {
        let mut lines = LineAssembler::new(8);
        // 'é' is two bytes and would straddle the 8-byte cut.
        assert_eq!(lines.push("abcdefgéxyz".as_bytes()), vec!["abcdefg"]);
        assert_eq!(lines.flush().as_deref(), Some("éxyz"));
    }

    #[test]
    fn buffer_terminal_clones_share_lines() {
        let terminal = BufferTerminal::new();
        let mut writer = terminal.clone();
        writer.out("hello");
        writer.err("oops");
        assert!(terminal.contains(Stream::Out, "hello"));
        assert!(terminal.contains(Stream::Err, "oops"));
        assert!(!terminal.contains(Stream::Out, "oops"));
    }
}
