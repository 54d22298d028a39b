//! Line framing.
//!
//! A line ends at `\n`, at `\r`, or at the `\r\n` pair. Empty segments
//! are dropped, which also covers `\n\r` (two terminators around an
//! empty line). Whatever follows the last terminator is returned as the
//! final line: the framer works on one buffer at a time and cannot know
//! whether more bytes are coming. Stream transports hold partial lines
//! back for exactly that reason.
//!
//! Two implementations live here. [`frame`] is a single pass over the
//! bytes and is what the parser uses. [`frame_reference`] is a regex
//! split, kept as an oracle for tests and benchmarks.

use std::sync::LazyLock;

use regex::Regex;

/// Splits `buffer` into non-empty protocol lines.
///
/// Invalid UTF-8 is replaced with `U+FFFD`. Never fails.
///
/// ```rust
/// use ircforge_protocol::frame;
///
/// let lines = frame(b"NICK bob\r\nUSER b 0 * :Bob\n\rPING");
/// assert_eq!(lines, vec!["NICK bob", "USER b 0 * :Bob", "PING"]);
/// ```
pub fn frame(buffer: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < buffer.len() {
        let byte = buffer[i];
        if byte == b'\r' || byte == b'\n' {
            push_segment(&mut lines, &buffer[start..i]);
            // `\r\n` is one boundary, not two.
            if byte == b'\r' && buffer.get(i + 1) == Some(&b'\n') {
                i += 1;
            }
            start = i + 1;
        }
        i += 1;
    }

    push_segment(&mut lines, &buffer[start..]);
    lines
}

fn push_segment(lines: &mut Vec<String>, segment: &[u8]) {
    if !segment.is_empty() {
        lines.push(String::from_utf8_lossy(segment).into_owned());
    }
}

static TERMINATORS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\r\n|\r|\n").expect("terminator pattern is a valid regex")
});

/// Regex-based framing with the same contract as [`frame`].
///
/// Slower, but obviously correct. Both functions must agree on every
/// input.
pub fn frame_reference(buffer: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(buffer);
    TERMINATORS
        .split(&text)
        .filter(|segment| !segment.is_empty())
        .map(str::to_owned)
        .collect()
}
