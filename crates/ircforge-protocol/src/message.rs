//! IRC parameter tokenization and line writing, shared by every command.
//!
//! A line is `[:source] CODE param* [:trailing]`. Middle parameters are
//! separated by one or more spaces; a parameter starting with `:` swallows
//! the rest of the line, spaces included.

use std::fmt::Write;

/// A line split into its source prefix, code and parameters.
///
/// Borrows from the input line; nothing is copied until a command takes
/// ownership of the fields it keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineParts<'a> {
    /// The `:source` prefix without its colon, if present.
    pub source: Option<&'a str>,
    /// The command code exactly as written (not case-folded).
    pub code: &'a str,
    /// Middle parameters followed by the trailing parameter, if any.
    pub params: Vec<&'a str>,
}

impl<'a> LineParts<'a> {
    /// Splits `line`, or returns `None` if it holds no command token.
    pub fn split(line: &'a str) -> Option<Self> {
        let mut rest = line.trim_start_matches(' ');

        let source = match rest.strip_prefix(':') {
            Some(prefixed) => {
                let (source, after) = next_token(prefixed);
                rest = after;
                Some(source)
            }
            None => None,
        };

        let (code, mut rest) = next_token(rest);
        if code.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing);
                break;
            }
            let (param, after) = next_token(rest);
            params.push(param);
            rest = after;
        }

        Some(Self {
            source,
            code,
            params,
        })
    }

    /// The `index`-th parameter, if present.
    pub fn param(&self, index: usize) -> Option<&'a str> {
        self.params.get(index).copied()
    }
}

fn next_token(input: &str) -> (&str, &str) {
    let input = input.trim_start_matches(' ');
    match input.find(' ') {
        Some(end) => (&input[..end], &input[end + 1..]),
        None => (input, ""),
    }
}

/// Returns `true` if `param` can only be sent as a trailing parameter.
pub fn needs_colon_prefix(param: &str) -> bool {
    param.is_empty() || param.contains(' ') || param.starts_with(':')
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Builds one outbound line (without terminator).
///
/// `freeform` forces the last parameter to be written as trailing, which is
/// what human-readable text (messages, reasons, topics) should always use.
pub(crate) fn write_line(
    source: Option<&str>,
    code: &str,
    params: &[&str],
    freeform: bool,
) -> String {
    let mut line = String::with_capacity(64);
    if let Some(source) = source {
        let _ = write!(line, ":{source} ");
    }
    line.push_str(code);

    let last = params.len().saturating_sub(1);
    for (i, param) in params.iter().enumerate() {
        line.push(' ');
        if i == last && (freeform || needs_colon_prefix(param)) {
            line.push(':');
        }
        line.push_str(param);
    }
    line
}

/// Checks that `parts.code` names the command being parsed.
pub(crate) fn expect_code<'a>(
    line: &'a str,
    expected: &str,
) -> Result<LineParts<'a>, crate::ProtocolError> {
    let parts = LineParts::split(line).ok_or(crate::ProtocolError::EmptyLine)?;
    if !parts.code.eq_ignore_ascii_case(expected) {
        return Err(crate::ProtocolError::CodeMismatch {
            expected: expected.to_owned(),
            found: parts.code.to_owned(),
        });
    }
    Ok(parts)
}
