//! Numeric replies and the fallback for lines nobody registered.

use std::any::Any;

use crate::message::{write_line, LineParts};
use crate::{Command, ProtocolError};

// ---------------------------------------------------------------------------
// Reply
// ---------------------------------------------------------------------------

/// A server numeric: `:<server> <NNN> <target> <param>* :<last>`.
///
/// The last parameter is always written as trailing, which keeps the
/// output stable through a parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub source: Option<String>,
    /// Three ASCII digits.
    pub code: String,
    pub target: String,
    pub params: Vec<String>,
}

impl Reply {
    pub fn new(
        server: impl Into<String>,
        numeric: u16,
        target: impl Into<String>,
        params: Vec<String>,
    ) -> Self {
        Self {
            source: Some(server.into()),
            code: format!("{numeric:03}"),
            target: target.into(),
            params,
        }
    }

    /// The numeric value of [`code`](Self::code), if it is well formed.
    pub fn numeric(&self) -> Option<u16> {
        if is_numeric_code(&self.code) {
            self.code.parse().ok()
        } else {
            None
        }
    }
}

fn is_numeric_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_digit())
}

impl Command for Reply {
    fn code(&self) -> &str {
        &self.code
    }

    fn parse(&mut self, line: &str) -> Result<(), ProtocolError> {
        let parts = LineParts::split(line).ok_or(ProtocolError::EmptyLine)?;
        if !is_numeric_code(parts.code) {
            return Err(ProtocolError::invalid(
                parts.code,
                "numeric replies need a three-digit code",
            ));
        }
        let target = parts
            .param(0)
            .ok_or_else(|| ProtocolError::missing(parts.code, "target"))?;

        self.source = parts.source.map(str::to_owned);
        self.code = parts.code.to_owned();
        self.target = target.to_owned();
        self.params = parts.params[1..].iter().map(|p| (*p).to_owned()).collect();
        Ok(())
    }

    fn write(&self) -> String {
        let mut params: Vec<&str> = Vec::with_capacity(self.params.len() + 1);
        params.push(&self.target);
        params.extend(self.params.iter().map(String::as_str));
        write_line(
            self.source.as_deref(),
            &self.code,
            &params,
            !self.params.is_empty(),
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Unparsed
// ---------------------------------------------------------------------------

/// A line whose code is not in the registry.
///
/// The raw line is kept so it can be logged or passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Unparsed {
    /// Upper-cased first token (after any source prefix).
    pub code: String,
    pub line: String,
}

impl Command for Unparsed {
    fn code(&self) -> &str {
        &self.code
    }

    fn parse(&mut self, line: &str) -> Result<(), ProtocolError> {
        let parts = LineParts::split(line).ok_or(ProtocolError::EmptyLine)?;
        self.code = parts.code.to_ascii_uppercase();
        self.line = line.to_owned();
        Ok(())
    }

    fn write(&self) -> String {
        self.line.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
