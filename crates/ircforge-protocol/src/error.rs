//! Error types for the protocol layer.
//!
//! Framing never fails, so every variant here describes a single line
//! that could not be turned into its command. The parser logs these and
//! moves on to the next line.

/// Errors produced while parsing one protocol line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The line had no command token at all.
    #[error("empty line")]
    EmptyLine,

    /// The line's command token does not match the command parsing it.
    #[error("expected {expected}, got {found}")]
    CodeMismatch { expected: String, found: String },

    /// A required parameter is missing.
    ///
    /// `name` is the parameter's role, e.g. `"nickname"` or `"target"`.
    #[error("{code}: missing parameter <{name}>")]
    MissingParameter { code: String, name: &'static str },

    /// A parameter is present but malformed.
    #[error("{code}: invalid parameter: {reason}")]
    InvalidParameter { code: String, reason: String },
}

impl ProtocolError {
    pub(crate) fn missing(code: &str, name: &'static str) -> Self {
        Self::MissingParameter {
            code: code.to_owned(),
            name,
        }
    }

    pub(crate) fn invalid(code: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            code: code.to_owned(),
            reason: reason.into(),
        }
    }
}
