//! PRIVMSG and NOTICE. Same shape, different code: NOTICE never triggers
//! automatic replies.

use std::any::Any;

use crate::message::{expect_code, write_line, LineParts};
use crate::{Command, ProtocolError};

fn parse_message<'a>(
    line: &'a str,
    code: &str,
) -> Result<(LineParts<'a>, &'a str, &'a str), ProtocolError> {
    let parts = expect_code(line, code)?;
    let target = parts
        .param(0)
        .ok_or_else(|| ProtocolError::missing(code, "target"))?;
    let text = parts
        .param(1)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ProtocolError::missing(code, "text"))?;
    Ok((parts, target, text))
}

/// `PRIVMSG <target> :<text>`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Privmsg {
    pub source: Option<String>,
    pub target: String,
    pub text: String,
}

impl Privmsg {
    pub const CODE: &'static str = "PRIVMSG";

    pub fn new(target: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: None,
            target: target.into(),
            text: text.into(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Command for Privmsg {
    fn code(&self) -> &str {
        Self::CODE
    }

    fn parse(&mut self, line: &str) -> Result<(), ProtocolError> {
        let (parts, target, text) = parse_message(line, Self::CODE)?;
        self.source = parts.source.map(str::to_owned);
        self.target = target.to_owned();
        self.text = text.to_owned();
        Ok(())
    }

    fn write(&self) -> String {
        write_line(
            self.source.as_deref(),
            Self::CODE,
            &[&self.target, &self.text],
            true,
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// `NOTICE <target> :<text>`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notice {
    pub source: Option<String>,
    pub target: String,
    pub text: String,
}

impl Notice {
    pub const CODE: &'static str = "NOTICE";

    pub fn new(target: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: None,
            target: target.into(),
            text: text.into(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Command for Notice {
    fn code(&self) -> &str {
        Self::CODE
    }

    fn parse(&mut self, line: &str) -> Result<(), ProtocolError> {
        let (parts, target, text) = parse_message(line, Self::CODE)?;
        self.source = parts.source.map(str::to_owned);
        self.target = target.to_owned();
        self.text = text.to_owned();
        Ok(())
    }

    fn write(&self) -> String {
        write_line(
            self.source.as_deref(),
            Self::CODE,
            &[&self.target, &self.text],
            true,
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
