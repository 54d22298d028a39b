//! Connection registration and keep-alive commands.

use std::any::Any;

use crate::message::{expect_code, write_line};
use crate::{Command, ProtocolError};

// ---------------------------------------------------------------------------
// NICK
// ---------------------------------------------------------------------------

/// `NICK <nickname>`: sets or changes a nickname.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Nick {
    pub source: Option<String>,
    pub nickname: String,
}

impl Nick {
    pub const CODE: &'static str = "NICK";

    pub fn new(nickname: impl Into<String>) -> Self {
        Self {
            source: None,
            nickname: nickname.into(),
        }
    }

    /// Sets the `:source` prefix, e.g. the old `nick!user@host` on a
    /// nickname change broadcast.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Command for Nick {
    fn code(&self) -> &str {
        Self::CODE
    }

    fn parse(&mut self, line: &str) -> Result<(), ProtocolError> {
        let parts = expect_code(line, Self::CODE)?;
        let nickname = parts
            .param(0)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ProtocolError::missing(Self::CODE, "nickname"))?;
        self.source = parts.source.map(str::to_owned);
        self.nickname = nickname.to_owned();
        Ok(())
    }

    fn write(&self) -> String {
        write_line(self.source.as_deref(), Self::CODE, &[&self.nickname], false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// USER
// ---------------------------------------------------------------------------

/// `USER <username> <mode> <unused> :<realname>`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub mode: String,
    pub realname: String,
}

impl User {
    pub const CODE: &'static str = "USER";

    pub fn new(username: impl Into<String>, realname: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            mode: "0".to_owned(),
            realname: realname.into(),
        }
    }
}

impl Command for User {
    fn code(&self) -> &str {
        Self::CODE
    }

    fn parse(&mut self, line: &str) -> Result<(), ProtocolError> {
        let parts = expect_code(line, Self::CODE)?;
        let username = parts
            .param(0)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ProtocolError::missing(Self::CODE, "username"))?;
        let mode = parts
            .param(1)
            .ok_or_else(|| ProtocolError::missing(Self::CODE, "mode"))?;
        // Parameter 2 is unused by the protocol but still mandatory.
        parts
            .param(2)
            .ok_or_else(|| ProtocolError::missing(Self::CODE, "unused"))?;
        let realname = parts
            .param(3)
            .ok_or_else(|| ProtocolError::missing(Self::CODE, "realname"))?;

        self.username = username.to_owned();
        self.mode = mode.to_owned();
        self.realname = realname.to_owned();
        Ok(())
    }

    fn write(&self) -> String {
        write_line(
            None,
            Self::CODE,
            &[&self.username, &self.mode, "*", &self.realname],
            true,
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// PING / PONG
// ---------------------------------------------------------------------------

/// `PING :<token>`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ping {
    pub source: Option<String>,
    pub token: String,
}

impl Ping {
    pub const CODE: &'static str = "PING";

    pub fn new(token: impl Into<String>) -> Self {
        Self {
            source: None,
            token: token.into(),
        }
    }
}

impl Command for Ping {
    fn code(&self) -> &str {
        Self::CODE
    }

    fn parse(&mut self, line: &str) -> Result<(), ProtocolError> {
        let parts = expect_code(line, Self::CODE)?;
        let token = parts
            .param(0)
            .ok_or_else(|| ProtocolError::missing(Self::CODE, "token"))?;
        self.source = parts.source.map(str::to_owned);
        self.token = token.to_owned();
        Ok(())
    }

    fn write(&self) -> String {
        write_line(self.source.as_deref(), Self::CODE, &[&self.token], true)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// `PONG [<server>] :<token>`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pong {
    pub source: Option<String>,
    pub server: Option<String>,
    pub token: String,
}

impl Pong {
    pub const CODE: &'static str = "PONG";

    /// A reply from `server` echoing `token`.
    pub fn reply(server: impl Into<String>, token: impl Into<String>) -> Self {
        let server = server.into();
        Self {
            source: Some(server.clone()),
            server: Some(server),
            token: token.into(),
        }
    }
}

impl Command for Pong {
    fn code(&self) -> &str {
        Self::CODE
    }

    fn parse(&mut self, line: &str) -> Result<(), ProtocolError> {
        let parts = expect_code(line, Self::CODE)?;
        let (server, token) = match parts.params.as_slice() {
            [] => return Err(ProtocolError::missing(Self::CODE, "token")),
            [token] => (None, *token),
            [server, token, ..] => (Some(*server), *token),
        };
        self.source = parts.source.map(str::to_owned);
        self.server = server.map(str::to_owned);
        self.token = token.to_owned();
        Ok(())
    }

    fn write(&self) -> String {
        let mut params: Vec<&str> = Vec::with_capacity(2);
        if let Some(server) = &self.server {
            params.push(server);
        }
        params.push(&self.token);
        write_line(self.source.as_deref(), Self::CODE, &params, true)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// QUIT
// ---------------------------------------------------------------------------

/// `QUIT [:<reason>]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Quit {
    pub source: Option<String>,
    pub reason: Option<String>,
}

impl Quit {
    pub const CODE: &'static str = "QUIT";
}

impl Command for Quit {
    fn code(&self) -> &str {
        Self::CODE
    }

    fn parse(&mut self, line: &str) -> Result<(), ProtocolError> {
        let parts = expect_code(line, Self::CODE)?;
        self.source = parts.source.map(str::to_owned);
        self.reason = parts.param(0).map(str::to_owned);
        Ok(())
    }

    fn write(&self) -> String {
        match &self.reason {
            Some(reason) => {
                write_line(self.source.as_deref(), Self::CODE, &[reason], true)
            }
            None => write_line(self.source.as_deref(), Self::CODE, &[], false),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
