//! Channel commands: JOIN, PART, TOPIC, MODE, INVITE.

use std::any::Any;

use super::split_list;
use crate::message::{expect_code, write_line};
use crate::{Command, ProtocolError};

// ---------------------------------------------------------------------------
// JOIN
// ---------------------------------------------------------------------------

/// `JOIN <channel>{,<channel>} [<key>{,<key>}]`
///
/// Keys pair with channels by position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Join {
    pub source: Option<String>,
    pub channels: Vec<String>,
    pub keys: Vec<String>,
}

impl Join {
    pub const CODE: &'static str = "JOIN";

    /// A single-channel join, as broadcast to channel members.
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            source: None,
            channels: vec![channel.into()],
            keys: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Iterates `(channel, key)` pairs.
    pub fn targets(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.channels
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), self.keys.get(i).map(String::as_str)))
    }
}

impl Command for Join {
    fn code(&self) -> &str {
        Self::CODE
    }

    fn parse(&mut self, line: &str) -> Result<(), ProtocolError> {
        let parts = expect_code(line, Self::CODE)?;
        let channels = parts.param(0).map(split_list).unwrap_or_default();
        if channels.is_empty() {
            return Err(ProtocolError::missing(Self::CODE, "channel"));
        }
        self.source = parts.source.map(str::to_owned);
        self.channels = channels;
        self.keys = parts.param(1).map(split_list).unwrap_or_default();
        Ok(())
    }

    fn write(&self) -> String {
        let channels = self.channels.join(",");
        let keys = self.keys.join(",");
        let mut params = vec![channels.as_str()];
        if !keys.is_empty() {
            params.push(&keys);
        }
        write_line(self.source.as_deref(), Self::CODE, &params, false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// PART
// ---------------------------------------------------------------------------

/// `PART <channel>{,<channel>} [:<reason>]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Part {
    pub source: Option<String>,
    pub channels: Vec<String>,
    pub reason: Option<String>,
}

impl Part {
    pub const CODE: &'static str = "PART";

    pub fn new(channel: impl Into<String>, reason: Option<String>) -> Self {
        Self {
            source: None,
            channels: vec![channel.into()],
            reason,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Command for Part {
    fn code(&self) -> &str {
        Self::CODE
    }

    fn parse(&mut self, line: &str) -> Result<(), ProtocolError> {
        let parts = expect_code(line, Self::CODE)?;
        let channels = parts.param(0).map(split_list).unwrap_or_default();
        if channels.is_empty() {
            return Err(ProtocolError::missing(Self::CODE, "channel"));
        }
        self.source = parts.source.map(str::to_owned);
        self.channels = channels;
        self.reason = parts.param(1).map(str::to_owned);
        Ok(())
    }

    fn write(&self) -> String {
        let channels = self.channels.join(",");
        match &self.reason {
            Some(reason) => write_line(
                self.source.as_deref(),
                Self::CODE,
                &[&channels, reason],
                true,
            ),
            None => {
                write_line(self.source.as_deref(), Self::CODE, &[&channels], false)
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// TOPIC
// ---------------------------------------------------------------------------

/// `TOPIC <channel> [:<topic>]`
///
/// `topic: None` queries the topic; `Some("")` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topic {
    pub source: Option<String>,
    pub channel: String,
    pub topic: Option<String>,
}

impl Topic {
    pub const CODE: &'static str = "TOPIC";

    pub fn new(channel: impl Into<String>, topic: Option<String>) -> Self {
        Self {
            source: None,
            channel: channel.into(),
            topic,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Command for Topic {
    fn code(&self) -> &str {
        Self::CODE
    }

    fn parse(&mut self, line: &str) -> Result<(), ProtocolError> {
        let parts = expect_code(line, Self::CODE)?;
        let channel = parts
            .param(0)
            .ok_or_else(|| ProtocolError::missing(Self::CODE, "channel"))?;
        self.source = parts.source.map(str::to_owned);
        self.channel = channel.to_owned();
        self.topic = parts.param(1).map(str::to_owned);
        Ok(())
    }

    fn write(&self) -> String {
        match &self.topic {
            Some(topic) => write_line(
                self.source.as_deref(),
                Self::CODE,
                &[&self.channel, topic],
                true,
            ),
            None => write_line(
                self.source.as_deref(),
                Self::CODE,
                &[&self.channel],
                false,
            ),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// MODE
// ---------------------------------------------------------------------------

/// `MODE <target> [<modestring> [<param>...]]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mode {
    pub source: Option<String>,
    pub target: String,
    pub modes: Option<String>,
    pub params: Vec<String>,
}

impl Mode {
    pub const CODE: &'static str = "MODE";

    pub fn new(
        target: impl Into<String>,
        modes: impl Into<String>,
        params: Vec<String>,
    ) -> Self {
        Self {
            source: None,
            target: target.into(),
            modes: Some(modes.into()),
            params,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Command for Mode {
    fn code(&self) -> &str {
        Self::CODE
    }

    fn parse(&mut self, line: &str) -> Result<(), ProtocolError> {
        let parts = expect_code(line, Self::CODE)?;
        let target = parts
            .param(0)
            .ok_or_else(|| ProtocolError::missing(Self::CODE, "target"))?;
        self.source = parts.source.map(str::to_owned);
        self.target = target.to_owned();
        self.modes = parts.param(1).map(str::to_owned);
        self.params = parts
            .params
            .iter()
            .skip(2)
            .map(|p| (*p).to_owned())
            .collect();
        Ok(())
    }

    fn write(&self) -> String {
        let mut params: Vec<&str> = vec![self.target.as_str()];
        if let Some(modes) = &self.modes {
            params.push(modes);
            params.extend(self.params.iter().map(String::as_str));
        }
        write_line(self.source.as_deref(), Self::CODE, &params, false)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// INVITE
// ---------------------------------------------------------------------------

/// `INVITE <nickname> <channel>`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invite {
    pub source: Option<String>,
    pub nickname: String,
    pub channel: String,
}

impl Invite {
    pub const CODE: &'static str = "INVITE";

    pub fn new(nickname: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            source: None,
            nickname: nickname.into(),
            channel: channel.into(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Command for Invite {
    fn code(&self) -> &str {
        Self::CODE
    }

    fn parse(&mut self, line: &str) -> Result<(), ProtocolError> {
        let parts = expect_code(line, Self::CODE)?;
        let nickname = parts
            .param(0)
            .ok_or_else(|| ProtocolError::missing(Self::CODE, "nickname"))?;
        let channel = parts
            .param(1)
            .ok_or_else(|| ProtocolError::missing(Self::CODE, "channel"))?;
        self.source = parts.source.map(str::to_owned);
        self.nickname = nickname.to_owned();
        self.channel = channel.to_owned();
        Ok(())
    }

    fn write(&self) -> String {
        write_line(
            self.source.as_deref(),
            Self::CODE,
            &[&self.nickname, &self.channel],
            false,
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_parse_pairs_keys_by_position() {
        let mut join = Join::default();
        join.parse("JOIN #a,#b,#c key1,key2").unwrap();
        let targets: Vec<_> = join.targets().collect();
        assert_eq!(
            targets,
            vec![("#a", Some("key1")), ("#b", Some("key2")), ("#c", None)]
        );
    }

    #[test]
    fn test_join_parse_without_channel_returns_missing() {
        let mut join = Join::default();
        assert_eq!(
            join.parse("JOIN").unwrap_err(),
            ProtocolError::missing("JOIN", "channel")
        );
    }

    #[test]
    fn test_join_with_source_writes_prefix() {
        let join = Join::new("#rust").with_source("bob!b@host");
        assert_eq!(join.write(), ":bob!b@host JOIN #rust");
    }

    #[test]
    fn test_part_reason_parses_back_equal() {
        let part = Part::new("#rust", Some("gone fishing".into()))
            .with_source("bob!b@host");
        let mut parsed = Part::default();
        parsed.parse(&part.write()).unwrap();
        assert_eq!(parsed, part);
    }

    #[test]
    fn test_topic_empty_trailing_means_clear() {
        let mut topic = Topic::default();
        topic.parse("TOPIC #a :").unwrap();
        assert_eq!(topic.topic.as_deref(), Some(""));
        assert_eq!(topic.write(), "TOPIC #a :");
    }

    #[test]
    fn test_topic_without_text_is_query() {
        let mut topic = Topic::default();
        topic.parse("TOPIC #a").unwrap();
        assert_eq!(topic.topic, None);
    }

    #[test]
    fn test_mode_parse_collects_params() {
        let mut mode = Mode::default();
        mode.parse("MODE #a +kl secret 10").unwrap();
        assert_eq!(mode.target, "#a");
        assert_eq!(mode.modes.as_deref(), Some("+kl"));
        assert_eq!(mode.params, vec!["secret", "10"]);
    }

    #[test]
    fn test_mode_query_writes_target_only() {
        let mut mode = Mode::default();
        mode.parse("MODE #a").unwrap();
        assert_eq!(mode.write(), "MODE #a");
    }

    #[test]
    fn test_invite_parse_requires_channel() {
        let mut invite = Invite::default();
        assert_eq!(
            invite.parse("INVITE bob").unwrap_err(),
            ProtocolError::missing("INVITE", "channel")
        );
    }
}
