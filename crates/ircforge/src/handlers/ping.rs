//! Keepalive: answers `PING`, records `PONG`.

use std::sync::Arc;

use async_trait::async_trait;
use ircforge_protocol::{Command, Ping, Pong};
use ircforge_transport::SessionId;

use super::{expect, Context};
use crate::{CommandListener, IrcforgeError};

pub(crate) struct PingHandler {
    ctx: Arc<Context>,
}

impl PingHandler {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl CommandListener for PingHandler {
    async fn on_command(
        &self,
        session: &SessionId,
        command: &dyn Command,
    ) -> Result<(), IrcforgeError> {
        let ping = expect::<Ping>(command)?;
        self.ctx.sessions.update(session, |s| s.touch())?;
        let pong = Pong::reply(&self.ctx.config.server_name, &ping.token);
        self.ctx.send(session, &pong)
    }
}

pub(crate) struct PongHandler {
    ctx: Arc<Context>,
}

impl PongHandler {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl CommandListener for PongHandler {
    async fn on_command(
        &self,
        session: &SessionId,
        command: &dyn Command,
    ) -> Result<(), IrcforgeError> {
        expect::<Pong>(command)?;
        self.ctx.sessions.update(session, |s| {
            s.touch();
            s.record_ping();
        })?;
        Ok(())
    }
}
