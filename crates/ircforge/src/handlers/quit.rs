//! Session teardown: the `QUIT` command and transport disconnects.
//!
//! Either path removes the client from every channel and tells the
//! remaining co-members with a `QUIT` line. Whichever runs first does the
//! announcing; the other finds no channels left.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use ircforge_protocol::{Command, Quit};
use ircforge_session::{Session, SessionError};
use ircforge_transport::{NetworkKind, SessionId};

use super::{expect, Context};
use crate::{CommandListener, ConnectionListener, IrcforgeError};

fn announce_quit(ctx: &Context, client: &Session, reason: &str) -> Result<(), IrcforgeError> {
    if !client.nick_sent {
        return Ok(());
    }
    let peers = ctx.channels.remove_from_all(&client.nickname);
    if peers.is_empty() {
        return Ok(());
    }

    let quit = Quit {
        source: Some(client.full_name()),
        reason: Some(reason.to_owned()),
    };
    for peer in peers {
        ctx.send_to_nick(&peer, &quit)?;
    }
    Ok(())
}

pub(crate) struct QuitHandler {
    ctx: Arc<Context>,
}

impl QuitHandler {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl CommandListener for QuitHandler {
    async fn on_command(
        &self,
        session: &SessionId,
        command: &dyn Command,
    ) -> Result<(), IrcforgeError> {
        let quit = expect::<Quit>(command)?;
        let client = self
            .ctx
            .sessions
            .get(session)
            .ok_or_else(|| SessionError::NotFound(session.clone()))?;

        let reason = match &quit.reason {
            Some(reason) => format!("Quit: {reason}"),
            None => "Client Quit".to_owned(),
        };
        announce_quit(&self.ctx, &client, &reason)?;
        tracing::info!(%session, nick = %client.nickname, %reason, "client quit");

        self.ctx.outbox.transports().disconnect(session).await?;
        Ok(())
    }
}

/// Creates a session on connect and tears it down on disconnect.
pub(crate) struct ConnectionTracker {
    ctx: Arc<Context>,
}

impl ConnectionTracker {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ConnectionListener for ConnectionTracker {
    async fn on_connect(
        &self,
        session: &SessionId,
        endpoint: SocketAddr,
        _network: NetworkKind,
    ) -> Result<(), IrcforgeError> {
        self.ctx.sessions.connect(session.clone(), Some(endpoint))?;
        Ok(())
    }

    async fn on_disconnect(
        &self,
        session: &SessionId,
        _network: NetworkKind,
    ) -> Result<(), IrcforgeError> {
        let client = self.ctx.sessions.disconnect(session)?;
        announce_quit(&self.ctx, &client, "Connection closed")
    }
}
