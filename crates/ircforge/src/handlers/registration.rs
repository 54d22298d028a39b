//! Connection registration: `NICK` and `USER`, and the welcome burst once
//! both have arrived.

use std::sync::Arc;

use async_trait::async_trait;
use ircforge_protocol::{Command, Nick, User};
use ircforge_session::SessionError;
use ircforge_transport::SessionId;

use super::{
    expect, Context, ERR_ALREADYREGISTERED, ERR_ERRONEUSNICKNAME, ERR_NICKNAMEINUSE,
    ERR_NONICKNAMEGIVEN, RPL_CREATED, RPL_MYINFO, RPL_WELCOME, RPL_YOURHOST,
};
use crate::{CommandListener, IrcforgeError, SERVER_VERSION};

/// Channel modes advertised in `004`.
const CHANNEL_MODES: &str = "beIiklmnopstv";

pub(crate) struct NickHandler {
    ctx: Arc<Context>,
}

impl NickHandler {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl CommandListener for NickHandler {
    async fn on_command(
        &self,
        session: &SessionId,
        command: &dyn Command,
    ) -> Result<(), IrcforgeError> {
        let nick = expect::<Nick>(command)?;
        let ctx = &self.ctx;

        if nick.nickname.is_empty() {
            return ctx.reply(session, ERR_NONICKNAMEGIVEN, vec!["No nickname given".into()]);
        }

        let before = ctx
            .sessions
            .get(session)
            .ok_or_else(|| SessionError::NotFound(session.clone()))?;

        let previous = match ctx.sessions.claim_nick(session, &nick.nickname) {
            Ok(previous) => previous,
            Err(SessionError::InvalidNick(name)) => {
                return ctx.reply(
                    session,
                    ERR_ERRONEUSNICKNAME,
                    vec![name, "Erroneous nickname".into()],
                );
            }
            Err(SessionError::NickInUse(name)) => {
                return ctx.reply(
                    session,
                    ERR_NICKNAMEINUSE,
                    vec![name, "Nickname is already in use".into()],
                );
            }
            Err(e) => return Err(e.into()),
        };

        if !before.is_authenticated() {
            return complete_registration(ctx, session);
        }

        // A registered client changed its nickname: tell it and everyone
        // sharing a channel with it.
        let Some(old) = previous.filter(|old| *old != nick.nickname) else {
            return Ok(());
        };
        let change = Nick::new(&nick.nickname).with_source(before.full_name());
        let peers = ctx.channels.rename_member(&old, &nick.nickname);
        tracing::info!(%session, %old, new = %nick.nickname, "nickname changed");

        ctx.send(session, &change)?;
        for peer in peers {
            ctx.send_to_nick(&peer, &change)?;
        }
        Ok(())
    }
}

pub(crate) struct UserHandler {
    ctx: Arc<Context>,
}

impl UserHandler {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl CommandListener for UserHandler {
    async fn on_command(
        &self,
        session: &SessionId,
        command: &dyn Command,
    ) -> Result<(), IrcforgeError> {
        let user = expect::<User>(command)?;
        let ctx = &self.ctx;

        let accepted = ctx.sessions.update(session, |s| {
            if s.registered {
                return false;
            }
            s.set_user(&user.username, &user.realname);
            true
        })?;

        if !accepted {
            return ctx.reply(
                session,
                ERR_ALREADYREGISTERED,
                vec!["You may not reregister".into()],
            );
        }
        complete_registration(ctx, session)
    }
}

/// Sends `001`-`004` the first time both NICK and USER are present.
fn complete_registration(ctx: &Context, session: &SessionId) -> Result<(), IrcforgeError> {
    let registered = ctx
        .sessions
        .update(session, |s| s.complete_registration().then(|| s.clone()))?;
    let Some(client) = registered else {
        return Ok(());
    };

    let config = &ctx.config;
    let created = ctx.started_at.format("%Y-%m-%d %H:%M:%S UTC");
    ctx.reply(
        session,
        RPL_WELCOME,
        vec![format!(
            "Welcome to the {} Network {}",
            config.network_name,
            client.full_name()
        )],
    )?;
    ctx.reply(
        session,
        RPL_YOURHOST,
        vec![format!(
            "Your host is {}, running version {SERVER_VERSION}",
            config.server_name
        )],
    )?;
    ctx.reply(
        session,
        RPL_CREATED,
        vec![format!("This server was created {created}")],
    )?;
    ctx.reply(
        session,
        RPL_MYINFO,
        vec![
            config.server_name.clone(),
            SERVER_VERSION.to_owned(),
            "i".into(),
            CHANNEL_MODES.into(),
        ],
    )?;

    tracing::info!(%session, nick = %client.nickname, "client registered");
    Ok(())
}
