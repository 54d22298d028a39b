//! Channel commands: `JOIN`, `PART`, `TOPIC`, `MODE` and `INVITE`.

use std::sync::Arc;

use async_trait::async_trait;
use ircforge_channel::{ChannelError, ListKind};
use ircforge_protocol::{Command, Invite, Join, Mode, Part, Topic};
use ircforge_transport::SessionId;

use super::{
    expect, Context, ERR_NOSUCHNICK, ERR_USERSDONTMATCH, RPL_CHANNELMODEIS, RPL_CREATIONTIME,
    RPL_INVITING, RPL_UMODEIS,
};
use crate::{CommandListener, IrcforgeError};

fn is_channel_name(target: &str) -> bool {
    target.starts_with(['#', '&'])
}

// ---------------------------------------------------------------------------
// JOIN
// ---------------------------------------------------------------------------

pub(crate) struct JoinHandler {
    ctx: Arc<Context>,
}

impl JoinHandler {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl CommandListener for JoinHandler {
    async fn on_command(
        &self,
        session: &SessionId,
        command: &dyn Command,
    ) -> Result<(), IrcforgeError> {
        let join = expect::<Join>(command)?;
        let ctx = &self.ctx;
        let Some(client) = ctx.registered(session)? else {
            return Ok(());
        };
        let full_name = client.full_name();

        for (name, key) in join.targets() {
            let result = match ctx.channels.join(&client.nickname, &full_name, name, key) {
                Ok(result) => result,
                Err(e) => {
                    tracing::debug!(%session, channel = %name, error = %e, "join refused");
                    ctx.reply_error(session, &e)?;
                    continue;
                }
            };

            for reply in &result.joiner_commands {
                ctx.send(session, &**reply)?;
            }
            for (member, commands) in &result.member_commands {
                for command in commands {
                    ctx.send_to_nick(member, &**command)?;
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PART
// ---------------------------------------------------------------------------

pub(crate) struct PartHandler {
    ctx: Arc<Context>,
}

impl PartHandler {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl CommandListener for PartHandler {
    async fn on_command(
        &self,
        session: &SessionId,
        command: &dyn Command,
    ) -> Result<(), IrcforgeError> {
        let part = expect::<Part>(command)?;
        let ctx = &self.ctx;
        let Some(client) = ctx.registered(session)? else {
            return Ok(());
        };
        let full_name = client.full_name();

        for name in &part.channels {
            match ctx
                .channels
                .part(&client.nickname, &full_name, name, part.reason.as_deref())
            {
                Ok(broadcast) => ctx.broadcast(&broadcast)?,
                Err(e) => ctx.reply_error(session, &e)?,
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TOPIC
// ---------------------------------------------------------------------------

pub(crate) struct TopicHandler {
    ctx: Arc<Context>,
}

impl TopicHandler {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl CommandListener for TopicHandler {
    async fn on_command(
        &self,
        session: &SessionId,
        command: &dyn Command,
    ) -> Result<(), IrcforgeError> {
        let topic = expect::<Topic>(command)?;
        let ctx = &self.ctx;
        let Some(client) = ctx.registered(session)? else {
            return Ok(());
        };

        let outcome = match &topic.topic {
            None => ctx
                .channels
                .topic_query(&client.nickname, &topic.channel)
                .map(|replies| {
                    replies
                        .iter()
                        .try_for_each(|reply| ctx.send(session, &**reply))
                }),
            Some(text) => ctx
                .channels
                .set_topic(&client.nickname, &client.full_name(), &topic.channel, text)
                .map(|broadcast| ctx.broadcast(&broadcast)),
        };

        match outcome {
            Ok(sent) => sent,
            Err(e) => ctx.reply_error(session, &e),
        }
    }
}

// ---------------------------------------------------------------------------
// MODE
// ---------------------------------------------------------------------------

pub(crate) struct ModeHandler {
    ctx: Arc<Context>,
}

impl ModeHandler {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    fn channel_mode(
        &self,
        session: &SessionId,
        nickname: &str,
        full_name: &str,
        mode: &Mode,
    ) -> Result<(), IrcforgeError> {
        let ctx = &self.ctx;
        let Some(channel) = ctx.channels.get(&mode.target) else {
            return ctx.reply_error(session, &ChannelError::NoSuchChannel(mode.target.clone()));
        };

        let Some(modes) = &mode.modes else {
            let (flags, params) = channel.mode_string();
            let mut reply = vec![channel.name().to_owned(), flags];
            reply.extend(params);
            ctx.reply(session, RPL_CHANNELMODEIS, reply)?;
            return ctx.reply(
                session,
                RPL_CREATIONTIME,
                vec![
                    channel.name().to_owned(),
                    channel.created_at().timestamp().to_string(),
                ],
            );
        };

        if let Some(kind) = list_query(modes, &mode.params) {
            let (entry, end) = kind.numerics();
            for item in channel.list_entries(kind) {
                ctx.reply(
                    session,
                    entry,
                    vec![
                        channel.name().to_owned(),
                        item.mask,
                        item.set_by,
                        item.set_at.timestamp().to_string(),
                    ],
                )?;
            }
            let text = match kind {
                ListKind::Ban => "End of channel ban list",
                ListKind::BanException => "End of channel exception list",
                ListKind::InviteException => "End of channel invite list",
            };
            return ctx.reply(session, end, vec![channel.name().to_owned(), text.into()]);
        }

        match ctx
            .channels
            .apply_modes(nickname, full_name, &mode.target, modes, &mode.params)
        {
            Ok((_, Some(broadcast))) => ctx.broadcast(&broadcast),
            Ok((_, None)) => Ok(()),
            Err(e) => ctx.reply_error(session, &e),
        }
    }
}

/// `b`, `+b`, `e`, `I` with no mask asks for the list instead of changing it.
fn list_query(modes: &str, params: &[String]) -> Option<ListKind> {
    if !params.is_empty() {
        return None;
    }
    let mut chars = modes.strip_prefix('+').unwrap_or(modes).chars();
    match (chars.next(), chars.next()) {
        (Some(mode), None) => ListKind::from_mode(mode),
        _ => None,
    }
}

#[async_trait]
impl CommandListener for ModeHandler {
    async fn on_command(
        &self,
        session: &SessionId,
        command: &dyn Command,
    ) -> Result<(), IrcforgeError> {
        let mode = expect::<Mode>(command)?;
        let ctx = &self.ctx;
        let Some(client) = ctx.registered(session)? else {
            return Ok(());
        };

        if is_channel_name(&mode.target) {
            return self.channel_mode(session, &client.nickname, &client.full_name(), mode);
        }

        // No user modes are implemented; report the empty set for oneself.
        if mode.target.eq_ignore_ascii_case(&client.nickname) {
            ctx.reply(session, RPL_UMODEIS, vec!["+".into()])
        } else {
            ctx.reply(
                session,
                ERR_USERSDONTMATCH,
                vec!["Cant change mode for other users".into()],
            )
        }
    }
}

// ---------------------------------------------------------------------------
// INVITE
// ---------------------------------------------------------------------------

pub(crate) struct InviteHandler {
    ctx: Arc<Context>,
}

impl InviteHandler {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl CommandListener for InviteHandler {
    async fn on_command(
        &self,
        session: &SessionId,
        command: &dyn Command,
    ) -> Result<(), IrcforgeError> {
        let invite: &Invite = expect::<Invite>(command)?;
        let ctx = &self.ctx;
        let Some(client) = ctx.registered(session)? else {
            return Ok(());
        };

        if !ctx.sessions.nick_in_use(&invite.nickname) {
            return ctx.reply(
                session,
                ERR_NOSUCHNICK,
                vec![invite.nickname.clone(), "No such nick/channel".into()],
            );
        }

        match ctx.channels.invite(
            &client.nickname,
            &client.full_name(),
            &invite.nickname,
            &invite.channel,
        ) {
            Ok(notice) => {
                ctx.send_to_nick(&invite.nickname, &*notice)?;
                ctx.reply(
                    session,
                    RPL_INVITING,
                    vec![invite.nickname.clone(), invite.channel.clone()],
                )
            }
            Err(e) => ctx.reply_error(session, &e),
        }
    }
}
