//! Feature handlers: the command listeners a stock server registers.
//!
//! Every handler holds an `Arc<Context>` with the shared server state and
//! implements [`CommandListener`](crate::CommandListener) for one or more
//! command codes. [`install`] wires them all into a dispatcher.

mod channel;
mod messaging;
mod ping;
mod quit;
mod registration;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ircforge_channel::{Broadcast, ChannelError, ChannelManager};
use ircforge_protocol::{Command, Reply};
use ircforge_session::{Session, SessionManager};
use ircforge_transport::{NetworkKind, SessionId};

use crate::dispatch::{CommandDispatcher, Outbox};
use crate::{IrcforgeError, ServerConfig};

pub(crate) use quit::ConnectionTracker;

// ---------------------------------------------------------------------------
// Numerics
// ---------------------------------------------------------------------------

pub(crate) const RPL_WELCOME: u16 = 1;
pub(crate) const RPL_YOURHOST: u16 = 2;
pub(crate) const RPL_CREATED: u16 = 3;
pub(crate) const RPL_MYINFO: u16 = 4;
pub(crate) const RPL_UMODEIS: u16 = 221;
pub(crate) const RPL_CHANNELMODEIS: u16 = 324;
pub(crate) const RPL_CREATIONTIME: u16 = 329;
pub(crate) const RPL_INVITING: u16 = 341;
pub(crate) const ERR_NOSUCHNICK: u16 = 401;
pub(crate) const ERR_NONICKNAMEGIVEN: u16 = 431;
pub(crate) const ERR_ERRONEUSNICKNAME: u16 = 432;
pub(crate) const ERR_NICKNAMEINUSE: u16 = 433;
pub(crate) const ERR_NOTREGISTERED: u16 = 451;
pub(crate) const ERR_ALREADYREGISTERED: u16 = 462;
pub(crate) const ERR_USERSDONTMATCH: u16 = 502;

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Shared state every handler works against.
pub(crate) struct Context {
    pub(crate) config: ServerConfig,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) sessions: Arc<SessionManager>,
    pub(crate) channels: Arc<ChannelManager>,
    pub(crate) outbox: Outbox,
}

impl Context {
    pub(crate) fn send(&self, session: &SessionId, command: &dyn Command) -> Result<(), IrcforgeError> {
        self.outbox.send_command(session, command)
    }

    /// Sends a numeric addressed to the session's nickname, or `*` before
    /// it has one.
    pub(crate) fn reply(
        &self,
        session: &SessionId,
        numeric: u16,
        params: Vec<String>,
    ) -> Result<(), IrcforgeError> {
        let target = self
            .sessions
            .get(session)
            .filter(|s| s.nick_sent)
            .map(|s| s.nickname)
            .unwrap_or_else(|| "*".to_owned());
        let reply = Reply::new(&self.config.server_name, numeric, target, params);
        self.send(session, &reply)
    }

    pub(crate) fn reply_error(&self, session: &SessionId, error: &ChannelError) -> Result<(), IrcforgeError> {
        self.reply(session, error.numeric(), error.reply_params())
    }

    /// Sends to whoever holds `nickname`. Unknown nicknames are skipped.
    pub(crate) fn send_to_nick(&self, nickname: &str, command: &dyn Command) -> Result<(), IrcforgeError> {
        match self.sessions.find_by_nick(nickname) {
            Some(session) => self.send(&session, command),
            None => {
                tracing::debug!(%nickname, code = %command.code(), "recipient vanished");
                Ok(())
            }
        }
    }

    pub(crate) fn broadcast(&self, broadcast: &Broadcast) -> Result<(), IrcforgeError> {
        for nickname in &broadcast.recipients {
            self.send_to_nick(nickname, &*broadcast.command)?;
        }
        Ok(())
    }

    /// Returns the session if it finished registration.
    ///
    /// Otherwise answers `451` and returns `None`.
    pub(crate) fn registered(&self, session: &SessionId) -> Result<Option<Session>, IrcforgeError> {
        let current = self.sessions.update(session, |s| {
            s.touch();
            s.clone()
        })?;
        if current.is_authenticated() {
            return Ok(Some(current));
        }
        self.reply(session, ERR_NOTREGISTERED, vec!["You have not registered".into()])?;
        Ok(None)
    }
}

/// Downcasts `command` or reports which type the listener expected.
pub(crate) fn expect<'a, T: Command>(command: &'a dyn Command) -> Result<&'a T, IrcforgeError> {
    command.downcast_ref::<T>().ok_or_else(|| {
        IrcforgeError::Protocol(ircforge_protocol::ProtocolError::CodeMismatch {
            expected: std::any::type_name::<T>().to_owned(),
            found: command.code().to_owned(),
        })
    })
}

/// Registers every stock handler on the client network.
pub(crate) fn install(dispatcher: &CommandDispatcher, context: Arc<Context>) {
    use ircforge_protocol::{
        Invite, Join, Mode, Nick, Notice, Part, Ping, Pong, Privmsg, Quit, Topic, User,
    };

    let client = NetworkKind::Client;
    let add = |code: &str, listener: Arc<dyn crate::CommandListener>| {
        dispatcher.add_listener(code, client, listener);
    };

    add(Nick::CODE, Arc::new(registration::NickHandler::new(Arc::clone(&context))));
    add(User::CODE, Arc::new(registration::UserHandler::new(Arc::clone(&context))));
    add(Ping::CODE, Arc::new(ping::PingHandler::new(Arc::clone(&context))));
    add(Pong::CODE, Arc::new(ping::PongHandler::new(Arc::clone(&context))));
    add(Join::CODE, Arc::new(channel::JoinHandler::new(Arc::clone(&context))));
    add(Part::CODE, Arc::new(channel::PartHandler::new(Arc::clone(&context))));
    add(Topic::CODE, Arc::new(channel::TopicHandler::new(Arc::clone(&context))));
    add(Mode::CODE, Arc::new(channel::ModeHandler::new(Arc::clone(&context))));
    add(Invite::CODE, Arc::new(channel::InviteHandler::new(Arc::clone(&context))));
    add(Privmsg::CODE, Arc::new(messaging::MessageHandler::privmsg(Arc::clone(&context))));
    add(Notice::CODE, Arc::new(messaging::MessageHandler::notice(Arc::clone(&context))));
    add(Quit::CODE, Arc::new(quit::QuitHandler::new(Arc::clone(&context))));

    dispatcher.add_connection_listener(Arc::new(ConnectionTracker::new(context)));
}
