//! `PRIVMSG` and `NOTICE` delivery to channels and nicknames.
//!
//! Both commands share one handler; the only difference is that a NOTICE
//! never triggers an error reply.

use std::sync::Arc;

use async_trait::async_trait;
use ircforge_protocol::{Command, Notice, Privmsg};
use ircforge_transport::SessionId;

use super::{expect, Context, ERR_NOSUCHNICK};
use crate::{CommandListener, IrcforgeError};

pub(crate) struct MessageHandler {
    ctx: Arc<Context>,
    notice: bool,
}

impl MessageHandler {
    pub(crate) fn privmsg(ctx: Arc<Context>) -> Self {
        Self { ctx, notice: false }
    }

    pub(crate) fn notice(ctx: Arc<Context>) -> Self {
        Self { ctx, notice: true }
    }

    fn outgoing(&self, source: &str, target: &str, text: &str) -> Box<dyn Command> {
        if self.notice {
            Box::new(Notice::new(target, text).with_source(source))
        } else {
            Box::new(Privmsg::new(target, text).with_source(source))
        }
    }
}

#[async_trait]
impl CommandListener for MessageHandler {
    async fn on_command(
        &self,
        session: &SessionId,
        command: &dyn Command,
    ) -> Result<(), IrcforgeError> {
        let (targets, text) = if self.notice {
            let notice = expect::<Notice>(command)?;
            (&notice.target, &notice.text)
        } else {
            let privmsg = expect::<Privmsg>(command)?;
            (&privmsg.target, &privmsg.text)
        };

        let ctx = &self.ctx;
        let Some(client) = ctx.registered(session)? else {
            return Ok(());
        };
        let full_name = client.full_name();

        for target in targets.split(',').filter(|t| !t.is_empty()) {
            let message = self.outgoing(&full_name, target, text);

            if target.starts_with(['#', '&']) {
                match ctx.channels.message_recipients(&client.nickname, &full_name, target) {
                    Ok(recipients) => {
                        for nickname in recipients {
                            ctx.send_to_nick(&nickname, &*message)?;
                        }
                    }
                    Err(e) if !self.notice => ctx.reply_error(session, &e)?,
                    Err(e) => {
                        tracing::debug!(%session, channel = %target, error = %e, "notice dropped");
                    }
                }
                continue;
            }

            match ctx.sessions.find_by_nick(target) {
                Some(recipient) => ctx.send(&recipient, &*message)?,
                None if !self.notice => ctx.reply(
                    session,
                    ERR_NOSUCHNICK,
                    vec![target.to_owned(), "No such nick/channel".into()],
                )?,
                None => {}
            }
        }
        Ok(())
    }
}
