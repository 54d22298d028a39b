//! Error types for the channel layer.

/// Why a channel operation was refused.
///
/// Every variant maps onto the numeric reply a client expects; see
/// [`numeric`](Self::numeric).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("{0} is not a valid channel name")]
    InvalidName(String),

    #[error("no such channel {0}")]
    NoSuchChannel(String),

    /// Wrong or missing `+k` key.
    #[error("cannot join {0} (+k)")]
    BadKey(String),

    /// `+l` reached.
    #[error("cannot join {0} (+l)")]
    ChannelFull(String),

    #[error("cannot join {0} (+i)")]
    InviteOnly(String),

    #[error("cannot join {0} (+b)")]
    Banned(String),

    #[error("{nick} is already on {channel}")]
    AlreadyJoined { channel: String, nick: String },

    #[error("you're not on {0}")]
    NotOnChannel(String),

    #[error("you're not channel operator on {0}")]
    NotOperator(String),

    #[error("cannot send to {0}")]
    CannotSend(String),

    #[error("{nick} is not on {channel}")]
    UserNotInChannel { nick: String, channel: String },

    #[error("{0}: you have joined too many channels")]
    TooManyChannels(String),
}

impl ChannelError {
    /// The numeric reply code for this refusal.
    pub fn numeric(&self) -> u16 {
        match self {
            Self::InvalidName(_) | Self::NoSuchChannel(_) => 403,
            Self::CannotSend(_) => 404,
            Self::TooManyChannels(_) => 405,
            Self::UserNotInChannel { .. } => 441,
            Self::NotOnChannel(_) => 442,
            Self::AlreadyJoined { .. } => 443,
            Self::ChannelFull(_) => 471,
            Self::InviteOnly(_) => 473,
            Self::Banned(_) => 474,
            Self::BadKey(_) => 475,
            Self::NotOperator(_) => 482,
        }
    }

    /// The channel the error is about.
    pub fn channel(&self) -> &str {
        match self {
            Self::InvalidName(c)
            | Self::NoSuchChannel(c)
            | Self::BadKey(c)
            | Self::ChannelFull(c)
            | Self::InviteOnly(c)
            | Self::Banned(c)
            | Self::NotOnChannel(c)
            | Self::NotOperator(c)
            | Self::CannotSend(c)
            | Self::TooManyChannels(c) => c,
            Self::AlreadyJoined { channel, .. } | Self::UserNotInChannel { channel, .. } => {
                channel
            }
        }
    }

    /// Reply parameters after the target nickname, ending with the
    /// human-readable text.
    pub fn reply_params(&self) -> Vec<String> {
        let text = match self {
            Self::InvalidName(_) | Self::NoSuchChannel(_) => "No such channel",
            Self::CannotSend(_) => "Cannot send to channel",
            Self::TooManyChannels(_) => "You have joined too many channels",
            Self::UserNotInChannel { .. } => "They aren't on that channel",
            Self::NotOnChannel(_) => "You're not on that channel",
            Self::AlreadyJoined { .. } => "is already on channel",
            Self::ChannelFull(_) => "Cannot join channel (+l)",
            Self::InviteOnly(_) => "Cannot join channel (+i)",
            Self::Banned(_) => "Cannot join channel (+b)",
            Self::BadKey(_) => "Cannot join channel (+k)",
            Self::NotOperator(_) => "You're not channel operator",
        };

        match self {
            Self::AlreadyJoined { nick, channel } | Self::UserNotInChannel { nick, channel } => {
                vec![nick.clone(), channel.clone(), text.to_owned()]
            }
            other => vec![other.channel().to_owned(), text.to_owned()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_maps_join_refusals() {
        assert_eq!(ChannelError::BadKey("#a".into()).numeric(), 475);
        assert_eq!(ChannelError::ChannelFull("#a".into()).numeric(), 471);
        assert_eq!(ChannelError::InviteOnly("#a".into()).numeric(), 473);
        assert_eq!(ChannelError::Banned("#a".into()).numeric(), 474);
    }

    #[test]
    fn test_reply_params_user_not_in_channel_names_both() {
        let err = ChannelError::UserNotInChannel {
            nick: "bob".into(),
            channel: "#a".into(),
        };
        assert_eq!(err.reply_params(), vec!["bob", "#a", "They aren't on that channel"]);
        assert_eq!(err.channel(), "#a");
    }
}
