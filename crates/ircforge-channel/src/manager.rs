//! Channel manager: creates, tracks, and routes members to channels.
//!
//! This is the entry point for channel operations from the feature
//! handlers. It owns every live [`Channel`] and turns each operation into
//! the protocol commands the caller must deliver.
//!
//! # Concurrency note
//!
//! Channels live in a `DashMap` keyed by case-folded name and are handed
//! out as `Arc<Channel>`. There is no manager-wide lock. A join runs its
//! checks and inserts the member while holding the channel's map entry,
//! and an emptied channel is only removed under that same entry lock, so
//! joins to one channel are serialized and never land in a channel that
//! has already been dropped.
//!
//! A second map indexes which channels each nickname is in, so per-user
//! lookups do not scan every channel.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use ircforge_protocol::{Command, Invite, Join, Part, Reply, Topic};

use crate::config::is_valid_channel_name;
use crate::modes::mode_command;
use crate::{Channel, ChannelConfig, ChannelError, ListKind, ModeChange, TopicInfo};

/// Outcome of a successful join.
#[derive(Debug)]
pub struct JoinResult {
    pub channel: Arc<Channel>,
    /// `true` if the join created the channel.
    pub created: bool,
    /// JOIN echo, topic and names, in that order.
    pub joiner_commands: Vec<Box<dyn Command>>,
    /// One JOIN per member that was already present.
    pub member_commands: HashMap<String, Vec<Box<dyn Command>>>,
}

/// One command to fan out to a list of nicknames.
#[derive(Debug)]
pub struct Broadcast {
    pub recipients: Vec<String>,
    pub command: Box<dyn Command>,
}

/// Row of a channel listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelListEntry {
    pub name: String,
    pub members: usize,
    pub topic: Option<String>,
}

/// Manages all live channels.
///
/// ## Lifecycle
///
/// ```text
/// join() ─→ created on first join ─→ ... ─→ part()/remove_from_all()
///                                                 │
///                                    removed once empty
/// ```
pub struct ChannelManager {
    config: ChannelConfig,
    /// Case-folded channel name → channel.
    channels: DashMap<String, Arc<Channel>>,
    /// Case-folded nickname → case-folded names of its channels.
    memberships: DashMap<String, HashSet<String>>,
}

fn fold(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl ChannelManager {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            channels: DashMap::new(),
            memberships: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn get(&self, name: &str) -> Option<Arc<Channel>> {
        self.channels.get(&fold(name)).map(|c| Arc::clone(&c))
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn require(&self, name: &str) -> Result<Arc<Channel>, ChannelError> {
        self.get(name)
            .ok_or_else(|| ChannelError::NoSuchChannel(name.to_owned()))
    }

    fn reply(&self, numeric: u16, target: &str, params: Vec<String>) -> Box<dyn Command> {
        Box::new(Reply::new(&self.config.server_name, numeric, target, params))
    }

    // -----------------------------------------------------------------------
    // Join / part
    // -----------------------------------------------------------------------

    /// Adds `nickname` to channel `name`, creating it on first join.
    ///
    /// Checks run in this order: name syntax, per-user channel cap, key,
    /// limit, invite-only, ban, existing membership. The first member
    /// becomes operator and a matching invite is consumed.
    ///
    /// # Errors
    /// The first failing check as a [`ChannelError`].
    pub fn join(
        &self,
        nickname: &str,
        full_name: &str,
        name: &str,
        key: Option<&str>,
    ) -> Result<JoinResult, ChannelError> {
        if !is_valid_channel_name(name) {
            return Err(ChannelError::InvalidName(name.to_owned()));
        }

        let cap = self.config.max_channels_per_user;
        if cap > 0 && self.membership_count(nickname) >= cap {
            let joined_here = self.get(name).is_some_and(|c| c.is_member(nickname));
            if !joined_here {
                return Err(ChannelError::TooManyChannels(name.to_owned()));
            }
        }

        let folded = fold(name);
        // No other access to `self.channels` while the entry is held.
        let (channel, created, existing) = {
            use dashmap::mapref::entry::Entry;
            match self.channels.entry(folded.clone()) {
                Entry::Occupied(e) => {
                    let channel = Arc::clone(e.get());
                    let existing = self.admit(&channel, nickname, full_name, key)?;
                    (channel, false, existing)
                }
                Entry::Vacant(slot) => {
                    let channel = Arc::new(Channel::new(name, &self.config.default_modes));
                    let existing = self.admit(&channel, nickname, full_name, key)?;
                    slot.insert(Arc::clone(&channel));
                    tracing::info!(channel = %name, "channel created");
                    (channel, true, existing)
                }
            }
        };
        self.memberships
            .entry(fold(nickname))
            .or_default()
            .insert(folded);
        tracing::debug!(channel = %channel.name(), %nickname, "member joined");

        let echo = || Join::new(channel.name()).with_source(full_name);

        let mut joiner_commands: Vec<Box<dyn Command>> = vec![Box::new(echo())];
        joiner_commands.extend(self.topic_replies(&channel, nickname));
        joiner_commands.extend(self.names_replies(&channel, nickname));

        let member_commands = existing
            .into_iter()
            .map(|member| {
                let commands: Vec<Box<dyn Command>> = vec![Box::new(echo())];
                (member, commands)
            })
            .collect();

        Ok(JoinResult {
            channel,
            created,
            joiner_commands,
            member_commands,
        })
    }

    /// Runs the join checks and inserts the member. Returns the members
    /// that were there before.
    ///
    /// Called with the channel's map entry held. The joiner becomes
    /// operator when nobody else is left in the channel.
    fn admit(
        &self,
        channel: &Channel,
        nickname: &str,
        full_name: &str,
        key: Option<&str>,
    ) -> Result<Vec<String>, ChannelError> {
        self.check_join(channel, nickname, full_name, key)?;

        let existing = channel.member_nicknames();
        if channel.add_member_with(nickname, existing.is_empty()).is_none() {
            return Err(ChannelError::AlreadyJoined {
                channel: channel.name().to_owned(),
                nick: nickname.to_owned(),
            });
        }
        // The previous members all parted while this one was being added.
        if !existing.is_empty() && channel.member_count() == 1 {
            channel.set_operator(nickname, true);
        }
        channel.take_invite(nickname);
        Ok(existing)
    }

    fn check_join(
        &self,
        channel: &Channel,
        nickname: &str,
        full_name: &str,
        key: Option<&str>,
    ) -> Result<(), ChannelError> {
        let name = || channel.name().to_owned();

        if let Some(expected) = channel.key() {
            if key != Some(expected.as_str()) {
                return Err(ChannelError::BadKey(name()));
            }
        }
        if let Some(limit) = channel.user_limit() {
            if channel.member_count() >= limit {
                return Err(ChannelError::ChannelFull(name()));
            }
        }
        if !channel.nickname_can_join(nickname)
            && !channel.list_matches(ListKind::InviteException, full_name)
        {
            return Err(ChannelError::InviteOnly(name()));
        }
        if channel.is_banned(full_name) {
            return Err(ChannelError::Banned(name()));
        }
        if channel.is_member(nickname) {
            return Err(ChannelError::AlreadyJoined {
                channel: name(),
                nick: nickname.to_owned(),
            });
        }
        Ok(())
    }

    /// Removes `nickname` from channel `name`.
    ///
    /// The PART goes to every member, the parter included. An emptied
    /// channel is dropped.
    ///
    /// # Errors
    /// [`ChannelError::NoSuchChannel`] or [`ChannelError::NotOnChannel`].
    pub fn part(
        &self,
        nickname: &str,
        full_name: &str,
        name: &str,
        reason: Option<&str>,
    ) -> Result<Broadcast, ChannelError> {
        let channel = self.require(name)?;
        let recipients = channel.member_nicknames();
        if channel.remove_member(nickname).is_none() {
            return Err(ChannelError::NotOnChannel(channel.name().to_owned()));
        }
        tracing::debug!(channel = %channel.name(), %nickname, "member parted");
        self.forget(nickname, channel.name());
        self.remove_if_empty(&channel);

        let part = Part::new(channel.name(), reason.map(str::to_owned)).with_source(full_name);
        Ok(Broadcast {
            recipients,
            command: Box::new(part),
        })
    }

    /// Removes `nickname` from every channel, for QUIT.
    ///
    /// Returns the nicknames that shared at least one channel with it,
    /// without duplicates and without `nickname` itself.
    pub fn remove_from_all(&self, nickname: &str) -> Vec<String> {
        let mut peers: Vec<String> = Vec::new();
        let channels = self.channels_of(nickname);
        self.memberships.remove(&fold(nickname));
        for channel in channels {
            channel.remove_member(nickname);
            for peer in channel.member_nicknames() {
                if !peers.iter().any(|p| p.eq_ignore_ascii_case(&peer)) {
                    peers.push(peer);
                }
            }
            self.remove_if_empty(&channel);
        }
        peers
    }

    /// Re-keys `old` to `new` in every channel, for NICK changes.
    ///
    /// Returns the co-members that must see the change.
    pub fn rename_member(&self, old: &str, new: &str) -> Vec<String> {
        let mut peers: Vec<String> = Vec::new();
        let channels = self.channels_of(old);
        if let Some((_, names)) = self.memberships.remove(&fold(old)) {
            self.memberships.entry(fold(new)).or_default().extend(names);
        }
        for channel in channels {
            channel.rename_member(old, new);
            for peer in channel.member_nicknames() {
                let is_self = peer.eq_ignore_ascii_case(new);
                if !is_self && !peers.iter().any(|p| p.eq_ignore_ascii_case(&peer)) {
                    peers.push(peer);
                }
            }
        }
        peers
    }

    fn forget(&self, nickname: &str, channel: &str) {
        let folded = fold(nickname);
        if let Some(mut names) = self.memberships.get_mut(&folded) {
            names.remove(&fold(channel));
        }
        self.memberships.remove_if(&folded, |_, names| names.is_empty());
    }

    /// Number of channels `nickname` is in.
    pub fn membership_count(&self, nickname: &str) -> usize {
        self.memberships
            .get(&fold(nickname))
            .map_or(0, |names| names.len())
    }

    fn remove_if_empty(&self, channel: &Channel) {
        let removed = self
            .channels
            .remove_if(&fold(channel.name()), |_, c| c.is_empty());
        if removed.is_some() {
            tracing::info!(channel = %channel.name(), "channel removed");
        }
    }

    // -----------------------------------------------------------------------
    // Topic
    // -----------------------------------------------------------------------

    /// Changes the topic. An empty `text` clears it.
    ///
    /// # Errors
    /// - [`ChannelError::NotOnChannel`] if `nickname` is not a member
    /// - [`ChannelError::NotOperator`] under `+t` without operator status
    pub fn set_topic(
        &self,
        nickname: &str,
        full_name: &str,
        name: &str,
        text: &str,
    ) -> Result<Broadcast, ChannelError> {
        let channel = self.require(name)?;
        if !channel.is_member(nickname) {
            return Err(ChannelError::NotOnChannel(channel.name().to_owned()));
        }
        if channel.has_mode('t') && !channel.is_operator(nickname) {
            return Err(ChannelError::NotOperator(channel.name().to_owned()));
        }

        channel.set_topic(text, full_name);
        let topic = Topic::new(channel.name(), Some(text.to_owned())).with_source(full_name);
        Ok(Broadcast {
            recipients: channel.member_nicknames(),
            command: Box::new(topic),
        })
    }

    pub fn topic(&self, name: &str) -> Result<Option<TopicInfo>, ChannelError> {
        Ok(self.require(name)?.topic())
    }

    /// 332/333 when a topic is set, otherwise 331.
    pub fn topic_query(&self, nickname: &str, name: &str) -> Result<Vec<Box<dyn Command>>, ChannelError> {
        let channel = self.require(name)?;
        let replies = self.topic_replies(&channel, nickname);
        if replies.is_empty() {
            return Ok(vec![self.reply(
                331,
                nickname,
                vec![channel.name().to_owned(), "No topic is set".into()],
            )]);
        }
        Ok(replies)
    }

    fn topic_replies(&self, channel: &Channel, nickname: &str) -> Vec<Box<dyn Command>> {
        let Some(topic) = channel.topic() else {
            return Vec::new();
        };
        vec![
            self.reply(332, nickname, vec![channel.name().to_owned(), topic.text]),
            self.reply(
                333,
                nickname,
                vec![
                    channel.name().to_owned(),
                    topic.set_by,
                    topic.set_at.timestamp().to_string(),
                ],
            ),
        ]
    }

    /// 353 with the prefixed member list, then 366.
    pub fn names_replies(&self, channel: &Channel, nickname: &str) -> Vec<Box<dyn Command>> {
        let kind = if channel.has_mode('s') {
            "@"
        } else if channel.has_mode('p') {
            "*"
        } else {
            "="
        };
        vec![
            self.reply(
                353,
                nickname,
                vec![kind.into(), channel.name().to_owned(), channel.names().join(" ")],
            ),
            self.reply(
                366,
                nickname,
                vec![channel.name().to_owned(), "End of /NAMES list".into()],
            ),
        ]
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Visible channels, sorted by name. `+s` channels are hidden.
    pub fn list(&self) -> Vec<ChannelListEntry> {
        let mut entries: Vec<ChannelListEntry> = self
            .channels
            .iter()
            .filter(|c| !c.has_mode('s'))
            .map(|c| ChannelListEntry {
                name: c.name().to_owned(),
                members: c.member_count(),
                topic: c.topic().map(|t| t.text),
            })
            .collect();
        entries.sort_by_key(|e| fold(&e.name));
        entries
    }

    /// Every channel `nickname` is a member of.
    /// Channels `nickname` is in, sorted by name.
    pub fn channels_of(&self, nickname: &str) -> Vec<Arc<Channel>> {
        let names: Vec<String> = self
            .memberships
            .get(&fold(nickname))
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default();
        let mut channels: Vec<Arc<Channel>> = names
            .iter()
            .filter_map(|name| self.channels.get(name).map(|c| Arc::clone(&c)))
            .filter(|c| c.is_member(nickname))
            .collect();
        channels.sort_by(|a, b| a.name().cmp(b.name()));
        channels
    }

    pub fn members(&self, name: &str) -> Result<Vec<String>, ChannelError> {
        Ok(self.require(name)?.member_nicknames())
    }

    /// Who receives a message `nickname` sends to channel `name`.
    ///
    /// The sender is left out.
    ///
    /// # Errors
    /// [`ChannelError::CannotSend`] when gated by `+n`, `+m`, `+i` or a ban.
    pub fn message_recipients(
        &self,
        nickname: &str,
        full_name: &str,
        name: &str,
    ) -> Result<Vec<String>, ChannelError> {
        let channel = self.require(name)?;
        let banned = channel.is_banned(full_name) && !channel.is_operator(nickname);
        if banned || !channel.user_can_send_message(nickname) {
            return Err(ChannelError::CannotSend(channel.name().to_owned()));
        }
        Ok(channel
            .member_nicknames()
            .into_iter()
            .filter(|m| !m.eq_ignore_ascii_case(nickname))
            .collect())
    }

    // -----------------------------------------------------------------------
    // Modes and invites
    // -----------------------------------------------------------------------

    /// Applies a mode string on behalf of `nickname`.
    ///
    /// Returns the applied changes and, when any applied, the MODE line
    /// to broadcast to the members.
    ///
    /// # Errors
    /// [`ChannelError::NotOperator`] unless `nickname` is a channel
    /// operator.
    pub fn apply_modes(
        &self,
        nickname: &str,
        full_name: &str,
        name: &str,
        modes: &str,
        params: &[String],
    ) -> Result<(Vec<ModeChange>, Option<Broadcast>), ChannelError> {
        let channel = self.require(name)?;
        if !channel.is_operator(nickname) {
            return Err(ChannelError::NotOperator(channel.name().to_owned()));
        }

        let changes = channel.apply_mode_changes(modes, params, full_name);
        let broadcast = mode_command(full_name, channel.name(), &changes).map(|mode| Broadcast {
            recipients: channel.member_nicknames(),
            command: Box::new(mode),
        });
        tracing::debug!(channel = %channel.name(), %nickname, applied = changes.len(), "modes applied");
        Ok((changes, broadcast))
    }

    /// `inviter` invites `target` into channel `name`.
    ///
    /// Returns the INVITE to deliver to `target`.
    ///
    /// # Errors
    /// - [`ChannelError::NotOnChannel`] if `inviter` is not a member
    /// - [`ChannelError::AlreadyJoined`] if `target` already is
    /// - [`ChannelError::NotOperator`] on a `+i` channel without operator
    pub fn invite(
        &self,
        inviter: &str,
        inviter_full_name: &str,
        target: &str,
        name: &str,
    ) -> Result<Box<dyn Command>, ChannelError> {
        let channel = self.require(name)?;
        if !channel.is_member(inviter) {
            return Err(ChannelError::NotOnChannel(channel.name().to_owned()));
        }
        if channel.is_member(target) {
            return Err(ChannelError::AlreadyJoined {
                channel: channel.name().to_owned(),
                nick: target.to_owned(),
            });
        }
        if channel.has_mode('i') && !channel.is_operator(inviter) {
            return Err(ChannelError::NotOperator(channel.name().to_owned()));
        }

        channel.invite(target);
        Ok(Box::new(
            Invite::new(target, channel.name()).with_source(inviter_full_name),
        ))
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new(ChannelConfig::default())
    }
}
