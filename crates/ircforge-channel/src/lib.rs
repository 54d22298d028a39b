//! Channel state engine for ircforge.
//!
//! Every channel is a shared, lock-light value: members and mask lists are
//! per-key concurrent maps, and mode flags sit behind one narrow lock with
//! their parameters.
//!
//! # Key types
//!
//! - [`Channel`] — membership, modes, bans, invites and topic
//! - [`ChannelManager`] — creates and removes channels, orchestrates joins
//! - [`ModeChange`] — one applied mode delta
//! - [`ChannelError`] — why an operation was refused, with its numeric
//! - [`ChannelConfig`] — defaults for new channels

mod channel;
mod config;
mod error;
mod manager;
mod mask;
mod modes;

pub use channel::{Channel, Membership, TopicInfo};
pub use config::{is_valid_channel_name, ChannelConfig};
pub use error::ChannelError;
pub use manager::{Broadcast, ChannelListEntry, ChannelManager, JoinResult};
pub use mask::{normalize_mask, wildcard_match};
pub use modes::{
    mode_command, BanEntry, ListKind, ModeChange, FLAG_MODES, MEMBER_MODES, PARAM_MODES,
};
