//! Channel mode vocabulary and the value records describing changes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use ircforge_protocol::Mode;
use serde::{Deserialize, Serialize};

/// Simple on/off modes: invite-only, moderated, no external messages,
/// topic lock, secret, private.
pub const FLAG_MODES: &[char] = &['i', 'm', 'n', 't', 's', 'p'];

/// Modes carrying one parameter while set: key and user limit.
pub const PARAM_MODES: &[char] = &['k', 'l'];

/// Per-member status modes. The parameter is a nickname.
pub const MEMBER_MODES: &[char] = &['o', 'v'];

// ---------------------------------------------------------------------------
// Mask lists
// ---------------------------------------------------------------------------

/// The three independent mask lists a channel keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListKind {
    /// `+b`: matching users may not join.
    Ban,
    /// `+e`: matching users bypass bans.
    BanException,
    /// `+I`: matching users bypass invite-only.
    InviteException,
}

impl ListKind {
    pub fn from_mode(mode: char) -> Option<Self> {
        match mode {
            'b' => Some(Self::Ban),
            'e' => Some(Self::BanException),
            'I' => Some(Self::InviteException),
            _ => None,
        }
    }

    pub fn mode(self) -> char {
        match self {
            Self::Ban => 'b',
            Self::BanException => 'e',
            Self::InviteException => 'I',
        }
    }

    /// `(entry, end of list)` numerics used to list this kind.
    pub fn numerics(self) -> (u16, u16) {
        match self {
            Self::Ban => (367, 368),
            Self::BanException => (348, 349),
            Self::InviteException => (346, 347),
        }
    }
}

/// One entry of a ban or exception list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanEntry {
    pub mask: String,
    pub set_by: String,
    pub set_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ModeChange
// ---------------------------------------------------------------------------

/// One applied mode delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeChange {
    pub adding: bool,
    pub mode: char,
    pub param: Option<String>,
}

impl ModeChange {
    pub fn add(mode: char, param: Option<String>) -> Self {
        Self {
            adding: true,
            mode,
            param,
        }
    }

    pub fn remove(mode: char, param: Option<String>) -> Self {
        Self {
            adding: false,
            mode,
            param,
        }
    }
}

impl fmt::Display for ModeChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.adding { '+' } else { '-' };
        match &self.param {
            Some(param) => write!(f, "{sign}{} {param}", self.mode),
            None => write!(f, "{sign}{}", self.mode),
        }
    }
}

/// Collapses applied changes into one `MODE` line, e.g. `+kl-i secret 10`.
///
/// Returns `None` when nothing changed, so callers only broadcast real
/// deltas.
pub fn mode_command(
    source: &str,
    channel: &str,
    changes: &[ModeChange],
) -> Option<Mode> {
    if changes.is_empty() {
        return None;
    }

    let mut modes = String::new();
    let mut params = Vec::new();
    let mut sign = None;
    for change in changes {
        if sign != Some(change.adding) {
            modes.push(if change.adding { '+' } else { '-' });
            sign = Some(change.adding);
        }
        modes.push(change.mode);
        if let Some(param) = &change.param {
            params.push(param.clone());
        }
    }

    Some(Mode::new(channel, modes, params).with_source(source))
}

// ---------------------------------------------------------------------------
// ModeState
// ---------------------------------------------------------------------------

/// Flags and their parameters, guarded together by one lock so a
/// parameter never exists without its flag.
#[derive(Debug, Clone, Default)]
pub(crate) struct ModeState {
    pub(crate) flags: BTreeSet<char>,
    pub(crate) params: BTreeMap<char, String>,
}

impl ModeState {
    pub(crate) fn from_flags(flags: &str) -> Self {
        Self {
            flags: flags.chars().filter(|c| FLAG_MODES.contains(c)).collect(),
            params: BTreeMap::new(),
        }
    }

    /// `+<flags>` plus parameters in flag order, as for `RPL_CHANNELMODEIS`.
    pub(crate) fn render(&self) -> (String, Vec<String>) {
        let mut modes = String::from("+");
        let mut params = Vec::new();
        for flag in &self.flags {
            modes.push(*flag);
            if let Some(param) = self.params.get(flag) {
                params.push(param.clone());
            }
        }
        (modes, params)
    }
}
