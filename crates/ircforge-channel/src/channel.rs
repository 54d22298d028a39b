//! The channel entity: membership, modes, mask lists and topic.
//!
//! # Concurrency note
//!
//! A `Channel` is shared as `Arc<Channel>` and every method takes `&self`.
//! Members and mask lists are `DashMap`s, so adds and removes are atomic per
//! key. Mode flags and their parameters sit behind one `parking_lot`
//! `RwLock`, held only for the duration of a single read or update and
//! never across an `.await`.

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::mask::{normalize_mask, wildcard_match};
use crate::modes::{
    BanEntry, ListKind, ModeChange, ModeState, FLAG_MODES,
};

/// Per-member status in one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// Nickname as the member spelled it.
    pub nickname: String,
    pub operator: bool,
    pub voice: bool,
    pub joined_at: DateTime<Utc>,
}

/// Current topic with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicInfo {
    pub text: String,
    pub set_by: String,
    pub set_at: DateTime<Utc>,
}

/// A named, joinable group.
#[derive(Debug)]
pub struct Channel {
    name: String,
    created_at: DateTime<Utc>,
    topic: RwLock<Option<TopicInfo>>,
    modes: RwLock<ModeState>,
    /// Case-folded nickname → membership.
    members: DashMap<String, Membership>,
    bans: DashMap<String, BanEntry>,
    ban_exceptions: DashMap<String, BanEntry>,
    invite_exceptions: DashMap<String, BanEntry>,
    /// Case-folded nicknames allowed past `+i`.
    invites: DashSet<String>,
}

fn fold(nickname: &str) -> String {
    nickname.to_ascii_lowercase()
}

impl Channel {
    /// Creates an empty channel with the given initial flag modes.
    pub fn new(name: impl Into<String>, default_modes: &str) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
            topic: RwLock::new(None),
            modes: RwLock::new(ModeState::from_flags(default_modes)),
            members: DashMap::new(),
            bans: DashMap::new(),
            ban_exceptions: DashMap::new(),
            invite_exceptions: DashMap::new(),
            invites: DashSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    // -- topic ------------------------------------------------------------

    pub fn topic(&self) -> Option<TopicInfo> {
        self.topic.read().clone()
    }

    /// Sets the topic. An empty `text` clears it.
    pub fn set_topic(&self, text: &str, set_by: &str) {
        let next = (!text.is_empty()).then(|| TopicInfo {
            text: text.to_owned(),
            set_by: set_by.to_owned(),
            set_at: Utc::now(),
        });
        *self.topic.write() = next;
    }

    // -- modes ------------------------------------------------------------

    pub fn has_mode(&self, mode: char) -> bool {
        self.modes.read().flags.contains(&mode)
    }

    /// Sets a flag or parameter mode. Returns `true` if state changed.
    ///
    /// Parameter modes (`k`, `l`) need `param`; without it nothing
    /// happens. Re-setting a parameter mode with a new value counts as a
    /// change.
    pub fn set_mode(&self, mode: char, param: Option<&str>) -> bool {
        let mut state = self.modes.write();
        match mode {
            'k' | 'l' => {
                let Some(param) = param else {
                    return false;
                };
                let unchanged = state.params.get(&mode).map(String::as_str) == Some(param);
                if unchanged {
                    return false;
                }
                state.flags.insert(mode);
                state.params.insert(mode, param.to_owned());
                true
            }
            _ => state.flags.insert(mode),
        }
    }

    /// Clears a mode and its parameter. Returns `true` if it was set.
    pub fn remove_mode(&self, mode: char) -> bool {
        let mut state = self.modes.write();
        state.params.remove(&mode);
        state.flags.remove(&mode)
    }

    /// The stored parameter of `mode`, if the mode is set.
    pub fn mode_param(&self, mode: char) -> Option<String> {
        self.modes.read().params.get(&mode).cloned()
    }

    /// Member limit (`+l`). `None` when unset or unparsable.
    pub fn user_limit(&self) -> Option<usize> {
        self.mode_param('l')?.parse().ok()
    }

    /// Channel key (`+k`).
    pub fn key(&self) -> Option<String> {
        self.mode_param('k')
    }

    /// Current modes as `("+klnt", ["key", "10"])`.
    pub fn mode_string(&self) -> (String, Vec<String>) {
        self.modes.read().render()
    }

    /// Applies a mode string left to right and returns what changed.
    ///
    /// - `+`/`-` switch the sign; it starts as `+`.
    /// - `k`, `l`, `b`, `e`, `I` take the next parameter when adding;
    ///   `b`, `e`, `I` also take one when removing, and `-k` takes one if
    ///   any are left.
    /// - `o`, `v` take a nickname either way and only apply to members.
    /// - A parameter mode with no parameter left, an unparsable limit, and
    ///   unknown mode characters are skipped.
    ///
    /// Only effective changes are returned, in order.
    pub fn apply_mode_changes(
        &self,
        mode_string: &str,
        params: &[String],
        set_by: &str,
    ) -> Vec<ModeChange> {
        let mut params = params.iter();
        let mut adding = true;
        let mut changes = Vec::new();

        for mode in mode_string.chars() {
            match mode {
                '+' => adding = true,
                '-' => adding = false,
                'k' if adding => {
                    let Some(key) = params.next() else { continue };
                    if self.set_mode('k', Some(key)) {
                        changes.push(ModeChange::add('k', Some(key.clone())));
                    }
                }
                'k' => {
                    let given = params.next();
                    if self.remove_mode('k') {
                        let shown = given.cloned().unwrap_or_else(|| "*".to_owned());
                        changes.push(ModeChange::remove('k', Some(shown)));
                    }
                }
                'l' if adding => {
                    let Some(limit) = params.next() else { continue };
                    let valid = limit.parse::<usize>().is_ok_and(|l| l > 0);
                    if valid && self.set_mode('l', Some(limit)) {
                        changes.push(ModeChange::add('l', Some(limit.clone())));
                    }
                }
                'l' => {
                    if self.remove_mode('l') {
                        changes.push(ModeChange::remove('l', None));
                    }
                }
                'b' | 'e' | 'I' => {
                    let Some(mask) = params.next() else { continue };
                    let Some(kind) = ListKind::from_mode(mode) else { continue };
                    let mask = normalize_mask(mask);
                    let changed = if adding {
                        self.add_list_entry(kind, &mask, set_by)
                    } else {
                        self.remove_list_entry(kind, &mask)
                    };
                    if changed {
                        changes.push(ModeChange { adding, mode, param: Some(mask) });
                    }
                }
                'o' | 'v' => {
                    let Some(nick) = params.next() else { continue };
                    let Some(member) = self.membership(nick) else { continue };
                    let current = if mode == 'o' { member.operator } else { member.voice };
                    if current == adding {
                        continue;
                    }
                    let applied = if mode == 'o' {
                        self.set_operator(nick, adding)
                    } else {
                        self.set_voice(nick, adding)
                    };
                    if applied {
                        changes.push(ModeChange { adding, mode, param: Some(member.nickname) });
                    }
                }
                flag if FLAG_MODES.contains(&flag) => {
                    let changed = if adding {
                        self.set_mode(flag, None)
                    } else {
                        self.remove_mode(flag)
                    };
                    if changed {
                        changes.push(ModeChange { adding, mode: flag, param: None });
                    }
                }
                unknown => {
                    tracing::debug!(channel = %self.name, mode = %unknown, "unknown channel mode skipped");
                }
            }
        }

        changes
    }

    // -- membership -------------------------------------------------------

    /// Adds `nickname` as a plain member.
    ///
    /// Returns `None` (and changes nothing) if it already is a member.
    pub fn add_member(&self, nickname: &str) -> Option<Membership> {
        self.add_member_with(nickname, false)
    }

    /// Adds `nickname`, with operator status if `operator` is set.
    ///
    /// Returns `None` (and changes nothing) if it already is a member.
    pub fn add_member_with(&self, nickname: &str, operator: bool) -> Option<Membership> {
        use dashmap::mapref::entry::Entry;

        match self.members.entry(fold(nickname)) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let membership = Membership {
                    nickname: nickname.to_owned(),
                    operator,
                    voice: false,
                    joined_at: Utc::now(),
                };
                slot.insert(membership.clone());
                Some(membership)
            }
        }
    }

    pub fn remove_member(&self, nickname: &str) -> Option<Membership> {
        self.members.remove(&fold(nickname)).map(|(_, m)| m)
    }

    pub fn is_member(&self, nickname: &str) -> bool {
        self.members.contains_key(&fold(nickname))
    }

    pub fn membership(&self, nickname: &str) -> Option<Membership> {
        self.members.get(&fold(nickname)).map(|m| m.clone())
    }

    pub fn is_operator(&self, nickname: &str) -> bool {
        self.members
            .get(&fold(nickname))
            .is_some_and(|m| m.operator)
    }

    pub fn is_voiced(&self, nickname: &str) -> bool {
        self.members.get(&fold(nickname)).is_some_and(|m| m.voice)
    }

    /// Returns `false` if `nickname` is not a member.
    pub fn set_operator(&self, nickname: &str, operator: bool) -> bool {
        match self.members.get_mut(&fold(nickname)) {
            Some(mut m) => {
                m.operator = operator;
                true
            }
            None => false,
        }
    }

    /// Returns `false` if `nickname` is not a member.
    pub fn set_voice(&self, nickname: &str, voice: bool) -> bool {
        match self.members.get_mut(&fold(nickname)) {
            Some(mut m) => {
                m.voice = voice;
                true
            }
            None => false,
        }
    }

    /// Re-keys a member after a nickname change, keeping its status.
    pub fn rename_member(&self, old: &str, new: &str) -> bool {
        let Some((_, mut membership)) = self.members.remove(&fold(old)) else {
            return false;
        };
        membership.nickname = new.to_owned();
        self.members.insert(fold(new), membership);
        true
    }

    /// `@nick` for operators, `+nick` for voiced members, otherwise the
    /// bare nickname. `None` if not a member.
    pub fn prefixed_nickname(&self, nickname: &str) -> Option<String> {
        let member = self.members.get(&fold(nickname))?;
        let prefix = if member.operator {
            "@"
        } else if member.voice {
            "+"
        } else {
            ""
        };
        Some(format!("{prefix}{}", member.nickname))
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Member nicknames as spelled by their owners, sorted.
    pub fn member_nicknames(&self) -> Vec<String> {
        let mut nicks: Vec<String> =
            self.members.iter().map(|m| m.nickname.clone()).collect();
        nicks.sort_by_key(|n| fold(n));
        nicks
    }

    /// Prefixed member nicknames for a NAMES reply, sorted.
    pub fn names(&self) -> Vec<String> {
        self.member_nicknames()
            .iter()
            .filter_map(|n| self.prefixed_nickname(n))
            .collect()
    }

    // -- invites ----------------------------------------------------------

    pub fn invite(&self, nickname: &str) {
        self.invites.insert(fold(nickname));
    }

    pub fn is_invited(&self, nickname: &str) -> bool {
        self.invites.contains(&fold(nickname))
    }

    /// Consumes an invite. Returns `true` if there was one.
    pub fn take_invite(&self, nickname: &str) -> bool {
        self.invites.remove(&fold(nickname)).is_some()
    }

    // -- mask lists -------------------------------------------------------

    fn list(&self, kind: ListKind) -> &DashMap<String, BanEntry> {
        match kind {
            ListKind::Ban => &self.bans,
            ListKind::BanException => &self.ban_exceptions,
            ListKind::InviteException => &self.invite_exceptions,
        }
    }

    /// Adds `mask` to a list. Returns `false` if it was already there.
    pub fn add_list_entry(&self, kind: ListKind, mask: &str, set_by: &str) -> bool {
        use dashmap::mapref::entry::Entry;

        match self.list(kind).entry(mask.to_ascii_lowercase()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(BanEntry {
                    mask: mask.to_owned(),
                    set_by: set_by.to_owned(),
                    set_at: Utc::now(),
                });
                true
            }
        }
    }

    /// Removes `mask` from a list. Returns `false` if it was not there.
    pub fn remove_list_entry(&self, kind: ListKind, mask: &str) -> bool {
        self.list(kind).remove(&mask.to_ascii_lowercase()).is_some()
    }

    /// Entries of a list, oldest first.
    pub fn list_entries(&self, kind: ListKind) -> Vec<BanEntry> {
        let mut entries: Vec<BanEntry> =
            self.list(kind).iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.set_at.cmp(&b.set_at).then_with(|| a.mask.cmp(&b.mask)));
        entries
    }

    /// Returns `true` if any entry of `kind` matches `full_name`.
    pub fn list_matches(&self, kind: ListKind, full_name: &str) -> bool {
        self.list(kind)
            .iter()
            .any(|e| wildcard_match(&e.mask, full_name))
    }

    /// Banned and not covered by a ban exception.
    pub fn is_banned(&self, full_name: &str) -> bool {
        self.list_matches(ListKind::Ban, full_name)
            && !self.list_matches(ListKind::BanException, full_name)
    }

    // -- gating -----------------------------------------------------------

    /// Whether `nickname` may speak in the channel.
    ///
    /// - `+n`: non-members may not.
    /// - `+m`: only operators and voiced members may.
    /// - `+i`: non-members need an invite.
    pub fn user_can_send_message(&self, nickname: &str) -> bool {
        let member = self.membership(nickname);

        if self.has_mode('n') && member.is_none() {
            return false;
        }
        if self.has_mode('m') && !member.as_ref().is_some_and(|m| m.operator || m.voice) {
            return false;
        }
        if self.has_mode('i') && member.is_none() && !self.is_invited(nickname) {
            return false;
        }
        true
    }

    /// `false` only when the channel is invite-only and `nickname` holds
    /// no invite. Masks are checked by the join orchestration.
    pub fn nickname_can_join(&self, nickname: &str) -> bool {
        !self.has_mode('i') || self.is_invited(nickname)
    }
}
