//! The session entity: everything the server knows about one connection.
//!
//! A session tracks:
//! - WHERE the connection comes from (session id, endpoint, hostname)
//! - HOW far registration got (`nick_sent`, `user_sent`, `registered`)
//! - WHO the client claims to be (nickname, username, real name)
//! - WHEN it was last heard from (activity and ping timestamps)
//!
//! Sessions are recycled through a [`SessionPool`](crate::SessionPool), so
//! [`Session::initialize`] must reset every field. Adding a field means
//! adding it there too.

use std::net::SocketAddr;
use std::time::Instant;

use ircforge_transport::SessionId;

/// Longest nickname accepted by [`is_valid_nickname`].
pub const MAX_NICKNAME_LEN: usize = 30;

/// Mutable state of one logical connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub endpoint: Option<SocketAddr>,

    pub nick_sent: bool,
    pub user_sent: bool,
    pub registered: bool,

    pub nickname: String,
    pub username: String,
    pub realname: String,
    pub hostname: String,
    /// Cloak shown instead of `hostname` when set.
    pub vhost: Option<String>,

    pub last_activity: Option<Instant>,
    pub last_ping: Option<Instant>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            id: SessionId::new(""),
            endpoint: None,
            nick_sent: false,
            user_sent: false,
            registered: false,
            nickname: String::new(),
            username: String::new(),
            realname: String::new(),
            hostname: String::new(),
            vhost: None,
            last_activity: None,
            last_ping: None,
        }
    }
}

impl Session {
    /// Resets every field to its empty value.
    ///
    /// Called by the pool on both acquire and release.
    pub fn initialize(&mut self) {
        *self = Self::default();
    }

    /// Binds a freshly initialized session to a connection.
    pub(crate) fn attach(&mut self, id: SessionId, endpoint: Option<SocketAddr>) {
        self.id = id;
        self.endpoint = endpoint;
        self.hostname = endpoint
            .map(|addr| addr.ip().to_string())
            .unwrap_or_default();
        self.last_activity = Some(Instant::now());
    }

    /// `nick!user@host`, using the virtual host when one is set.
    pub fn full_name(&self) -> String {
        let host = self.vhost.as_deref().unwrap_or(&self.hostname);
        format!("{}!{}@{}", self.nickname, self.username, host)
    }

    /// `true` once NICK and USER were received and registration completed.
    pub fn is_authenticated(&self) -> bool {
        self.nick_sent && self.user_sent && self.registered
    }

    /// `true` when both NICK and USER arrived but the welcome burst has
    /// not been sent yet.
    pub fn ready_to_register(&self) -> bool {
        self.nick_sent && self.user_sent && !self.registered
    }

    /// Records a NICK. Uniqueness is the manager's job.
    pub fn set_nick(&mut self, nickname: impl Into<String>) {
        self.nickname = nickname.into();
        self.nick_sent = true;
        self.touch();
    }

    /// Records a USER.
    pub fn set_user(&mut self, username: impl Into<String>, realname: impl Into<String>) {
        self.username = username.into();
        self.realname = realname.into();
        self.user_sent = true;
        self.touch();
    }

    /// Marks registration complete. Returns `false` if it already was,
    /// or if NICK and USER have not both been seen.
    pub fn complete_registration(&mut self) -> bool {
        if !self.ready_to_register() {
            return false;
        }
        self.registered = true;
        true
    }

    pub fn touch(&mut self) {
        self.last_activity = Some(Instant::now());
    }

    pub fn record_ping(&mut self) {
        self.last_ping = Some(Instant::now());
    }
}

/// Checks nickname syntax.
///
/// First character: a letter or one of ``[]\`_^{|}``. Following
/// characters may also be digits or `-`.
pub fn is_valid_nickname(nickname: &str) -> bool {
    fn special(c: char) -> bool {
        matches!(c, '[' | ']' | '\\' | '`' | '_' | '^' | '{' | '|' | '}')
    }

    let mut chars = nickname.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    nickname.len() <= MAX_NICKNAME_LEN
        && (first.is_ascii_alphabetic() || special(first))
        && chars.all(|c| c.is_ascii_alphanumeric() || special(c) || c == '-')
}
