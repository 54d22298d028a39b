//! The [`Command`] trait and the built-in command types.
//!
//! Every command is a plain struct with public fields. Parsing mutates a
//! fresh default instance in place; writing produces one line without the
//! terminator. For every built-in type, `write()` output parses back into
//! an equal value.

use std::any::Any;
use std::fmt;

use crate::ProtocolError;

mod channel;
mod messaging;
mod registration;
mod reply;

pub use channel::{Invite, Join, Mode, Part, Topic};
pub use messaging::{Notice, Privmsg};
pub use registration::{Nick, Ping, Pong, Quit, User};
pub use reply::{Reply, Unparsed};

/// A typed protocol unit.
///
/// ## Trait bounds explained
///
/// - `Send + Sync` lets parsed commands cross into listener tasks.
/// - `Any` (through [`as_any`](Command::as_any)) lets a listener recover
///   the concrete type after the dispatcher routed it by code.
pub trait Command: Any + Send + Sync + fmt::Debug {
    /// The canonical, upper-case command code (`"NICK"`, `"001"`).
    fn code(&self) -> &str;

    /// Fills `self` from one protocol line.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] when the line is not a well-formed
    /// instance of this command. `self` may be partially written in that
    /// case and should be discarded.
    fn parse(&mut self, line: &str) -> Result<(), ProtocolError>;

    /// Serializes `self` as one line, without the `\r\n` terminator.
    fn write(&self) -> String;

    fn as_any(&self) -> &dyn Any;
}

impl<'a> dyn Command + 'a {
    /// Returns the concrete command if it is a `T`.
    pub fn downcast_ref<T: Command>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Returns `true` if the concrete command is a `T`.
    pub fn is<T: Command>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// Splits a comma-separated list parameter, dropping empty items.
pub(crate) fn split_list(param: &str) -> Vec<String> {
    param
        .split(',')
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}
