//! Command code → factory lookup.
//!
//! The registry never stores command instances. Commands carry mutable
//! parsed state, so every lookup builds a fresh one from a factory.

use dashmap::DashMap;

use crate::command::{
    Invite, Join, Mode, Nick, Notice, Part, Ping, Pong, Privmsg, Quit, Topic,
    User,
};
use crate::Command;

/// Builds an empty command ready to be parsed into.
pub type CommandFactory = fn() -> Box<dyn Command>;

fn build<T: Command + Default>() -> Box<dyn Command> {
    Box::new(T::default())
}

/// Maps upper-case command codes to factories.
///
/// Built once at startup and shared behind an `Arc`; registration after
/// startup is allowed and safe.
#[derive(Default)]
pub struct CommandRegistry {
    factories: DashMap<String, CommandFactory>,
}

impl CommandRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in client command.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_default::<Nick>();
        registry.register_default::<User>();
        registry.register_default::<Ping>();
        registry.register_default::<Pong>();
        registry.register_default::<Quit>();
        registry.register_default::<Join>();
        registry.register_default::<Part>();
        registry.register_default::<Topic>();
        registry.register_default::<Mode>();
        registry.register_default::<Invite>();
        registry.register_default::<Privmsg>();
        registry.register_default::<Notice>();
        registry
    }

    /// Associates `code` (case-insensitive) with `factory`, replacing any
    /// previous registration. Returns `true` if the code was new.
    pub fn register(&self, code: &str, factory: CommandFactory) -> bool {
        let code = code.to_ascii_uppercase();
        let replaced = self.factories.insert(code.clone(), factory).is_some();
        if replaced {
            tracing::debug!(%code, "command factory replaced");
        }
        !replaced
    }

    /// Registers `T` under the code its default instance reports.
    pub fn register_default<T: Command + Default>(&self) -> bool {
        let code = T::default().code().to_owned();
        self.register(&code, build::<T>)
    }

    /// Builds a fresh, unparsed instance for `code`.
    pub fn instantiate(&self, code: &str) -> Option<Box<dyn Command>> {
        let factory = *self.factories.get(&code.to_ascii_uppercase())?;
        Some(factory())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.factories.contains_key(&code.to_ascii_uppercase())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
