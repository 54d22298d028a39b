//! # ircforge
//!
//! A line-oriented chat server core speaking an IRC-like protocol.
//!
//! ircforge wires four layers together: transports accept connections and
//! move bytes, the protocol crate frames and parses them into typed
//! commands, the dispatcher routes each command to its listeners, and the
//! session and channel crates hold the state those listeners change.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ircforge::prelude::*;
//!
//! # async fn example() -> Result<(), IrcforgeError> {
//! let server = IrcServer::builder()
//!     .bind_tcp("127.0.0.1:6667".parse().expect("valid address"))
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```
//!
//! Custom commands are added by registering a factory in a
//! [`CommandRegistry`](ircforge_protocol::CommandRegistry), passing it to
//! [`ServerBuilder::registry`], and adding a [`CommandListener`] for the
//! code on the server's dispatcher.

mod dispatch;
mod error;
mod handlers;
mod server;

pub use dispatch::{CommandDispatcher, CommandListener, ConnectionListener, Outbox};
pub use error::IrcforgeError;
pub use server::{IrcServer, ServerBuilder, ServerConfig, SERVER_VERSION};

pub use ircforge_channel as channel;
pub use ircforge_protocol as protocol;
pub use ircforge_session as session;
pub use ircforge_transport as transport;

/// Everything needed to assemble a server and add listeners.
pub mod prelude {
    pub use crate::{
        CommandDispatcher, CommandListener, ConnectionListener, IrcServer, IrcforgeError,
        Outbox, ServerBuilder, ServerConfig,
    };
    pub use ircforge_channel::{ChannelConfig, ChannelError};
    pub use ircforge_protocol::{Command, CommandParser, CommandRegistry};
    pub use ircforge_session::PoolConfig;
    pub use ircforge_transport::{NetworkKind, SessionId};
}
