//! Wire protocol for ircforge.
//!
//! This crate turns raw bytes into typed commands and back:
//!
//! - **Framing** ([`frame`]) splits a byte buffer into protocol lines.
//! - **Commands** ([`Command`] and the built-in command types) know how
//!   to parse one line and how to write themselves back out.
//! - **Registry** ([`CommandRegistry`]) maps a command code to a factory
//!   producing a fresh command instance.
//! - **Parser** ([`CommandParser`]) ties the three together.
//!
//! # Architecture
//!
//! The protocol layer sits between the transport manager (raw bytes) and
//! the dispatch service (typed commands). It knows nothing about sockets,
//! sessions or channels.
//!
//! ```text
//! bytes → frame() → lines → registry lookup → Box<dyn Command>
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

pub mod command;
mod error;
mod framer;
mod message;
mod parser;
mod registry;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use command::{
    Command, Invite, Join, Mode, Nick, Notice, Part, Ping, Pong, Privmsg,
    Quit, Reply, Topic, Unparsed, User,
};
pub use error::ProtocolError;
pub use framer::{frame, frame_reference};
pub use message::{needs_colon_prefix, LineParts};
pub use parser::CommandParser;
pub use registry::{CommandFactory, CommandRegistry};

/// Terminator appended to every outbound line.
pub const LINE_TERMINATOR: &str = "\r\n";
