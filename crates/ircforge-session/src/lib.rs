//! Client session state for ircforge.
//!
//! This crate handles the lifecycle of client connections:
//!
//! 1. **Session entity** — registration flags and identity of one
//!    connection ([`Session`])
//! 2. **Pooling** — recycled session values with a mandatory reset
//!    ([`SessionPool`])
//! 3. **Tracking** — who is connected and which nicknames are taken
//!    ([`SessionManager`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Feature handlers (above)  ← read and update sessions per command
//!     ↕
//! Session Layer (this crate)  ← connection identity and registration
//!     ↕
//! Transport Layer (below)  ← provides SessionId and connect/disconnect
//! ```

mod error;
mod manager;
mod pool;
mod session;

pub use error::SessionError;
pub use manager::SessionManager;
pub use pool::{PoolConfig, SessionPool};
pub use session::{is_valid_nickname, Session, MAX_NICKNAME_LEN};
