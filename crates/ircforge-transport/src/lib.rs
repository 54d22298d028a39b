//! Transport abstraction layer for ircforge.
//!
//! Provides the [`Transport`] capability trait implemented by concrete
//! stream transports, the [`TransportEvent`] notifications they emit, and the
//! [`TransportManager`] that multiplexes every registered transport through
//! one inbound and one outbound queue.
//!
//! # Feature Flags
//!
//! - `tcp` (default) — plain line-oriented TCP transport
//! - `tls` — the TCP transport over a caller-provided `tokio-rustls` acceptor
//! - `websocket` (default) — WebSocket transport via `tokio-tungstenite`

mod error;
mod manager;
mod metrics;
mod stream;
#[cfg(feature = "tcp")]
mod tcp;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use manager::{
    ConnectionEvent, ManagerConfig, QueuedMessage, TransportManager,
};
pub use metrics::{
    MetricsSink, SessionTraffic, TracingMetricsSink, TrafficCounters,
};
pub use stream::{LineAccumulator, DEFAULT_MAX_LINE_LEN};
#[cfg(feature = "tcp")]
pub use tcp::TcpTransport;
#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Counter for generating unique transport IDs.
static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Opaque identifier for one logical connection.
///
/// Session ids are strings on the wire and in logs. Transports generate them
/// with [`SessionId::generate`] when they accept a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random 32-character hex identifier (128 bits).
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::rng().random();
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a registered transport instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportId(u64);

impl TransportId {
    /// Allocates the next process-wide unique transport id.
    pub fn next() -> Self {
        Self(NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport-{}", self.0)
    }
}

/// The network partition a transport serves.
///
/// Command listeners are registered per `(NetworkKind, code)` so that the
/// same command code can mean different things to clients and to peer
/// servers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    /// Client-facing connections.
    #[default]
    Client,
    /// Server-to-server links.
    Server,
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("client"),
            Self::Server => f.write_str("server"),
        }
    }
}

/// Static description of a transport instance.
#[derive(Debug, Clone)]
pub struct TransportInfo {
    /// Unique id, allocated when the transport is constructed.
    pub id: TransportId,
    /// Human-readable name (e.g. `"plain"`, `"tls"`).
    pub name: String,
    /// Port the transport listens on. Together with `name` this must be
    /// unique within a [`TransportManager`].
    pub port: u16,
    /// Partition every session of this transport belongs to.
    pub network: NetworkKind,
    /// Whether the transport encrypts its streams.
    pub secure: bool,
}

impl TransportInfo {
    /// Creates a new description with a freshly allocated id.
    pub fn new(
        name: impl Into<String>,
        port: u16,
        network: NetworkKind,
        secure: bool,
    ) -> Self {
        Self {
            id: TransportId::next(),
            name: name.into(),
            port,
            network,
            secure,
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Notifications a transport emits from its I/O tasks.
///
/// These are delivered over an unbounded channel so emitting one never
/// blocks the connection's read loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A new session was accepted.
    Connected {
        transport: TransportId,
        session: SessionId,
        endpoint: SocketAddr,
    },
    /// A session ended, for whatever reason.
    Disconnected {
        transport: TransportId,
        session: SessionId,
    },
    /// A batch of complete protocol lines arrived.
    Received {
        transport: TransportId,
        session: SessionId,
        data: Vec<u8>,
    },
}

/// Sender half handed to a transport when it is started.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

// ---------------------------------------------------------------------------
// Transport capability
// ---------------------------------------------------------------------------

/// A connection-oriented endpoint that accepts sessions and exchanges bytes.
///
/// The manager holds transports as `Arc<dyn Transport>`, so the trait uses
/// `async_trait` to stay object safe.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Returns the static description of this transport.
    fn info(&self) -> &TransportInfo;

    /// Starts accepting sessions. Events are emitted on `events` until
    /// [`stop`](Self::stop) is called.
    async fn start(&self, events: EventSender) -> Result<(), TransportError>;

    /// Stops accepting sessions and closes every open one.
    async fn stop(&self) -> Result<(), TransportError>;

    /// Queues `data` for delivery to the given session.
    async fn send(
        &self,
        session: &SessionId,
        data: &[u8],
    ) -> Result<(), TransportError>;

    /// Closes the given session.
    async fn disconnect(&self, session: &SessionId)
    -> Result<(), TransportError>;

    /// Returns `true` if the session is currently open on this transport.
    fn has_session(&self, session: &SessionId) -> bool;
}
