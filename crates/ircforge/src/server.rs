//! `IrcServer` builder and lifecycle.
//!
//! This is the entry point for running an ircforge server. It ties
//! together all the layers: transport → protocol → dispatch → session and
//! channel state.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ircforge_channel::{ChannelConfig, ChannelManager};
use ircforge_protocol::{CommandParser, CommandRegistry};
use ircforge_session::{PoolConfig, SessionManager};
use ircforge_transport::{
    ManagerConfig, MetricsSink, NetworkKind, TcpTransport, TracingMetricsSink, Transport,
    TransportManager, WebSocketTransport, DEFAULT_MAX_LINE_LEN,
};
use serde::{Deserialize, Serialize};

use crate::dispatch::CommandDispatcher;
use crate::handlers::{self, Context};
use crate::IrcforgeError;

/// Version string reported in the welcome burst.
pub const SERVER_VERSION: &str = concat!("ircforge-", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Server-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Name used as the source of every numeric reply.
    pub server_name: String,

    /// Network name shown in `001`.
    pub network_name: String,

    /// How often per-session traffic counters are published.
    pub metrics_interval: Duration,

    /// Longest line, terminator excluded, a stream transport accepts
    /// before it drops the connection.
    pub max_line_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: "irc.local".into(),
            network_name: "ircforge".into(),
            metrics_interval: Duration::from_secs(60),
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

// ---------------------------------------------------------------------------
// ServerBuilder
// ---------------------------------------------------------------------------

/// Builder for configuring and assembling an [`IrcServer`].
///
/// # Example
///
/// ```rust,ignore
/// let server = IrcServer::builder()
///     .bind_tcp("0.0.0.0:6667".parse()?)
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct ServerBuilder {
    config: ServerConfig,
    channel_config: ChannelConfig,
    pool_config: PoolConfig,
    registry: Option<Arc<CommandRegistry>>,
    sink: Arc<dyn MetricsSink>,
    tcp_addrs: Vec<SocketAddr>,
    websocket_addrs: Vec<SocketAddr>,
    transports: Vec<Arc<dyn Transport>>,
}

impl ServerBuilder {
    /// Creates a new builder with default settings and no listeners.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            channel_config: ChannelConfig::default(),
            pool_config: PoolConfig::default(),
            registry: None,
            sink: Arc::new(TracingMetricsSink),
            tcp_addrs: Vec::new(),
            websocket_addrs: Vec::new(),
            transports: Vec::new(),
        }
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the channel configuration. Its `server_name` is overridden by
    /// the server's.
    pub fn channel_config(mut self, config: ChannelConfig) -> Self {
        self.channel_config = config;
        self
    }

    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Uses `registry` instead of one holding only the built-in commands.
    pub fn registry(mut self, registry: Arc<CommandRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Adds a plain TCP listener for clients.
    pub fn bind_tcp(mut self, addr: SocketAddr) -> Self {
        self.tcp_addrs.push(addr);
        self
    }

    /// Adds a WebSocket listener for clients.
    pub fn bind_websocket(mut self, addr: SocketAddr) -> Self {
        self.websocket_addrs.push(addr);
        self
    }

    /// Adds any other transport, e.g. a TLS listener.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.push(transport);
        self
    }

    /// Wires every layer together. Nothing listens until
    /// [`IrcServer::start`].
    ///
    /// # Errors
    /// [`IrcforgeError::Transport`] if two transports share a name and port.
    pub async fn build(self) -> Result<IrcServer, IrcforgeError> {
        let config = self.config;
        let transports = TransportManager::new(
            ManagerConfig {
                metrics_interval: config.metrics_interval,
            },
            self.sink,
        );

        let mut tcp = Vec::new();
        for (i, addr) in self.tcp_addrs.into_iter().enumerate() {
            let transport = Arc::new(
                TcpTransport::new(format!("plain-{i}"), addr, NetworkKind::Client)
                    .with_max_line_len(config.max_line_len),
            );
            transports.add_transport(transport.clone()).await?;
            tcp.push(transport);
        }
        let mut websocket = Vec::new();
        for (i, addr) in self.websocket_addrs.into_iter().enumerate() {
            let transport = Arc::new(WebSocketTransport::new(
                format!("websocket-{i}"),
                addr,
                NetworkKind::Client,
            ));
            transports.add_transport(transport.clone()).await?;
            websocket.push(transport);
        }
        for transport in self.transports {
            transports.add_transport(transport).await?;
        }

        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(CommandRegistry::with_builtins()));
        let dispatcher =
            CommandDispatcher::new(CommandParser::new(registry), Arc::clone(&transports));

        let sessions = Arc::new(SessionManager::new(self.pool_config));
        let channels = Arc::new(ChannelManager::new(ChannelConfig {
            server_name: config.server_name.clone(),
            ..self.channel_config
        }));

        let context = Arc::new(Context {
            config: config.clone(),
            started_at: Utc::now(),
            sessions: Arc::clone(&sessions),
            channels: Arc::clone(&channels),
            outbox: dispatcher.outbox().clone(),
        });
        handlers::install(&dispatcher, context);

        tracing::info!(
            server = %config.server_name,
            tcp = tcp.len(),
            websocket = websocket.len(),
            "server assembled"
        );

        Ok(IrcServer {
            config,
            transports,
            dispatcher,
            sessions,
            channels,
            tcp,
            websocket,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// IrcServer
// ---------------------------------------------------------------------------

/// An assembled server.
///
/// Call [`start`](Self::start) to begin accepting connections, or
/// [`run`](Self::run) to start and wait for Ctrl-C.
pub struct IrcServer {
    config: ServerConfig,
    transports: Arc<TransportManager>,
    dispatcher: Arc<CommandDispatcher>,
    sessions: Arc<SessionManager>,
    channels: Arc<ChannelManager>,
    tcp: Vec<Arc<TcpTransport>>,
    websocket: Vec<Arc<WebSocketTransport>>,
}

impl IrcServer {
    /// Creates a new builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Starts the dispatch loop, then every transport.
    ///
    /// # Errors
    /// - [`IrcforgeError::InboundTaken`] if called twice
    /// - [`IrcforgeError::Transport`] if a listener cannot bind
    pub async fn start(&self) -> Result<(), IrcforgeError> {
        self.dispatcher.start()?;
        self.transports.start().await?;
        tracing::info!(server = %self.config.server_name, "server running");
        Ok(())
    }

    /// Starts the server and runs until Ctrl-C, then shuts down.
    pub async fn run(self) -> Result<(), IrcforgeError> {
        self.start().await?;
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "waiting for ctrl-c failed");
        }
        self.shutdown().await;
        Ok(())
    }

    /// Shuts down without losing queued work.
    ///
    /// Intake stops first, then the dispatcher handles every queued command,
    /// then the replies those commands produced are delivered before the
    /// transports close.
    pub async fn shutdown(&self) {
        self.transports.stop_intake();
        self.dispatcher.shutdown().await;
        self.transports.shutdown().await;
    }

    /// Address of the first TCP listener, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.tcp.first().and_then(|t| t.local_addr())
    }

    /// Address of the first WebSocket listener, once started.
    pub fn websocket_addr(&self) -> Option<SocketAddr> {
        self.websocket.first().and_then(|t| t.local_addr())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<CommandDispatcher> {
        &self.dispatcher
    }

    pub fn transports(&self) -> &Arc<TransportManager> {
        &self.transports
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn channels(&self) -> &Arc<ChannelManager> {
        &self.channels
    }
}
