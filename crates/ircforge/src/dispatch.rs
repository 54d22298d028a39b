//! The command dispatch service.
//!
//! Drains the transport manager's inbound queue, parses each batch into
//! typed commands, and hands every command to the listeners registered for
//! its `(network, code)` pair. Replies travel the other way through
//! [`Outbox`].
//!
//! # Ordering
//!
//! There is exactly one dispatch loop. Connection events and inbound data
//! are consumed by the same task, connection events first, so a session's
//! first command is never seen before its `Connected` event. Before a
//! `Disconnected` event is handled, inbound data already queued is
//! dispatched, so a trailing `QUIT` still reaches its listener. On
//! shutdown both queues are drained before the loop exits.
//!
//! # Failure isolation
//!
//! Listeners for one command run one after another in registration order.
//! An error or a panic in one of them is logged and the next one still
//! runs.

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::FutureExt;
use ircforge_protocol::{Command, CommandParser, LINE_TERMINATOR};
use ircforge_transport::{
    ConnectionEvent, NetworkKind, QueuedMessage, SessionId, TransportManager,
};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::IrcforgeError;

// ---------------------------------------------------------------------------
// Listener traits
// ---------------------------------------------------------------------------

/// Handles one command code on one network partition.
#[async_trait]
pub trait CommandListener: Send + Sync + 'static {
    async fn on_command(
        &self,
        session: &SessionId,
        command: &dyn Command,
    ) -> Result<(), IrcforgeError>;
}

/// Observes sessions coming and going.
#[async_trait]
pub trait ConnectionListener: Send + Sync + 'static {
    async fn on_connect(
        &self,
        session: &SessionId,
        endpoint: SocketAddr,
        network: NetworkKind,
    ) -> Result<(), IrcforgeError>;

    async fn on_disconnect(
        &self,
        session: &SessionId,
        network: NetworkKind,
    ) -> Result<(), IrcforgeError>;
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

/// Serializes commands onto the transport manager's outbound queue.
///
/// Cheap to clone; listeners keep one instead of a handle to the
/// dispatcher that owns them.
#[derive(Clone)]
pub struct Outbox {
    transports: Arc<TransportManager>,
}

impl Outbox {
    pub fn new(transports: Arc<TransportManager>) -> Self {
        Self { transports }
    }

    /// Writes `command`, terminates it with `\r\n` and queues it for
    /// `session`, tagged with the session's network partition.
    ///
    /// A session no transport owns is still queued; the outbound consumer
    /// drops it with a warning.
    ///
    /// # Errors
    /// [`IrcforgeError::Transport`] once the manager has shut down.
    pub fn send_command(
        &self,
        session: &SessionId,
        command: &dyn Command,
    ) -> Result<(), IrcforgeError> {
        let mut line = command.write();
        line.push_str(LINE_TERMINATOR);
        let network = self.transports.network_of(session).unwrap_or_default();
        self.transports.enqueue_outbound(QueuedMessage {
            session_id: session.clone(),
            data: line.into_bytes(),
            network,
        })?;
        Ok(())
    }

    pub fn transports(&self) -> &Arc<TransportManager> {
        &self.transports
    }
}

// ---------------------------------------------------------------------------
// CommandDispatcher
// ---------------------------------------------------------------------------

type ListenerKey = (NetworkKind, String);

/// Routes parsed commands to their listeners.
///
/// Construct with [`CommandDispatcher::new`], register listeners, then call
/// [`start`](Self::start) once.
pub struct CommandDispatcher {
    parser: CommandParser,
    outbox: Outbox,
    listeners: DashMap<ListenerKey, Vec<Arc<dyn CommandListener>>>,
    connection_listeners: Mutex<Vec<Arc<dyn ConnectionListener>>>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CommandDispatcher {
    pub fn new(parser: CommandParser, transports: Arc<TransportManager>) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            parser,
            outbox: Outbox::new(transports),
            listeners: DashMap::new(),
            connection_listeners: Mutex::new(Vec::new()),
            shutdown,
            task: Mutex::new(None),
        })
    }

    /// Adds a listener for `code` on `network`. Codes are matched
    /// case-insensitively.
    pub fn add_listener(
        &self,
        code: &str,
        network: NetworkKind,
        listener: Arc<dyn CommandListener>,
    ) {
        let code = code.to_ascii_uppercase();
        tracing::debug!(%code, %network, "command listener added");
        self.listeners
            .entry((network, code))
            .or_default()
            .push(listener);
    }

    pub fn add_connection_listener(&self, listener: Arc<dyn ConnectionListener>) {
        self.connection_listeners.lock().push(listener);
    }

    /// Number of listeners registered for `code` on `network`.
    pub fn listener_count(&self, code: &str, network: NetworkKind) -> usize {
        self.listeners
            .get(&(network, code.to_ascii_uppercase()))
            .map_or(0, |l| l.len())
    }

    pub fn parser(&self) -> &CommandParser {
        &self.parser
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// See [`Outbox::send_command`].
    pub fn send_command(
        &self,
        session: &SessionId,
        command: &dyn Command,
    ) -> Result<(), IrcforgeError> {
        self.outbox.send_command(session, command)
    }

    /// Takes the inbound queue and spawns the dispatch loop.
    ///
    /// # Errors
    /// [`IrcforgeError::InboundTaken`] if the queue already has a consumer.
    pub fn start(self: &Arc<Self>) -> Result<(), IrcforgeError> {
        let transports = self.outbox.transports();
        let inbound = transports.take_inbound().ok_or(IrcforgeError::InboundTaken)?;
        let events = transports.subscribe();

        let task = tokio::spawn(Arc::clone(self).run(inbound, events));
        *self.task.lock() = Some(task);
        tracing::info!("command dispatcher started");
        Ok(())
    }

    /// Stops the dispatch loop once everything already queued has been
    /// handled.
    ///
    /// Connection events and inbound batches that are queued when the
    /// signal arrives are still dispatched, in the usual order. Stop the
    /// transport manager's intake first so the queues stop growing.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        tracing::info!("command dispatcher stopped");
    }

    async fn run(
        self: Arc<Self>,
        mut inbound: mpsc::UnboundedReceiver<QueuedMessage>,
        mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
    ) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    self.drain(&mut inbound, &mut events).await;
                    break;
                }
                Some(event) = events.recv() => self.handle_event(event, &mut inbound).await,
                Some(message) = inbound.recv() => self.dispatch(message).await,
                else => break,
            }
        }
    }

    async fn handle_event(
        &self,
        event: ConnectionEvent,
        inbound: &mut mpsc::UnboundedReceiver<QueuedMessage>,
    ) {
        if matches!(event, ConnectionEvent::Disconnected { .. }) {
            while let Ok(message) = inbound.try_recv() {
                self.dispatch(message).await;
            }
        }
        self.notify(event).await;
    }

    /// Handles whatever is queued without waiting for more.
    async fn drain(
        &self,
        inbound: &mut mpsc::UnboundedReceiver<QueuedMessage>,
        events: &mut mpsc::UnboundedReceiver<ConnectionEvent>,
    ) {
        let mut drained = 0usize;
        loop {
            if let Ok(event) = events.try_recv() {
                self.handle_event(event, inbound).await;
            } else if let Ok(message) = inbound.try_recv() {
                self.dispatch(message).await;
            } else {
                break;
            }
            drained += 1;
        }
        tracing::debug!(drained, "dispatch queues drained");
    }

    /// Parses one inbound batch and runs the listeners of every command in
    /// it, in order.
    pub async fn dispatch(&self, message: QueuedMessage) {
        let QueuedMessage {
            session_id,
            data,
            network,
        } = message;

        for command in self.parser.parse(&data) {
            let code = command.code().to_ascii_uppercase();
            // Cloned out so no map guard is held across an await.
            let listeners: Vec<Arc<dyn CommandListener>> = self
                .listeners
                .get(&(network, code.clone()))
                .map(|l| l.clone())
                .unwrap_or_default();

            if listeners.is_empty() {
                tracing::debug!(%session_id, %code, %network, "no listener for command");
                continue;
            }

            for listener in listeners {
                let outcome = AssertUnwindSafe(listener.on_command(&session_id, &*command))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(IrcforgeError::ListenerPanicked {
                            code: code.clone(),
                            message: panic_message(panic),
                        })
                    });
                if let Err(e) = outcome {
                    tracing::warn!(%session_id, %code, error = %e, "command listener failed");
                }
            }
        }
    }

    async fn notify(&self, event: ConnectionEvent) {
        let listeners: Vec<Arc<dyn ConnectionListener>> =
            self.connection_listeners.lock().clone();

        for listener in listeners {
            let outcome = match &event {
                ConnectionEvent::Connected {
                    session_id,
                    endpoint,
                    network,
                    ..
                } => {
                    AssertUnwindSafe(listener.on_connect(session_id, *endpoint, *network))
                        .catch_unwind()
                        .await
                }
                ConnectionEvent::Disconnected {
                    session_id,
                    network,
                    ..
                } => {
                    AssertUnwindSafe(listener.on_disconnect(session_id, *network))
                        .catch_unwind()
                        .await
                }
            };
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, ?event, "connection listener failed"),
                Err(panic) => tracing::error!(
                    message = %panic_message(panic),
                    ?event,
                    "connection listener panicked"
                ),
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ircforge_protocol::{CommandRegistry, Ping};
    use ircforge_transport::{ManagerConfig, TracingMetricsSink};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dispatcher() -> Arc<CommandDispatcher> {
        let transports =
            TransportManager::new(ManagerConfig::default(), Arc::new(TracingMetricsSink));
        let parser = CommandParser::new(Arc::new(CommandRegistry::with_builtins()));
        CommandDispatcher::new(parser, transports)
    }

    struct Counter(AtomicUsize);

    #[async_trait]
    impl CommandListener for Counter {
        async fn on_command(&self, _: &SessionId, _: &dyn Command) -> Result<(), IrcforgeError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn inbound(data: &str, network: NetworkKind) -> QueuedMessage {
        QueuedMessage {
            session_id: SessionId::new("s1"),
            data: data.as_bytes().to_vec(),
            network,
        }
    }

    #[test]
    fn test_add_listener_code_is_case_insensitive() {
        let d = dispatcher();
        d.add_listener("ping", NetworkKind::Client, Arc::new(Counter(AtomicUsize::new(0))));
        assert_eq!(d.listener_count("PING", NetworkKind::Client), 1);
        assert_eq!(d.listener_count("PING", NetworkKind::Server), 0);
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_network() {
        let d = dispatcher();
        let client = Arc::new(Counter(AtomicUsize::new(0)));
        let server = Arc::new(Counter(AtomicUsize::new(0)));
        d.add_listener("PING", NetworkKind::Client, client.clone());
        d.add_listener("PING", NetworkKind::Server, server.clone());

        d.dispatch(inbound("PING a\r\nPING b\r\n", NetworkKind::Server)).await;

        assert_eq!(client.0.load(Ordering::SeqCst), 0);
        assert_eq!(server.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_send_command_unknown_session_is_still_queued() {
        let d = dispatcher();
        let result = d.send_command(&SessionId::new("ghost"), &Ping::new("x"));
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_start_twice_returns_inbound_taken() {
        let d = dispatcher();
        d.start().unwrap();
        assert!(matches!(d.start(), Err(IrcforgeError::InboundTaken)));
        d.shutdown().await;
    }

    #[test]
    fn test_panic_message_extracts_str_and_string() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(7_u8)), "unknown panic");
    }
}
