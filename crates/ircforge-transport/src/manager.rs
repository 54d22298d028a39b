//! The transport manager: owns every registered transport and routes bytes
//! between them and the rest of the server.
//!
//! # Queues
//!
//! ```text
//!  transport I/O tasks ──events──→ pump task ──→ inbound queue ──→ dispatcher
//!                                                                     │
//!  transport.send() ←── outbound consumer ←── outbound queue ←────────┘
//! ```
//!
//! Both queues are unbounded. The inbound side must never push back on a
//! socket read loop, and the outbound side is drained by exactly one task so
//! replies leave in enqueue order.
//!
//! # Concurrency note
//!
//! All maps are `DashMap`s: connection tasks, the pump tasks and the single
//! outbound consumer mutate them concurrently, and no lock is ever held
//! across an `.await`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::{
    EventSender, MetricsSink, NetworkKind, SessionId, SessionTraffic,
    TrafficCounters, Transport, TransportError, TransportEvent, TransportId,
};

// ---------------------------------------------------------------------------
// Public message types
// ---------------------------------------------------------------------------

/// A raw message travelling through one of the manager's queues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub session_id: SessionId,
    pub data: Vec<u8>,
    pub network: NetworkKind,
}

/// Connection lifecycle notifications re-emitted to higher layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected {
        session_id: SessionId,
        transport: TransportId,
        endpoint: SocketAddr,
        network: NetworkKind,
    },
    Disconnected {
        session_id: SessionId,
        transport: TransportId,
        network: NetworkKind,
    },
}

/// Tunables for the [`TransportManager`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// How often per-session traffic counters are published.
    pub metrics_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            metrics_interval: Duration::from_secs(60),
        }
    }
}

// ---------------------------------------------------------------------------
// TransportManager
// ---------------------------------------------------------------------------

struct Registered {
    transport: Arc<dyn Transport>,
    events: EventSender,
}

/// Multiplexes all transports through one inbound and one outbound queue.
///
/// Construct with [`TransportManager::new`], register transports with
/// [`add_transport`](Self::add_transport), take the inbound receiver for the
/// dispatcher, then call [`start`](Self::start).
pub struct TransportManager {
    config: ManagerConfig,
    transports: DashMap<TransportId, Registered>,
    /// `(name, port)` → id, used to reject duplicate registrations.
    endpoints: DashMap<(String, u16), TransportId>,
    session_transports: DashMap<SessionId, TransportId>,
    metrics: DashMap<SessionId, TrafficCounters>,
    inbound_tx: mpsc::UnboundedSender<QueuedMessage>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<QueuedMessage>>>,
    outbound_tx: mpsc::UnboundedSender<QueuedMessage>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<QueuedMessage>>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ConnectionEvent>>>,
    sink: Arc<dyn MetricsSink>,
    running: AtomicBool,
    /// Cleared by [`stop_intake`](TransportManager::stop_intake).
    intake_open: AtomicBool,
    shutdown: watch::Sender<bool>,
    pumps: Mutex<Vec<JoinHandle<()>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TransportManager {
    /// Creates a manager with no transports.
    pub fn new(config: ManagerConfig, sink: Arc<dyn MetricsSink>) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            config,
            transports: DashMap::new(),
            endpoints: DashMap::new(),
            session_transports: DashMap::new(),
            metrics: DashMap::new(),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            subscribers: Mutex::new(Vec::new()),
            sink,
            running: AtomicBool::new(false),
            intake_open: AtomicBool::new(true),
            shutdown,
            pumps: Mutex::new(Vec::new()),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Registers a transport and subscribes to its events.
    ///
    /// If the manager is already running the transport is started right
    /// away; otherwise it starts with [`start`](Self::start).
    ///
    /// # Errors
    /// [`TransportError::DuplicateTransport`] if a transport with the same
    /// name and port is already registered.
    pub async fn add_transport(
        self: &Arc<Self>,
        transport: Arc<dyn Transport>,
    ) -> Result<TransportId, TransportError> {
        let info = transport.info().clone();

        match self.endpoints.entry((info.name.clone(), info.port)) {
            Entry::Occupied(_) => {
                return Err(TransportError::DuplicateTransport {
                    name: info.name,
                    port: info.port,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(info.id);
            }
        }

        let (events, rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(Arc::clone(self).pump_events(
            info.id,
            info.network,
            rx,
        ));
        self.pumps.lock().push(pump);
        self.transports.insert(
            info.id,
            Registered {
                transport: Arc::clone(&transport),
                events: events.clone(),
            },
        );

        tracing::info!(
            transport = %info.id,
            name = %info.name,
            port = info.port,
            network = %info.network,
            "transport registered"
        );

        if self.running.load(Ordering::Acquire) {
            transport.start(events).await?;
        }
        Ok(info.id)
    }

    /// Starts the outbound consumer, the metrics timer, and every registered
    /// transport. Calling it twice is a no-op.
    pub async fn start(self: &Arc<Self>) -> Result<(), TransportError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Some(rx) = self.outbound_rx.lock().take() {
            let consumer = tokio::spawn(Arc::clone(self).run_outbound(rx));
            self.workers.lock().push(consumer);
        }
        let ticker = tokio::spawn(Arc::clone(self).run_metrics());
        self.workers.lock().push(ticker);

        let pending: Vec<(Arc<dyn Transport>, EventSender)> = self
            .transports
            .iter()
            .map(|r| (Arc::clone(&r.transport), r.events.clone()))
            .collect();
        for (transport, events) in pending {
            transport.start(events).await?;
        }
        Ok(())
    }

    /// Stops feeding the inbound queue.
    ///
    /// Data a transport reports from now on is dropped, so the dispatcher
    /// can drain what is already queued. Outbound delivery keeps running
    /// until [`shutdown`](Self::shutdown).
    pub fn stop_intake(&self) {
        if self.intake_open.swap(false, Ordering::AcqRel) {
            tracing::info!("inbound intake stopped");
        }
    }

    /// Drains the outbound queue, then stops every transport.
    ///
    /// Work already queued is delivered before transports close their
    /// sessions; in-flight listener invocations are not cancelled.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for worker in workers {
            let _ = worker.await;
        }

        let transports: Vec<Arc<dyn Transport>> = self
            .transports
            .iter()
            .map(|r| Arc::clone(&r.transport))
            .collect();
        for transport in transports {
            if let Err(e) = transport.stop().await {
                tracing::warn!(
                    transport = %transport.info().id, error = %e,
                    "transport stop failed"
                );
            }
        }

        // Pump tasks only end when every event sender is dropped, and the
        // manager keeps one per transport.
        for pump in self.pumps.lock().drain(..) {
            pump.abort();
        }
        self.running.store(false, Ordering::Release);
        tracing::info!("transport manager stopped");
    }

    /// Hands out the inbound queue's receiver. Only the first call gets it:
    /// there is exactly one inbound consumer.
    pub fn take_inbound(
        &self,
    ) -> Option<mpsc::UnboundedReceiver<QueuedMessage>> {
        self.inbound_rx.lock().take()
    }

    /// Subscribes to connect/disconnect notifications.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ConnectionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Queues a message for delivery. Never blocks.
    ///
    /// # Errors
    /// [`TransportError::Shutdown`] once the outbound consumer is gone.
    pub fn enqueue_outbound(
        &self,
        message: QueuedMessage,
    ) -> Result<(), TransportError> {
        self.outbound_tx
            .send(message)
            .map_err(|_| TransportError::Shutdown)
    }

    /// Asks the owning transport to close a session.
    ///
    /// # Errors
    /// [`TransportError::UnknownSession`] if no transport owns the session.
    pub async fn disconnect(
        &self,
        session_id: &SessionId,
    ) -> Result<(), TransportError> {
        let transport = self
            .transport_of(session_id)
            .ok_or_else(|| TransportError::UnknownSession(session_id.clone()))?;
        transport.disconnect(session_id).await
    }

    /// Returns the partition of the transport owning `session_id`.
    pub fn network_of(&self, session_id: &SessionId) -> Option<NetworkKind> {
        self.transport_of(session_id).map(|t| t.info().network)
    }

    /// Returns `true` if some transport currently owns `session_id`.
    pub fn has_session(&self, session_id: &SessionId) -> bool {
        self.session_transports.contains_key(session_id)
    }

    /// Number of live sessions across all transports.
    pub fn session_count(&self) -> usize {
        self.session_transports.len()
    }

    /// Number of registered transports.
    pub fn transport_count(&self) -> usize {
        self.transports.len()
    }

    /// Current counters for one session.
    pub fn traffic(&self, session_id: &SessionId) -> Option<TrafficCounters> {
        self.metrics.get(session_id).map(|c| *c)
    }

    /// Snapshot of every session's counters.
    pub fn metrics_snapshot(&self) -> Vec<SessionTraffic> {
        let mut rows: Vec<SessionTraffic> = self
            .metrics
            .iter()
            .map(|entry| SessionTraffic {
                session_id: entry.key().clone(),
                counters: *entry.value(),
            })
            .collect();
        rows.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        rows
    }

    /// Pushes the current snapshot to the metrics sink.
    pub fn publish_metrics(&self) {
        let snapshot = self.metrics_snapshot();
        self.sink.publish(&snapshot);
    }

    // -- internals --------------------------------------------------------

    fn transport_of(&self, session_id: &SessionId) -> Option<Arc<dyn Transport>> {
        let id = *self.session_transports.get(session_id)?;
        self.transports.get(&id).map(|r| Arc::clone(&r.transport))
    }

    fn notify(&self, event: ConnectionEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Consumes one transport's events. Every branch is non-blocking.
    async fn pump_events(
        self: Arc<Self>,
        transport: TransportId,
        network: NetworkKind,
        mut rx: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        while let Some(event) = rx.recv().await {
            self.handle_event(transport, network, event);
        }
        tracing::debug!(%transport, "transport event stream closed");
    }

    fn handle_event(
        &self,
        transport: TransportId,
        network: NetworkKind,
        event: TransportEvent,
    ) {
        match event {
            TransportEvent::Connected {
                session, endpoint, ..
            } => {
                self.session_transports.insert(session.clone(), transport);
                self.metrics.insert(session.clone(), TrafficCounters::default());
                tracing::info!(%transport, %session, %endpoint, "session connected");
                self.notify(ConnectionEvent::Connected {
                    session_id: session,
                    transport,
                    endpoint,
                    network,
                });
            }
            TransportEvent::Disconnected { session, .. } => {
                self.session_transports.remove(&session);
                self.metrics.remove(&session);
                tracing::info!(%transport, %session, "session disconnected");
                self.notify(ConnectionEvent::Disconnected {
                    session_id: session,
                    transport,
                    network,
                });
            }
            TransportEvent::Received { session, data, .. } => {
                if !self.intake_open.load(Ordering::Acquire) {
                    tracing::debug!(
                        %transport, %session, bytes = data.len(),
                        "intake stopped, dropping inbound data"
                    );
                    return;
                }
                if let Some(mut counters) = self.metrics.get_mut(&session) {
                    counters.record_in(data.len());
                }
                let queued = QueuedMessage {
                    session_id: session,
                    data,
                    network,
                };
                if self.inbound_tx.send(queued).is_err() {
                    tracing::warn!(%transport, "inbound queue closed, dropping message");
                }
            }
        }
    }

    /// The single outbound consumer.
    async fn run_outbound(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<QueuedMessage>,
    ) {
        let mut stop = self.shutdown.subscribe();
        loop {
            tokio::select! {
                biased;
                message = rx.recv() => match message {
                    Some(message) => self.route(message).await,
                    None => break,
                },
                _ = stop.changed() => {
                    while let Ok(message) = rx.try_recv() {
                        self.route(message).await;
                    }
                    break;
                }
            }
        }
        tracing::debug!("outbound consumer stopped");
    }

    async fn route(&self, message: QueuedMessage) {
        let Some(transport) = self.transport_of(&message.session_id) else {
            tracing::warn!(
                session = %message.session_id,
                bytes = message.data.len(),
                "no transport for session, dropping outbound message"
            );
            return;
        };

        match transport.send(&message.session_id, &message.data).await {
            Ok(()) => {
                if let Some(mut counters) = self.metrics.get_mut(&message.session_id) {
                    counters.record_out(message.data.len());
                }
            }
            Err(e) => tracing::warn!(
                session = %message.session_id, error = %e, "send failed"
            ),
        }
    }

    async fn run_metrics(self: Arc<Self>) {
        let mut stop = self.shutdown.subscribe();
        let mut interval = tokio::time::interval(self.config.metrics_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => self.publish_metrics(),
                _ = stop.changed() => break,
            }
        }
    }
}
