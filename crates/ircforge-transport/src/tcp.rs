//! Line-oriented TCP transport, optionally wrapped in TLS.
//!
//! Certificate provisioning is not this crate's job: a secure transport is
//! built from a ready `tokio_rustls::TlsAcceptor` handed in by the caller.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use crate::stream::{serve_stream, Accepted, SessionTable};
use crate::{
    EventSender, NetworkKind, SessionId, Transport, TransportError,
    TransportInfo, DEFAULT_MAX_LINE_LEN,
};

/// A TCP [`Transport`] that speaks raw protocol lines.
pub struct TcpTransport {
    info: TransportInfo,
    bind_addr: SocketAddr,
    #[cfg(feature = "tls")]
    tls: Option<tokio_rustls::TlsAcceptor>,
    max_line_len: usize,
    sessions: Arc<SessionTable>,
    local_addr: Mutex<Option<SocketAddr>>,
    stop: Arc<Notify>,
}

impl TcpTransport {
    /// Creates a plain transport that will listen on `bind_addr` once
    /// started.
    pub fn new(
        name: impl Into<String>,
        bind_addr: SocketAddr,
        network: NetworkKind,
    ) -> Self {
        Self {
            info: TransportInfo::new(name, bind_addr.port(), network, false),
            bind_addr,
            #[cfg(feature = "tls")]
            tls: None,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            sessions: Arc::new(SessionTable::default()),
            local_addr: Mutex::new(None),
            stop: Arc::new(Notify::new()),
        }
    }

    /// Creates a transport that performs a TLS handshake with `acceptor`
    /// before any protocol bytes flow.
    #[cfg(feature = "tls")]
    pub fn secure(
        name: impl Into<String>,
        bind_addr: SocketAddr,
        network: NetworkKind,
        acceptor: tokio_rustls::TlsAcceptor,
    ) -> Self {
        let mut transport = Self::new(name, bind_addr, network);
        transport.info.secure = true;
        transport.tls = Some(acceptor);
        transport
    }

    /// Overrides the maximum length of a single line.
    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    /// Returns the bound address once the transport has been started.
    ///
    /// Useful when binding to port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn info(&self) -> &TransportInfo {
        &self.info
    }

    async fn start(&self, events: EventSender) -> Result<(), TransportError> {
        let listener = TcpListener::bind(self.bind_addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        let local = listener.local_addr().map_err(TransportError::AcceptFailed)?;
        *self.local_addr.lock() = Some(local);
        tracing::info!(
            transport = %self.info.id,
            name = %self.info.name,
            addr = %local,
            secure = self.info.secure,
            "TCP transport listening"
        );

        let transport = self.info.id;
        let sessions = Arc::clone(&self.sessions);
        let stop = Arc::clone(&self.stop);
        let max_line_len = self.max_line_len;
        #[cfg(feature = "tls")]
        let tls = self.tls.clone();

        tokio::spawn(async move {
            loop {
                let (stream, endpoint) = tokio::select! {
                    _ = stop.notified() => break,
                    accepted = listener.accept() => match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::error!(%transport, error = %e, "accept failed");
                            continue;
                        }
                    },
                };

                let conn = Accepted {
                    transport,
                    session: SessionId::generate(),
                    endpoint,
                    events: events.clone(),
                    table: Arc::clone(&sessions),
                    max_line_len,
                };
                tracing::debug!(
                    %transport, session = %conn.session, %endpoint,
                    "accepted TCP connection"
                );

                #[cfg(feature = "tls")]
                if let Some(acceptor) = tls.clone() {
                    tokio::spawn(async move {
                        match acceptor.accept(stream).await {
                            Ok(tls_stream) => serve_stream(tls_stream, conn).await,
                            Err(e) => tracing::debug!(
                                %endpoint, error = %e, "TLS handshake failed"
                            ),
                        }
                    });
                    continue;
                }

                tokio::spawn(serve_stream(stream, conn));
            }
            tracing::info!(%transport, "TCP transport stopped");
        });

        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.stop.notify_one();
        self.sessions.close_all();
        Ok(())
    }

    async fn send(
        &self,
        session: &SessionId,
        data: &[u8],
    ) -> Result<(), TransportError> {
        self.sessions.send(session, data)
    }

    async fn disconnect(
        &self,
        session: &SessionId,
    ) -> Result<(), TransportError> {
        self.sessions.close(session)
    }

    fn has_session(&self, session: &SessionId) -> bool {
        self.sessions.contains(session)
    }
}
