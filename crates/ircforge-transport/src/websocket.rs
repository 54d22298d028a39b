//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! Each inbound text or binary frame is delivered as one batch of lines; a
//! frame without a terminator is a single line. Outbound data is split on
//! line terminators and sent as one text frame per line.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::Message;

use crate::stream::SessionTable;
use crate::{
    EventSender, NetworkKind, SessionId, Transport, TransportError,
    TransportEvent, TransportId, TransportInfo, DEFAULT_MAX_LINE_LEN,
};

/// A WebSocket-based [`Transport`].
pub struct WebSocketTransport {
    info: TransportInfo,
    bind_addr: SocketAddr,
    max_line_len: usize,
    sessions: Arc<SessionTable>,
    local_addr: Mutex<Option<SocketAddr>>,
    stop: Arc<Notify>,
}

impl WebSocketTransport {
    /// Creates a transport that will listen on `bind_addr` once started.
    pub fn new(
        name: impl Into<String>,
        bind_addr: SocketAddr,
        network: NetworkKind,
    ) -> Self {
        Self {
            info: TransportInfo::new(name, bind_addr.port(), network, false),
            bind_addr,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            sessions: Arc::new(SessionTable::default()),
            local_addr: Mutex::new(None),
            stop: Arc::new(Notify::new()),
        }
    }

    /// Returns the bound address once the transport has been started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
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
            addr = %local,
            "WebSocket transport listening"
        );

        let transport = self.info.id;
        let sessions = Arc::clone(&self.sessions);
        let stop = Arc::clone(&self.stop);
        let max_line_len = self.max_line_len;

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
                tokio::spawn(serve_websocket(
                    stream,
                    endpoint,
                    transport,
                    events.clone(),
                    Arc::clone(&sessions),
                    max_line_len,
                ));
            }
            tracing::info!(%transport, "WebSocket transport stopped");
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

async fn serve_websocket(
    stream: TcpStream,
    endpoint: SocketAddr,
    transport: TransportId,
    events: EventSender,
    table: Arc<SessionTable>,
    max_line_len: usize,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::debug!(%endpoint, error = %e, "WebSocket handshake failed");
            return;
        }
    };

    let session = SessionId::generate();
    tracing::debug!(%transport, %session, %endpoint, "accepted WebSocket connection");

    let (mut sink, mut source) = ws.split();
    let (mut outgoing, closed) = table.register(session.clone());
    let _ = events.send(TransportEvent::Connected {
        transport,
        session: session.clone(),
        endpoint,
    });

    let write_task = tokio::spawn(async move {
        'outer: while let Some(data) = outgoing.recv().await {
            let text = String::from_utf8_lossy(&data);
            for line in text.split(['\r', '\n']).filter(|l| !l.is_empty()) {
                if sink.send(Message::text(line.to_owned())).await.is_err() {
                    break 'outer;
                }
            }
        }
        let _ = sink.close().await;
    });

    loop {
        let frame = tokio::select! {
            _ = closed.notified() => break,
            frame = source.next() => frame,
        };
        let data = match frame {
            Some(Ok(Message::Text(text))) => text.as_bytes().to_vec(),
            Some(Ok(Message::Binary(bytes))) => bytes.to_vec(),
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue, // ping/pong/raw frame
            Some(Err(e)) => {
                tracing::debug!(%session, error = %e, "WebSocket receive failed");
                break;
            }
        };
        if data.len() > max_line_len {
            tracing::warn!(%session, len = data.len(), "frame too long, dropping session");
            break;
        }
        let _ = events.send(TransportEvent::Received {
            transport,
            session: session.clone(),
            data,
        });
    }

    table.remove(&session);
    let _ = write_task.await;
    let _ = events.send(TransportEvent::Disconnected { transport, session });
}
