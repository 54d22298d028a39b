//! Shared plumbing for stream transports: per-session outgoing queues and
//! the line accumulator that keeps partial lines out of the framer.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Notify};

use crate::{SessionId, TransportError};

/// Default cap on a single line, terminator excluded, in bytes.
pub const DEFAULT_MAX_LINE_LEN: usize = 8 * 1024;

// ---------------------------------------------------------------------------
// LineAccumulator
// ---------------------------------------------------------------------------

/// Buffers raw socket reads and releases only whole lines.
///
/// The protocol framer treats a trailing unterminated fragment as a full
/// line, so stream transports must never hand it half a line. `push` returns
/// everything up to and including the last `\r` or `\n` seen so far and keeps
/// the rest for the next read.
#[derive(Debug)]
pub struct LineAccumulator {
    pending: Vec<u8>,
    max_line_len: usize,
}

impl LineAccumulator {
    /// Creates an accumulator that rejects lines longer than `max_line_len`
    /// bytes, whether complete or still pending.
    pub fn new(max_line_len: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line_len,
        }
    }

    /// Appends `bytes` and returns the completed lines, if any.
    ///
    /// # Errors
    /// Returns [`TransportError::ConnectionClosed`] when a completed line or
    /// the unterminated remainder is longer than the configured maximum.
    /// The caller is expected to drop the connection.
    pub fn push(
        &mut self,
        bytes: &[u8],
    ) -> Result<Option<Vec<u8>>, TransportError> {
        self.pending.extend_from_slice(bytes);

        let complete = match self
            .pending
            .iter()
            .rposition(|b| *b == b'\n' || *b == b'\r')
        {
            Some(last) => {
                let rest = self.pending.split_off(last + 1);
                Some(std::mem::replace(&mut self.pending, rest))
            }
            None => None,
        };

        let overlong = complete.as_deref().is_some_and(|lines| {
            lines
                .split(|b| *b == b'\n' || *b == b'\r')
                .any(|line| line.len() > self.max_line_len)
        });
        if overlong || self.pending.len() > self.max_line_len {
            return Err(TransportError::ConnectionClosed(format!(
                "line exceeds {} bytes",
                self.max_line_len
            )));
        }
        Ok(complete)
    }

    /// Number of buffered bytes that do not yet form a complete line.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

// ---------------------------------------------------------------------------
// SessionTable
// ---------------------------------------------------------------------------

/// Write side of one open session, owned by the transport's table.
struct SessionHandle {
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
    closed: Arc<Notify>,
}

/// Open sessions of one transport, keyed by session id.
#[derive(Default)]
pub(crate) struct SessionTable {
    sessions: DashMap<SessionId, SessionHandle>,
}

impl SessionTable {
    /// Registers a session and returns its outgoing queue and close signal.
    pub(crate) fn register(
        &self,
        session: SessionId,
    ) -> (mpsc::UnboundedReceiver<Vec<u8>>, Arc<Notify>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(Notify::new());
        self.sessions.insert(
            session,
            SessionHandle {
                outgoing: tx,
                closed: Arc::clone(&closed),
            },
        );
        (rx, closed)
    }

    /// Forgets a session. Dropping the handle ends its writer task once the
    /// queued data has been written.
    pub(crate) fn remove(&self, session: &SessionId) {
        self.sessions.remove(session);
    }

    pub(crate) fn send(
        &self,
        session: &SessionId,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let handle = self
            .sessions
            .get(session)
            .ok_or_else(|| TransportError::UnknownSession(session.clone()))?;
        handle.outgoing.send(data.to_vec()).map_err(|_| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "writer task gone",
            ))
        })
    }

    pub(crate) fn close(&self, session: &SessionId) -> Result<(), TransportError> {
        let handle = self
            .sessions
            .get(session)
            .ok_or_else(|| TransportError::UnknownSession(session.clone()))?;
        handle.closed.notify_one();
        Ok(())
    }

    pub(crate) fn close_all(&self) {
        for entry in self.sessions.iter() {
            entry.closed.notify_one();
        }
    }

    pub(crate) fn contains(&self, session: &SessionId) -> bool {
        self.sessions.contains_key(session)
    }
}

// ---------------------------------------------------------------------------
// Generic byte-stream session loop
// ---------------------------------------------------------------------------

#[cfg(feature = "tcp")]
pub(crate) use serve::{serve_stream, Accepted};

#[cfg(feature = "tcp")]
mod serve {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

    use super::{LineAccumulator, SessionTable};
    use crate::{EventSender, SessionId, TransportEvent, TransportId};

    /// Everything a session task needs besides the stream itself.
    pub(crate) struct Accepted {
        pub(crate) transport: TransportId,
        pub(crate) session: SessionId,
        pub(crate) endpoint: SocketAddr,
        pub(crate) events: EventSender,
        pub(crate) table: Arc<SessionTable>,
        pub(crate) max_line_len: usize,
    }

    /// Runs one session until the peer closes, an I/O error occurs, the line
    /// limit is exceeded, or a disconnect is requested.
    pub(crate) async fn serve_stream<S>(stream: S, conn: Accepted)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let Accepted {
            transport,
            session,
            endpoint,
            events,
            table,
            max_line_len,
        } = conn;

        let (mut reader, mut writer) = tokio::io::split(stream);
        let (mut outgoing, closed) = table.register(session.clone());
        let _ = events.send(TransportEvent::Connected {
            transport,
            session: session.clone(),
            endpoint,
        });

        let writer_session = session.clone();
        let write_task = tokio::spawn(async move {
            while let Some(data) = outgoing.recv().await {
                let written = async {
                    writer.write_all(&data).await?;
                    writer.flush().await
                }
                .await;
                if let Err(e) = written {
                    tracing::debug!(
                        session = %writer_session, error = %e, "write failed"
                    );
                    break;
                }
            }
            let _ = writer.shutdown().await;
        });

        let mut lines = LineAccumulator::new(max_line_len);
        let mut buf = vec![0u8; 4096];
        loop {
            let n = tokio::select! {
                _ = closed.notified() => {
                    tracing::debug!(%session, "disconnect requested");
                    break;
                }
                read = reader.read(&mut buf) => match read {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) => {
                        tracing::debug!(%session, error = %e, "read failed");
                        break;
                    }
                },
            };

            match lines.push(&buf[..n]) {
                Ok(Some(data)) => {
                    let _ = events.send(TransportEvent::Received {
                        transport,
                        session: session.clone(),
                        data,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(%session, error = %e, "dropping session");
                    break;
                }
            }
        }

        if lines.pending_len() > 0 {
            tracing::debug!(
                %session,
                bytes = lines.pending_len(),
                "discarding unterminated line"
            );
        }

        table.remove(&session);
        let _ = write_task.await;
        let _ = events.send(TransportEvent::Disconnected { transport, session });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_without_terminator_holds_bytes() {
        let mut acc = LineAccumulator::new(64);
        assert_eq!(acc.push(b"NICK bo").unwrap(), None);
        assert_eq!(acc.pending_len(), 7);
    }

    #[test]
    fn test_push_releases_up_to_last_terminator() {
        let mut acc = LineAccumulator::new(64);
        acc.push(b"NICK bo").unwrap();
        let out = acc.push(b"b\r\nUSER b").unwrap();
        assert_eq!(out.as_deref(), Some(&b"NICK bob\r\n"[..]));
        assert_eq!(acc.pending_len(), 6);
    }

    #[test]
    fn test_push_bare_carriage_return_counts_as_terminator() {
        let mut acc = LineAccumulator::new(64);
        let out = acc.push(b"PING x\rPONG").unwrap();
        assert_eq!(out.as_deref(), Some(&b"PING x\r"[..]));
    }

    #[test]
    fn test_push_overlong_pending_line_returns_error() {
        let mut acc = LineAccumulator::new(4);
        let result = acc.push(b"abcdefgh");
        assert!(matches!(result, Err(TransportError::ConnectionClosed(_))));
    }

    #[test]
    fn test_push_overlong_terminated_line_returns_error() {
        let mut acc = LineAccumulator::new(8);
        let result = acc.push(b"PRIVMSG #a :far too long\r\n");
        assert!(matches!(result, Err(TransportError::ConnectionClosed(_))));
    }

    #[test]
    fn test_push_overlong_line_completed_across_reads_returns_error() {
        let mut acc = LineAccumulator::new(8);
        acc.push(b"PING 12").unwrap();
        let result = acc.push(b"3456\r\nOK");
        assert!(matches!(result, Err(TransportError::ConnectionClosed(_))));
    }

    #[test]
    fn test_push_line_at_exact_limit_is_released() {
        let mut acc = LineAccumulator::new(8);
        let out = acc.push(b"PING 123\r\nPING 4\r\n").unwrap();
        assert_eq!(out.as_deref(), Some(&b"PING 123\r\nPING 4\r\n"[..]));
    }

    #[test]
    fn test_session_table_send_unknown_session_returns_error() {
        let table = SessionTable::default();
        let result = table.send(&SessionId::new("nope"), b"x");
        assert!(matches!(result, Err(TransportError::UnknownSession(_))));
    }

    #[tokio::test]
    async fn test_session_table_send_reaches_registered_queue() {
        let table = SessionTable::default();
        let id = SessionId::new("s1");
        let (mut rx, _closed) = table.register(id.clone());

        table.send(&id, b"hello").unwrap();

        assert!(table.contains(&id));
        assert_eq!(rx.recv().await.unwrap(), b"hello");
        table.remove(&id);
        assert!(!table.contains(&id));
    }
}
