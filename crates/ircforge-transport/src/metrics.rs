//! Per-session traffic counters and the sink they are published to.

use serde::Serialize;

use crate::SessionId;

/// Bytes and packets seen on one session, in both directions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrafficCounters {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub packets_in: u64,
    pub packets_out: u64,
}

impl TrafficCounters {
    pub(crate) fn record_in(&mut self, len: usize) {
        self.bytes_in += len as u64;
        self.packets_in += 1;
    }

    pub(crate) fn record_out(&mut self, len: usize) {
        self.bytes_out += len as u64;
        self.packets_out += 1;
    }
}

/// One row of a metrics snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionTraffic {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub counters: TrafficCounters,
}

/// Receives the periodic traffic snapshot from the
/// [`TransportManager`](crate::TransportManager).
///
/// Publishing happens on the manager's timer task, never on the send path,
/// so implementations may do moderately expensive work.
pub trait MetricsSink: Send + Sync + 'static {
    /// Called once per metrics interval with every live session's counters.
    fn publish(&self, snapshot: &[SessionTraffic]);
}

/// Default sink: logs the snapshot as JSON at `info` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn publish(&self, snapshot: &[SessionTraffic]) {
        match serde_json::to_string(snapshot) {
            Ok(json) => tracing::info!(
                target: "ircforge::metrics",
                sessions = snapshot.len(),
                snapshot = %json,
                "session traffic"
            ),
            Err(e) => tracing::debug!(error = %e, "failed to encode metrics"),
        }
    }
}
