//! A free list of reusable [`Session`] values.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use ircforge_transport::SessionId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::Session;

/// Configuration for the session pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of idle sessions kept for reuse. Released sessions
    /// beyond this are dropped.
    ///
    /// Default: 256.
    pub capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

/// Hands out reset sessions and takes them back.
///
/// Both [`acquire`](Self::acquire) and [`release`](Self::release) call
/// [`Session::initialize`], so a recycled session never carries anything
/// from its previous connection.
pub struct SessionPool {
    config: PoolConfig,
    idle: Mutex<Vec<Session>>,
    allocated: AtomicUsize,
}

impl SessionPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(config.capacity)),
            config,
            allocated: AtomicUsize::new(0),
        }
    }

    /// Takes an idle session (or allocates one) bound to `id`.
    pub fn acquire(&self, id: SessionId, endpoint: Option<SocketAddr>) -> Session {
        let recycled = self.idle.lock().pop();
        let mut session = recycled.unwrap_or_else(|| {
            self.allocated.fetch_add(1, Ordering::Relaxed);
            Session::default()
        });
        session.initialize();
        session.attach(id, endpoint);
        session
    }

    /// Resets `session` and keeps it for reuse if there is room.
    pub fn release(&self, mut session: Session) {
        session.initialize();
        let mut idle = self.idle.lock();
        if idle.len() < self.config.capacity {
            idle.push(session);
        }
    }

    /// Number of idle sessions ready for reuse.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    /// Total sessions ever allocated by this pool.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }
}

impl Default for SessionPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}
