use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::connection::Connection;
use crate::error::Result;
use crate::options::ConnectOptions;

mod inner;

use inner::{Live, PoolInner};

/// A pool of MySQL connections.
///
/// Cloning is cheap and refers to the same underlying pool. Connections are
/// opened lazily: the pool starts empty and grows on demand up to
/// `max_connections`.
pub struct Pool(Arc<PoolInner>);

impl Pool {
    pub fn new(options: ConnectOptions) -> Self {
        Pool(PoolInner::new(options))
    }

    /// Check a connection out of the pool.
    ///
    /// Idle connections are validated (age, idle time, readiness) before
    /// being handed out; failing candidates are closed and replaced. When
    /// the pool is at capacity the call joins a FIFO waiter queue, bounded
    /// by `max_waiters` and `acquire_timeout` when configured.
    pub async fn acquire(&self) -> Result<PoolConnection> {
        let live = self.0.acquire().await?;

        Ok(PoolConnection {
            live: Some(live),
            pool: Arc::clone(&self.0),
        })
    }

    /// Close the pool: every idle connection is closed now, checked-out and
    /// draining connections are closed as they come back, and all waiters
    /// are rejected. Idempotent.
    pub async fn close(&self) {
        self.0.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }

    /// Ping every idle connection, discarding the ones that fail.
    pub async fn health_check(&self) -> HealthReport {
        self.0.health_check().await
    }

    pub fn stats(&self) -> PoolStats {
        self.0.stats()
    }
}

impl Clone for Pool {
    fn clone(&self) -> Self {
        Pool(Arc::clone(&self.0))
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();

        f.debug_struct("Pool")
            .field("size", &stats.size)
            .field("idle", &stats.idle)
            .field("waiting", &stats.waiting)
            .field("is_closed", &self.is_closed())
            .finish()
    }
}

/// A connection checked out of a [`Pool`]; returned on drop.
///
/// Dropping the handle while a command is still in flight counts as
/// cancelling that command: the pool will interrupt it server-side (when
/// `server_side_cancellation` is on) and drain the connection before it is
/// reused.
pub struct PoolConnection {
    live: Option<Live>,
    pool: Arc<PoolInner>,
}

const DEREF_ERR: &str = "(bug) connection already released to the pool";

impl Deref for PoolConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.live.as_ref().expect(DEREF_ERR).conn
    }
}

impl DerefMut for PoolConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.live.as_mut().expect(DEREF_ERR).conn
    }
}

impl Drop for PoolConnection {
    fn drop(&mut self) {
        if let Some(live) = self.live.take() {
            self.pool.release(live);
        }
    }
}

impl fmt::Debug for PoolConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConnection")
            .field("thread_id", &self.live.as_ref().map(|l| l.conn.thread_id()))
            .finish()
    }
}

/// A point-in-time snapshot of pool counters.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    /// Connections checked out right now.
    pub active: u32,

    /// Connections parked in the idle queue.
    pub idle: usize,

    /// Acquires currently waiting for a connection.
    pub waiting: usize,

    /// Connections absorbing a cancelled query.
    pub draining: usize,

    /// All live connections regardless of state.
    pub size: u32,

    pub max_size: u32,

    /// Total acquires that gave up after `acquire_timeout`.
    pub acquire_timeouts: u64,

    pub reset_connection: bool,
    pub server_side_cancellation: bool,
}

/// The outcome of [`Pool::health_check`].
#[derive(Debug, Clone, Copy)]
pub struct HealthReport {
    pub total_checked: usize,
    pub healthy: usize,
    pub unhealthy: usize,
}
