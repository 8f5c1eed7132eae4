use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures_channel::oneshot;

use crate::connection::{kill_query, Connection};
use crate::error::{Error, Result};
use crate::options::ConnectOptions;
use crate::pool::{HealthReport, PoolStats};

/// A live connection plus the pool bookkeeping that must survive checkouts.
pub(crate) struct Live {
    pub(crate) conn: Connection,
    pub(crate) created: Instant,
}

struct Idle {
    live: Live,
    since: Instant,
}

type Waiter = oneshot::Sender<Result<Handoff>>;

/// A connection in flight to a waiter. If the waiter disappears between the
/// hand-off and actually receiving it, the drop glue routes the connection
/// back through the normal release path instead of leaking it.
pub(crate) struct Handoff {
    live: Option<Live>,
    pool: Arc<PoolInner>,
}

impl Handoff {
    fn new(live: Live, pool: Arc<PoolInner>) -> Self {
        Self {
            live: Some(live),
            pool,
        }
    }

    fn take(&mut self) -> Option<Live> {
        self.live.take()
    }
}

impl Drop for Handoff {
    fn drop(&mut self) {
        if let Some(live) = self.live.take() {
            self.pool.release(live);
        }
    }
}

struct PoolState {
    idle: VecDeque<Idle>,
    waiters: VecDeque<Waiter>,

    /// Live connections in any state: idle, checked out, draining, or
    /// currently being established. Never exceeds `max_connections`.
    size: u32,

    /// Waiters that have not settled yet. Decremented by the guard each
    /// waiter holds, never derived from the queue (which may still hold
    /// senders whose receivers are long gone).
    num_waiters: usize,

    /// Connections absorbing a cancelled query before reuse.
    draining: usize,
}

pub(crate) struct PoolInner {
    pub(crate) options: ConnectOptions,
    state: Mutex<PoolState>,
    is_closed: AtomicBool,
    acquire_timeouts: AtomicU64,
}

impl PoolInner {
    pub(crate) fn new(options: ConnectOptions) -> Arc<Self> {
        Arc::new(Self {
            options,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                waiters: VecDeque::new(),
                size: 0,
                num_waiters: 0,
                draining: 0,
            }),
            is_closed: AtomicBool::new(false),
            acquire_timeouts: AtomicU64::new(0),
        })
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.is_closed.load(Ordering::Acquire)
    }

    pub(crate) fn stats(&self) -> PoolStats {
        let state = self.state.lock().unwrap();

        let idle = state.idle.len();
        let draining = state.draining;

        PoolStats {
            size: state.size,
            idle,
            draining,
            active: state
                .size
                .saturating_sub(idle as u32)
                .saturating_sub(draining as u32),
            waiting: state.num_waiters,
            max_size: self.options.max_connections,
            acquire_timeouts: self.acquire_timeouts.load(Ordering::Relaxed),
            reset_connection: self.options.reset_connection,
            server_side_cancellation: self.options.server_side_cancellation,
        }
    }

    pub(crate) async fn acquire(self: &Arc<Self>) -> Result<Live> {
        if self.is_closed() {
            return Err(Error::PoolClosed);
        }

        // 1) pull from the idle queue, validating each candidate on the way
        // out and closing the ones that fail
        loop {
            let candidate = self.state.lock().unwrap().idle.pop_front();

            match candidate {
                Some(idle) => {
                    if self.is_expired(&idle) || !idle.live.conn.is_clean() {
                        let _ = idle.live.conn.close().await;
                        self.decrement_size();
                        continue;
                    }

                    return Ok(idle.live);
                }

                None => break,
            }
        }

        // 2) below capacity: open a fresh connection for ourselves
        let reserved = {
            let mut state = self.state.lock().unwrap();

            if state.size < self.options.max_connections {
                state.size += 1;
                true
            } else {
                false
            }
        };

        if reserved {
            return match Connection::connect_with(&self.options).await {
                Ok(conn) => Ok(Live {
                    conn,
                    created: Instant::now(),
                }),

                Err(err) => {
                    self.decrement_size();
                    Err(err)
                }
            };
        }

        // 3) at capacity: join the waiter queue, unless it is capped and full
        let rx = {
            let mut state = self.state.lock().unwrap();

            if self.is_closed() {
                return Err(Error::PoolClosed);
            }

            if self.options.max_waiters > 0 && state.num_waiters >= self.options.max_waiters {
                return Err(Error::PoolExhausted);
            }

            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            state.num_waiters += 1;

            rx
        };

        // settles the `num_waiters` count no matter how we leave this
        // function: success, timeout, or the whole future being dropped
        let _guard = WaiterGuard(Arc::clone(self));

        let outcome = if self.options.acquire_timeout.is_zero() {
            rx.await
        } else {
            match tokio::time::timeout(self.options.acquire_timeout, rx).await {
                Ok(outcome) => outcome,

                Err(_) => {
                    self.acquire_timeouts.fetch_add(1, Ordering::Relaxed);
                    return Err(Error::PoolTimedOut);
                }
            }
        };

        match outcome {
            Ok(Ok(mut handoff)) => Ok(handoff
                .take()
                .expect("(bug) empty hand-off delivered to a waiter")),
            Ok(Err(err)) => Err(err),

            // the pool dropped our sender without an answer
            Err(_cancelled) => Err(Error::PoolClosed),
        }
    }

    /// Entry point from [`PoolConnection::drop`][super::PoolConnection]:
    /// the actual release work is async and runs on the runtime.
    pub(crate) fn release(self: &Arc<Self>, live: Live) {
        let pool = Arc::clone(self);

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                pool.release_inner(live).await;
            });
        }
        // without a runtime the socket is simply dropped; the server will
        // notice on its own
    }

    async fn release_inner(self: Arc<Self>, mut live: Live) {
        if self.is_closed() {
            self.close_quietly(live).await;
            return;
        }

        // a connection that comes back mid-command was cancelled: interrupt
        // the server if configured, then absorb the leftovers before the
        // connection may be reused
        if live.conn.was_cancelled() {
            self.state.lock().unwrap().draining += 1;

            if self.options.server_side_cancellation {
                if let Err(err) = kill_query(&self.options, live.conn.thread_id()).await {
                    log::warn!(
                        "failed to dispatch KILL QUERY for thread {}: {}",
                        live.conn.thread_id(),
                        err
                    );
                }
            }

            let drained = live.conn.drain_cancelled().await;

            self.state.lock().unwrap().draining -= 1;

            if self.is_closed() {
                self.close_quietly(live).await;
                return;
            }

            match drained {
                Ok(()) if live.conn.is_clean() => self.release_clean(live).await,
                _ => self.remove(live).await,
            }

            return;
        }

        if !live.conn.is_clean() {
            self.remove(live).await;
            return;
        }

        if self.options.reset_connection {
            if let Err(err) = live.conn.reset().await {
                log::debug!("connection reset failed on release: {}", err);
                self.remove(live).await;
                return;
            }
        }

        self.release_clean(live).await;
    }

    /// Hand a healthy connection to the first waiter that is still there,
    /// or park it in the idle queue.
    async fn release_clean(self: &Arc<Self>, live: Live) {
        let mut live = Some(live);

        loop {
            let waiter = self.state.lock().unwrap().waiters.pop_front();

            match waiter {
                Some(tx) => {
                    let handoff = Handoff::new(
                        live.take().expect("connection handed off twice"),
                        Arc::clone(self),
                    );

                    match tx.send(Ok(handoff)) {
                        Ok(()) => return,

                        // that waiter gave up; take the connection back and
                        // try the next one
                        Err(sent) => {
                            live = sent.ok().and_then(|mut handoff| handoff.take());

                            if live.is_none() {
                                return;
                            }
                        }
                    }
                }

                None => break,
            }
        }

        let live = live.expect("connection lost in release");

        // one more lifetime check before the connection goes back on the
        // shelf
        if self.lifetime_expired(&live) {
            self.remove(live).await;
            return;
        }

        let mut state = self.state.lock().unwrap();

        if self.is_closed() {
            drop(state);
            self.close_quietly(live).await;
            return;
        }

        state.idle.push_back(Idle {
            live,
            since: Instant::now(),
        });
    }

    /// Close a connection that is leaving the pool and, since that freed
    /// capacity, open a fresh connection for the next waiter if any.
    async fn remove(self: &Arc<Self>, live: Live) {
        let _ = live.conn.close().await;
        self.decrement_size();
        self.spawn_for_waiter();
    }

    /// Close without waiter bookkeeping; used during/after pool close.
    async fn close_quietly(&self, live: Live) {
        let _ = live.conn.close().await;
        self.decrement_size();
    }

    fn spawn_for_waiter(self: &Arc<Self>) {
        if self.is_closed() {
            return;
        }

        let reserved = {
            let mut state = self.state.lock().unwrap();

            if state.waiters.is_empty() || state.size >= self.options.max_connections {
                false
            } else {
                state.size += 1;
                true
            }
        };

        if !reserved {
            return;
        }

        let pool = Arc::clone(self);

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                match Connection::connect_with(&pool.options).await {
                    Ok(conn) => {
                        let live = Live {
                            conn,
                            created: Instant::now(),
                        };

                        if pool.is_closed() {
                            pool.close_quietly(live).await;
                            return;
                        }

                        // hands the connection to the waiter, or idles it if
                        // the waiter has since disappeared
                        pool.release_clean(live).await;
                    }

                    Err(err) => {
                        pool.decrement_size();

                        // fail the waiter fast rather than leaving it to
                        // ride out its timeout
                        let waiter = pool.state.lock().unwrap().waiters.pop_front();
                        if let Some(tx) = waiter {
                            let _ = tx.send(Err(err));
                        }
                    }
                }
            });
        } else {
            self.decrement_size();
        }
    }

    /// Ping every idle connection, closing the ones that fail.
    pub(crate) async fn health_check(self: &Arc<Self>) -> HealthReport {
        let mut idles = std::mem::take(&mut self.state.lock().unwrap().idle);

        let total_checked = idles.len();
        let mut healthy = 0;
        let mut unhealthy = 0;

        while let Some(mut idle) = idles.pop_front() {
            match idle.live.conn.ping().await {
                Ok(()) => {
                    healthy += 1;
                    self.state.lock().unwrap().idle.push_back(idle);
                }

                Err(err) => {
                    log::info!("closing unhealthy idle connection: {}", err);
                    unhealthy += 1;
                    self.remove(idle.live).await;
                }
            }
        }

        HealthReport {
            total_checked,
            healthy,
            unhealthy,
        }
    }

    /// Close the pool: fail all waiters, close all idle connections, and
    /// make sure checked-out and draining connections close on release.
    pub(crate) async fn close(&self) {
        self.is_closed.store(true, Ordering::Release);

        let (waiters, idles) = {
            let mut state = self.state.lock().unwrap();

            (
                std::mem::take(&mut state.waiters),
                std::mem::take(&mut state.idle),
            )
        };

        for tx in waiters {
            let _ = tx.send(Err(Error::PoolClosed));
        }

        for idle in idles {
            self.close_quietly(idle.live).await;
        }
    }

    fn decrement_size(&self) {
        let mut state = self.state.lock().unwrap();
        state.size = state.size.saturating_sub(1);
    }

    fn is_expired(&self, idle: &Idle) -> bool {
        let options = &self.options;

        (!options.idle_timeout.is_zero() && idle.since.elapsed() >= options.idle_timeout)
            || self.lifetime_expired(&idle.live)
    }

    fn lifetime_expired(&self, live: &Live) -> bool {
        !self.options.max_lifetime.is_zero() && live.created.elapsed() >= self.options.max_lifetime
    }
}

/// Decrements the pending-waiter count when the waiting acquire settles,
/// no matter how it settles.
struct WaiterGuard(Arc<PoolInner>);

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        let mut state = self.0.state.lock().unwrap();
        state.num_waiters = state.num_waiters.saturating_sub(1);
    }
}
