use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_core::future::BoxFuture;

use crate::error::{Error, Result};
use crate::options::ConnectOptions;
use crate::pool::{HealthReport, Pool, PoolConnection, PoolStats};
use crate::result::{QueryResult, StreamStats};
use crate::row::Row;
use crate::statement::Statement;
use crate::transaction::{IsolationLevel, Transaction};
use crate::value::Value;

/// The high-level entry point: a connection pool with a query API on top.
///
/// Cloning is cheap and shares the pool. All methods are `&self`; the
/// client is freely shared across tasks.
#[derive(Clone)]
pub struct Client {
    pool: Pool,
    cache_stats: Arc<CacheStats>,
}

#[derive(Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Pool and statement-cache counters, see [`Client::stats`].
#[derive(Debug, Clone, Copy)]
pub struct ClientStats {
    pub pool: PoolStats,
    pub statement_cache_hits: u64,
    pub statement_cache_misses: u64,
}

impl Client {
    /// Build a client from a `mysql://` URI and verify it by establishing
    /// one connection (which then idles in the pool).
    pub async fn connect(url: &str) -> Result<Self> {
        let options: ConnectOptions = url.parse()?;

        Self::connect_with(options).await
    }

    pub async fn connect_with(options: ConnectOptions) -> Result<Self> {
        let client = Self::with_options(options);

        // fail fast on unreachable hosts and bad credentials
        let conn = client.pool.acquire().await?;
        drop(conn);

        Ok(client)
    }

    /// Build a client without touching the network; connections are opened
    /// on first use.
    pub fn with_options(options: ConnectOptions) -> Self {
        Self {
            pool: Pool::new(options),
            cache_stats: Arc::new(CacheStats::default()),
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Run `sql`. Without parameters this uses the text protocol; with
    /// parameters it goes through a prepared statement, reusing the
    /// per-connection statement cache.
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let mut conn = self.pool.acquire().await?;

        if params.is_empty() {
            conn.run_query(sql, None).await
        } else {
            self.count_cache_lookup(&mut conn, sql);

            conn.run_query(sql, Some(params)).await
        }
    }

    /// Run `sql` and return the affected-row count.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        Ok(self.query(sql, params).await?.affected_rows())
    }

    /// Run `sql` and return `LAST_INSERT_ID()`.
    pub async fn execute_get_id(&self, sql: &str, params: &[Value]) -> Result<u64> {
        Ok(self.query(sql, params).await?.last_insert_id())
    }

    /// Run `sql` and return the first row, if any.
    pub async fn fetch_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, params).await?.into_rows().into_iter().next())
    }

    /// Run `sql` and return the first column of the first row.
    /// `None` means no rows; a SQL `NULL` comes back as [`Value::Null`].
    pub async fn fetch_value(&self, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        self.fetch_value_at(sql, 0, params).await
    }

    /// Like [`fetch_value`][Self::fetch_value] for an arbitrary column.
    pub async fn fetch_value_at(
        &self,
        sql: &str,
        column: usize,
        params: &[Value],
    ) -> Result<Option<Value>> {
        match self.fetch_one(sql, params).await? {
            Some(row) => Ok(Some(row.try_get_index(column)?.clone())),
            None => Ok(None),
        }
    }

    /// Run `sql`, delivering each row to `on_row` as it arrives instead of
    /// materializing the result set. Resolves with the stream statistics
    /// once the server sends the terminal packet.
    ///
    /// Dropping the returned future cancels the stream; the pool then
    /// interrupts the query server-side (if enabled) and drains the
    /// connection.
    pub async fn stream<F>(&self, sql: &str, params: &[Value], on_row: F) -> Result<StreamStats>
    where
        F: FnMut(Row) -> Result<()> + Send,
    {
        let mut conn = self.pool.acquire().await?;

        if params.is_empty() {
            conn.stream_query(sql, None, on_row).await
        } else {
            self.count_cache_lookup(&mut conn, sql);

            conn.stream_query(sql, Some(params), on_row).await
        }
    }

    /// Prepare `sql` on a pooled connection and keep that connection pinned
    /// until the statement is closed or dropped.
    pub async fn prepare(&self, sql: &str) -> Result<ManagedStatement> {
        let mut conn = self.pool.acquire().await?;

        let (statement, cached) = if conn.cache_statement.is_enabled() {
            self.count_cache_lookup(&mut conn, sql);

            (conn.get_or_prepare(sql).await?, true)
        } else {
            (conn.prepare_statement(sql).await?, false)
        };

        Ok(ManagedStatement {
            conn: Some(conn),
            statement,
            sql: sql.to_owned(),
            cached,
        })
    }

    /// Start a transaction, optionally at a given isolation level. The
    /// returned handle pins its connection until `commit`/`rollback`.
    pub async fn begin_transaction(
        &self,
        isolation: Option<IsolationLevel>,
    ) -> Result<Transaction> {
        let mut conn = self.pool.acquire().await?;

        if let Some(level) = isolation {
            conn.run_query(
                &format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql()),
                None,
            )
            .await?;
        }

        conn.run_query("START TRANSACTION", None).await?;

        Ok(Transaction::new(conn))
    }

    /// Run `f` inside a transaction, committing on success and rolling back
    /// on error.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'t> Fn(&'t mut Transaction) -> BoxFuture<'t, Result<T>>,
    {
        self.transaction_with(1, None, f).await
    }

    /// Like [`transaction`][Self::transaction] with up to `attempts` tries:
    /// each failure rolls back and reruns `f` on a fresh transaction. The
    /// error of the final attempt is returned; rollback errors along the
    /// way are swallowed in its favor.
    pub async fn transaction_with<T, F>(
        &self,
        attempts: u32,
        isolation: Option<IsolationLevel>,
        f: F,
    ) -> Result<T>
    where
        F: for<'t> Fn(&'t mut Transaction) -> BoxFuture<'t, Result<T>>,
    {
        let attempts = attempts.max(1);
        let mut last_err = None;

        for _ in 0..attempts {
            let mut txn = self.begin_transaction(isolation).await?;

            match f(&mut txn).await {
                Ok(value) => match txn.commit().await {
                    Ok(()) => return Ok(value),
                    Err(err) => last_err = Some(err),
                },

                Err(err) => {
                    let _ = txn.rollback().await;
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.expect("transaction ran zero attempts"))
    }

    /// `true` when a connection can be borrowed and answers `COM_PING`.
    pub async fn ping(&self) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;

        Ok(conn.ping().await.is_ok())
    }

    /// Ping every idle connection, discarding broken ones.
    pub async fn health_check(&self) -> HealthReport {
        self.pool.health_check().await
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            pool: self.pool.stats(),
            statement_cache_hits: self.cache_stats.hits.load(Ordering::Relaxed),
            statement_cache_misses: self.cache_stats.misses.load(Ordering::Relaxed),
        }
    }

    /// Close the pool. Idempotent; later calls on the client fail with
    /// [`Error::PoolClosed`].
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    fn count_cache_lookup(&self, conn: &mut PoolConnection, sql: &str) {
        if !conn.cache_statement.is_enabled() {
            return;
        }

        if conn.cache_statement.get_mut(sql).is_some() {
            self.cache_stats.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_stats.misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").field("pool", &self.pool).finish()
    }
}

/// A prepared statement that pins its pooled connection.
///
/// [`close`][Self::close] deallocates the statement server-side and
/// releases the connection; closing twice is a no-op. Dropping the handle
/// without closing releases the connection and, when statement caching is
/// on, leaves the statement cached for reuse.
pub struct ManagedStatement {
    conn: Option<PoolConnection>,
    statement: Statement,
    sql: String,
    cached: bool,
}

impl ManagedStatement {
    /// Metadata for the prepared statement.
    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Execute with the given parameters and materialize the result.
    pub async fn query(&mut self, params: &[Value]) -> Result<QueryResult> {
        let conn = self.conn.as_mut().ok_or(Error::StatementClosed)?;

        conn.execute_statement(&self.statement, params).await
    }

    /// Execute and return the affected-row count.
    pub async fn execute(&mut self, params: &[Value]) -> Result<u64> {
        Ok(self.query(params).await?.affected_rows())
    }

    /// Deallocate the statement and release the connection to the pool.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut conn) = self.conn.take() {
            if self.cached {
                conn.cache_statement.remove(&self.sql);
            }

            conn.close_statement(self.statement.id()).await?;
        }

        Ok(())
    }
}
