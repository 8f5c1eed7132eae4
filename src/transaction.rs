use crate::error::{Error, Result};
use crate::pool::PoolConnection;
use crate::result::QueryResult;
use crate::row::Row;
use crate::value::Value;

/// Standard transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// An in-progress transaction, pinned to one pooled connection.
///
/// The connection is not returned to the pool until [`commit`][Self::commit]
/// or [`rollback`][Self::rollback]. Dropping the handle without either
/// leaves the transaction open on the wire; the pool notices the open
/// transaction on release and closes the connection, which rolls it back
/// server-side.
pub struct Transaction {
    conn: Option<PoolConnection>,
}

impl Transaction {
    pub(crate) fn new(conn: PoolConnection) -> Self {
        Self { conn: Some(conn) }
    }

    pub fn is_active(&self) -> bool {
        self.conn.is_some()
    }

    fn conn(&mut self) -> Result<&mut PoolConnection> {
        self.conn.as_mut().ok_or(Error::TransactionClosed)
    }

    /// Run a query inside the transaction; parameters route through a
    /// prepared statement exactly as on [`Client::query`][crate::Client::query].
    pub async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let conn = self.conn()?;

        if params.is_empty() {
            conn.run_query(sql, None).await
        } else {
            conn.run_query(sql, Some(params)).await
        }
    }

    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        Ok(self.query(sql, params).await?.affected_rows())
    }

    pub async fn execute_get_id(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        Ok(self.query(sql, params).await?.last_insert_id())
    }

    pub async fn fetch_one(&mut self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, params).await?.into_rows().into_iter().next())
    }

    pub async fn fetch_value(&mut self, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        match self.fetch_one(sql, params).await? {
            Some(row) => Ok(Some(row.try_get_index(0)?.clone())),
            None => Ok(None),
        }
    }

    pub async fn savepoint(&mut self, name: &str) -> Result<()> {
        let sql = format!("SAVEPOINT {}", quote_savepoint(name)?);
        self.conn()?.run_query(&sql, None).await?;

        Ok(())
    }

    pub async fn rollback_to(&mut self, name: &str) -> Result<()> {
        let sql = format!("ROLLBACK TO SAVEPOINT {}", quote_savepoint(name)?);
        self.conn()?.run_query(&sql, None).await?;

        Ok(())
    }

    pub async fn release_savepoint(&mut self, name: &str) -> Result<()> {
        let sql = format!("RELEASE SAVEPOINT {}", quote_savepoint(name)?);
        self.conn()?.run_query(&sql, None).await?;

        Ok(())
    }

    /// Commit and release the connection back to the pool.
    pub async fn commit(mut self) -> Result<()> {
        let mut conn = self.conn.take().ok_or(Error::TransactionClosed)?;

        conn.run_query("COMMIT", None).await?;

        // conn drops here and goes back to the pool clean
        Ok(())
    }

    /// Roll back and release the connection back to the pool.
    pub async fn rollback(mut self) -> Result<()> {
        let mut conn = self.conn.take().ok_or(Error::TransactionClosed)?;

        conn.run_query("ROLLBACK", None).await?;

        Ok(())
    }
}

fn quote_savepoint(name: &str) -> Result<String> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(Error::Configuration(
            format!("invalid savepoint name {:?}", name).into(),
        ));
    }

    Ok(format!("`{}`", name))
}
