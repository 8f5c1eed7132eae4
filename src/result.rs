use std::time::Duration;

use crate::column::Column;
use crate::row::Row;

/// A fully materialized result set.
#[derive(Debug, Default)]
pub struct QueryResult {
    pub(crate) rows: Vec<Row>,
    pub(crate) columns: Vec<Column>,
    pub(crate) affected_rows: u64,
    pub(crate) last_insert_id: u64,
    pub(crate) warnings: u16,

    /// The next result set when the statement produced more than one
    /// (`SERVER_MORE_RESULTS_EXISTS`).
    pub(crate) next: Option<Box<QueryResult>>,
}

impl QueryResult {
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Rows changed by an `INSERT`/`UPDATE`/`DELETE`; 0 for a `SELECT`.
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    /// The `AUTO_INCREMENT` id generated by an `INSERT`, or 0.
    pub fn last_insert_id(&self) -> u64 {
        self.last_insert_id
    }

    pub fn warnings(&self) -> u16 {
        self.warnings
    }

    /// The following result set, when multi-statements or a stored procedure
    /// produced several.
    pub fn next_result(&self) -> Option<&QueryResult> {
        self.next.as_deref()
    }

    pub fn into_next_result(self) -> Option<QueryResult> {
        self.next.map(|boxed| *boxed)
    }
}

/// The outcome of a streaming query.
#[derive(Debug, Clone)]
pub struct StreamStats {
    pub(crate) rows: u64,
    pub(crate) columns: usize,
    pub(crate) elapsed: Duration,
    pub(crate) warnings: u16,
    pub(crate) connection_id: u32,
}

impl StreamStats {
    /// Rows delivered to the row callback.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Wall-clock time from dispatch to the terminal packet.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn warnings(&self) -> u16 {
        self.warnings
    }

    /// The server thread id of the connection that served the stream.
    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }
}
