use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::column::Column;
use crate::connection::{Busy, Connection};
use crate::error::{Error, Result};
use crate::io::BufExt;
use crate::protocol::statement::{
    BinaryRow, ComStmtClose, ComStmtExecute, ComStmtPrepare, ComStmtPrepareOk,
};
use crate::protocol::text::{ColumnDefinition, ComQuery, TextRow};
use crate::protocol::{Packet, Status};
use crate::result::{QueryResult, StreamStats};
use crate::row::{disambiguated_names, Row};
use crate::statement::Statement;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Text,
    Binary,
}

impl Connection {
    /// Prepare `sql` on this connection, bypassing the statement cache.
    pub(crate) async fn prepare_statement(&mut self, sql: &str) -> Result<Statement> {
        self.stream.wait_until_ready().await?;

        // https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_stmt_prepare.html
        self.stream.send_packet(ComStmtPrepare(sql)).await?;

        let ok: ComStmtPrepareOk = self.stream.recv_packet().await?.decode()?;

        let mut param_types = Vec::with_capacity(ok.params as usize);

        if ok.params > 0 {
            for _ in 0..ok.params {
                let def: ColumnDefinition = self.stream.recv_packet().await?.decode()?;
                param_types.push(def.r#type);
            }

            self.stream.maybe_recv_eof().await?;
        }

        let mut columns = Vec::with_capacity(ok.columns as usize);

        if ok.columns > 0 {
            for ordinal in 0..(ok.columns as usize) {
                let def: ColumnDefinition = self.stream.recv_packet().await?.decode()?;
                columns.push(Column::from_definition(ordinal, def));
            }

            self.stream.maybe_recv_eof().await?;
        }

        let column_names = Arc::new(disambiguated_names(&columns));

        Ok(Statement {
            id: ok.statement_id,
            columns: Arc::new(columns),
            column_names,
            param_types,
            warnings: ok.warnings,
        })
    }

    /// Look up `sql` in the per-connection statement cache, preparing (and
    /// caching) it on a miss. The statement displaced by the insert is
    /// closed on the server.
    pub(crate) async fn get_or_prepare(&mut self, sql: &str) -> Result<Statement> {
        if let Some(statement) = self.cache_statement.get_mut(sql) {
            return Ok(statement.clone());
        }

        let statement = self.prepare_statement(sql).await?;

        if self.cache_statement.is_enabled() {
            if let Some(displaced) = self.cache_statement.insert(sql, statement.clone()) {
                self.close_statement(displaced.id).await?;
            }
        }

        Ok(statement)
    }

    /// `COM_STMT_CLOSE` is fire-and-forget; the connection stays ready.
    pub(crate) async fn close_statement(&mut self, statement_id: u32) -> Result<()> {
        self.stream.send_packet(ComStmtClose { statement_id }).await
    }

    /// Run `sql`, routing through the text protocol without parameters and
    /// the prepared-statement (binary) protocol with them.
    pub(crate) async fn run_query(
        &mut self,
        sql: &str,
        params: Option<&[Value]>,
    ) -> Result<QueryResult> {
        match params {
            None => self.run(sql, None, None).await,

            Some(params) => {
                let statement = self.get_or_prepare(sql).await?;
                let close_after = !self.cache_statement.is_enabled();

                let result = self.run(sql, Some(&statement), Some(params)).await;

                if close_after {
                    // best effort; the result of the query is what matters
                    let _ = self.close_statement(statement.id).await;
                }

                result
            }
        }
    }

    /// Execute an already prepared statement (no cache involvement).
    pub(crate) async fn execute_statement(
        &mut self,
        statement: &Statement,
        params: &[Value],
    ) -> Result<QueryResult> {
        self.run("", Some(statement), Some(params)).await
    }

    async fn run(
        &mut self,
        sql: &str,
        statement: Option<&Statement>,
        params: Option<&[Value]>,
    ) -> Result<QueryResult> {
        self.stream.wait_until_ready().await?;

        let format = match (statement, params) {
            (Some(statement), Some(params)) => {
                if params.len() != statement.param_count() {
                    return Err(Error::Configuration(
                        format!(
                            "statement expects {} parameters but {} were bound",
                            statement.param_count(),
                            params.len()
                        )
                        .into(),
                    ));
                }

                // https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_stmt_execute.html
                self.stream
                    .send_packet(ComStmtExecute {
                        statement_id: statement.id,
                        params,
                    })
                    .await?;

                Format::Binary
            }

            _ => {
                // https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_query.html
                self.stream.send_packet(ComQuery(sql)).await?;

                Format::Text
            }
        };

        self.stream.busy = Busy::Result;

        let mut results: Vec<QueryResult> = Vec::new();

        loop {
            let packet = self.stream.recv_packet().await?;

            if packet[0] == 0x00 {
                // OK: a statement that produced no result set
                let ok = packet.ok()?;
                self.stream.server_status = ok.status;

                let more = ok.status.contains(Status::SERVER_MORE_RESULTS_EXISTS);

                results.push(QueryResult {
                    affected_rows: ok.affected_rows,
                    last_insert_id: ok.last_insert_id,
                    warnings: ok.warnings,
                    ..QueryResult::default()
                });

                if more {
                    continue;
                }

                self.stream.busy = Busy::NotBusy;
                break;
            }

            // a result set: column count, definitions, then rows
            let mut header = packet.into_bytes();
            let column_count = header.get_uint_lenenc()? as usize;

            let (columns, column_names, mut pending) = self
                .recv_result_metadata(column_count, format, statement)
                .await?;

            // metadata can change between prepare and execute; the freshly
            // received definitions are authoritative from here on
            if format == Format::Binary && !sql.is_empty() {
                if let Some(cached) = self.cache_statement.get_mut(sql) {
                    cached.columns = Arc::clone(&columns);
                    cached.column_names = Arc::clone(&column_names);
                }
            }

            self.stream.busy = Busy::Row;

            let mut rows = Vec::new();
            let warnings;

            let more = loop {
                let packet = match pending.take() {
                    Some(packet) => packet,
                    None => self.stream.recv_packet().await?,
                };

                if packet[0] == 0xfe && packet.len() < 9 {
                    let eof = packet.eof(self.stream.capabilities)?;
                    self.stream.server_status = eof.status;
                    warnings = eof.warnings;

                    break eof.status.contains(Status::SERVER_MORE_RESULTS_EXISTS);
                }

                rows.push(decode_row(packet, format, &columns, &column_names)?);
            };

            results.push(QueryResult {
                rows,
                columns: (*columns).clone(),
                warnings,
                ..QueryResult::default()
            });

            if more {
                self.stream.busy = Busy::Result;
                continue;
            }

            self.stream.busy = Busy::NotBusy;
            break;
        }

        // fold the collected results into the linked chain, head first
        let mut next: Option<Box<QueryResult>> = None;
        for mut result in results.into_iter().rev() {
            result.next = next.take();
            next = Some(Box::new(result));
        }

        // the loop above pushes at least one result before breaking
        Ok(*next.expect("query produced no response"))
    }

    /// Run `sql` delivering each row of the *first* result set to `on_row`
    /// as it is parsed. Additional result sets are consumed and discarded.
    pub(crate) async fn stream_query<F>(
        &mut self,
        sql: &str,
        params: Option<&[Value]>,
        mut on_row: F,
    ) -> Result<StreamStats>
    where
        F: FnMut(Row) -> Result<()> + Send,
    {
        let started = Instant::now();

        self.stream.wait_until_ready().await?;

        let (format, statement, close_after) = match params {
            Some(_) => {
                let statement = self.get_or_prepare(sql).await?;
                let close_after = !self.cache_statement.is_enabled();

                (Format::Binary, Some(statement), close_after)
            }
            None => (Format::Text, None, false),
        };

        let result = self
            .stream_inner(sql, format, statement.as_ref(), params, &mut on_row)
            .await;

        if close_after {
            if let Some(statement) = &statement {
                let _ = self.close_statement(statement.id).await;
            }
        }

        let (rows, columns, warnings) = result?;

        Ok(StreamStats {
            rows,
            columns,
            elapsed: started.elapsed(),
            warnings,
            connection_id: self.thread_id,
        })
    }

    async fn stream_inner(
        &mut self,
        sql: &str,
        format: Format,
        statement: Option<&Statement>,
        params: Option<&[Value]>,
        on_row: &mut (dyn FnMut(Row) -> Result<()> + Send),
    ) -> Result<(u64, usize, u16)> {
        match (statement, params) {
            (Some(statement), Some(params)) => {
                if params.len() != statement.param_count() {
                    return Err(Error::Configuration(
                        format!(
                            "statement expects {} parameters but {} were bound",
                            statement.param_count(),
                            params.len()
                        )
                        .into(),
                    ));
                }

                self.stream
                    .send_packet(ComStmtExecute {
                        statement_id: statement.id,
                        params,
                    })
                    .await?;
            }

            _ => {
                self.stream.send_packet(ComQuery(sql)).await?;
            }
        }

        self.stream.busy = Busy::Result;

        let packet = self.stream.recv_packet().await?;

        if packet[0] == 0x00 {
            let ok = packet.ok()?;
            self.stream.server_status = ok.status;

            if !ok.status.contains(Status::SERVER_MORE_RESULTS_EXISTS) {
                self.stream.busy = Busy::NotBusy;
            }

            // trailing result sets are not streamable; absorb them
            self.stream.wait_until_ready().await?;

            return Ok((0, 0, ok.warnings));
        }

        let mut header = packet.into_bytes();
        let column_count = header.get_uint_lenenc()? as usize;

        let (columns, column_names, mut pending) = self
            .recv_result_metadata(column_count, format, statement)
            .await?;

        self.stream.busy = Busy::Row;

        let mut delivered: u64 = 0;

        let (warnings, more) = loop {
            let packet = match pending.take() {
                Some(packet) => packet,
                None => self.stream.recv_packet().await?,
            };

            if packet[0] == 0xfe && packet.len() < 9 {
                let eof = packet.eof(self.stream.capabilities)?;
                self.stream.server_status = eof.status;

                break (
                    eof.warnings,
                    eof.status.contains(Status::SERVER_MORE_RESULTS_EXISTS),
                );
            }

            let row = decode_row(packet, format, &columns, &column_names)?;
            delivered += 1;

            if let Err(err) = on_row(row) {
                // the server still owes us the rest of the response; eat it
                // so the connection returns to the pool usable
                let _ = self.stream.wait_until_ready().await;

                return Err(err);
            }
        };

        self.stream.busy = if more { Busy::Result } else { Busy::NotBusy };

        // only the first result set streams; discard the rest
        self.stream.wait_until_ready().await?;

        Ok((delivered, columns.len(), warnings))
    }

    /// Receive the column definitions ahead of a result set.
    ///
    /// An execute response may omit the definitions entirely when nothing
    /// changed since prepare; the first post-header packet then opens a
    /// binary row (`0x00`), which a column definition (whose first field is
    /// the string `"def"`) never does. In that case the statement metadata
    /// is authoritative and the packet is handed back for row decoding.
    async fn recv_result_metadata(
        &mut self,
        column_count: usize,
        format: Format,
        statement: Option<&Statement>,
    ) -> Result<(
        Arc<Vec<Column>>,
        Arc<HashMap<String, usize>>,
        Option<Packet>,
    )> {
        let packet = self.stream.recv_packet().await?;

        if format == Format::Binary {
            if let Some(statement) = statement {
                if packet[0] == 0x00 && statement.columns.len() == column_count {
                    return Ok((
                        Arc::clone(&statement.columns),
                        Arc::clone(&statement.column_names),
                        Some(packet),
                    ));
                }
            }
        }

        let mut columns = Vec::with_capacity(column_count);

        let def: ColumnDefinition = packet.decode()?;
        columns.push(Column::from_definition(0, def));

        for ordinal in 1..column_count {
            let def: ColumnDefinition = self.stream.recv_packet().await?.decode()?;
            columns.push(Column::from_definition(ordinal, def));
        }

        self.stream.maybe_recv_eof().await?;

        let column_names = Arc::new(disambiguated_names(&columns));

        Ok((Arc::new(columns), column_names, None))
    }
}

fn decode_row(
    packet: Packet,
    format: Format,
    columns: &Arc<Vec<Column>>,
    column_names: &Arc<HashMap<String, usize>>,
) -> Result<Row> {
    use crate::io::Decode;

    let raw = match format {
        Format::Text => TextRow::decode_with(packet.into_bytes(), columns.as_slice())?.0,
        Format::Binary => BinaryRow::decode_with(packet.into_bytes(), columns.as_slice())?.0,
    };

    let mut values = Vec::with_capacity(raw.len());

    for (raw_value, column) in raw.into_iter().zip(columns.iter()) {
        values.push(match format {
            Format::Text => Value::decode_text(raw_value, column)?,
            Format::Binary => Value::decode_binary(raw_value, column)?,
        });
    }

    Ok(Row {
        columns: Arc::clone(columns),
        column_names: Arc::clone(column_names),
        values,
    })
}
