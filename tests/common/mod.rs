//! A scripted in-process MySQL server, speaking just enough of the v10
//! protocol to exercise the client end-to-end without a real database.
//!
//! The server negotiates `DEPRECATE_EOF`, answers a fixed repertoire of
//! statements, evaluates `SELECT SLEEP(n)` with a real (interruptible)
//! timer, and implements `KILL QUERY` across connections so cancellation
//! can be tested for real.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

use myna::ConnectOptions;

const CAP_MYSQL: u32 = 1;
const CAP_CONNECT_WITH_DB: u32 = 8;
const CAP_PROTOCOL_41: u32 = 0x200;
const CAP_TRANSACTIONS: u32 = 0x2000;
const CAP_SECURE_CONNECTION: u32 = 0x8000;
const CAP_MULTI_STATEMENTS: u32 = 0x1_0000;
const CAP_MULTI_RESULTS: u32 = 0x2_0000;
const CAP_PS_MULTI_RESULTS: u32 = 0x4_0000;
const CAP_PLUGIN_AUTH: u32 = 0x8_0000;
const CAP_PLUGIN_AUTH_LENENC: u32 = 0x20_0000;
const CAP_DEPRECATE_EOF: u32 = 0x100_0000;

const STATUS_IN_TRANS: u16 = 1;
const STATUS_AUTOCOMMIT: u16 = 2;
const STATUS_MORE_RESULTS: u16 = 8;

const TYPE_LONGLONG: u8 = 0x08;
const TYPE_VAR_STRING: u8 = 0xfd;

const CHARSET_UTF8MB4: u16 = 45;

#[derive(Clone)]
pub struct MockConfig {
    /// Advertise `caching_sha2_password` and immediately switch the client
    /// to `mysql_native_password`.
    pub auth_switch: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self { auth_switch: false }
    }
}

pub struct MockServer {
    pub addr: SocketAddr,

    /// `COM_STMT_PREPARE` commands served, across all connections.
    pub prepares: Arc<AtomicUsize>,

    /// TCP connections accepted (kill side-channels included).
    pub connections: Arc<AtomicUsize>,

    /// `KILL QUERY` statements served.
    pub kills: Arc<AtomicUsize>,
}

struct Shared {
    prepares: Arc<AtomicUsize>,
    connections: Arc<AtomicUsize>,
    kills: Arc<AtomicUsize>,

    next_thread_id: AtomicU32,

    /// Queries currently in `SLEEP`, by thread id, with their interrupters.
    sleepers: Mutex<HashMap<u32, Arc<Notify>>>,

    /// Threads whose last query was killed; the next `DO SLEEP(0)` on them
    /// reports ERR 1317 once.
    killed: Mutex<HashSet<u32>>,

    config: MockConfig,
}

impl MockServer {
    pub async fn start() -> Self {
        Self::start_with(MockConfig::default()).await
    }

    pub async fn start_with(config: MockConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let shared = Arc::new(Shared {
            prepares: Arc::new(AtomicUsize::new(0)),
            connections: Arc::new(AtomicUsize::new(0)),
            kills: Arc::new(AtomicUsize::new(0)),
            next_thread_id: AtomicU32::new(1),
            sleepers: Mutex::new(HashMap::new()),
            killed: Mutex::new(HashSet::new()),
            config,
        });

        let server = MockServer {
            addr,
            prepares: shared.prepares.clone(),
            connections: shared.connections.clone(),
            kills: shared.kills.clone(),
        };

        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };

                let shared = shared.clone();
                shared.connections.fetch_add(1, Ordering::SeqCst);

                tokio::spawn(async move {
                    let _ = serve_connection(socket, shared).await;
                });
            }
        });

        server
    }

    pub fn options(&self) -> ConnectOptions {
        ConnectOptions::new()
            .host(&self.addr.ip().to_string())
            .port(self.addr.port())
            .username("root")
            .connect_timeout(Duration::from_secs(5))
    }

    pub fn url(&self) -> String {
        format!("mysql://root@{}:{}", self.addr.ip(), self.addr.port())
    }
}

struct PacketIo {
    stream: TcpStream,
    seq: u8,
}

impl PacketIo {
    async fn read_packet(&mut self) -> std::io::Result<Vec<u8>> {
        let mut header = [0_u8; 4];
        self.stream.read_exact(&mut header).await?;

        let len = usize::from(header[0]) | usize::from(header[1]) << 8 | usize::from(header[2]) << 16;
        self.seq = header[3].wrapping_add(1);

        let mut payload = vec![0_u8; len];
        self.stream.read_exact(&mut payload).await?;

        Ok(payload)
    }

    async fn write_packet(&mut self, payload: &[u8]) -> std::io::Result<()> {
        let mut header = (payload.len() as u32).to_le_bytes();
        header[3] = self.seq;
        self.seq = self.seq.wrapping_add(1);

        self.stream.write_all(&header).await?;
        self.stream.write_all(payload).await?;
        self.stream.flush().await
    }
}

struct ConnState {
    thread_id: u32,
    in_trans: bool,
    next_stmt_id: u32,
    statements: HashMap<u32, PreparedStmt>,
}

struct PreparedStmt {
    sql: String,
    params: usize,
    columns: usize,
}

async fn serve_connection(stream: TcpStream, shared: Arc<Shared>) -> std::io::Result<()> {
    let thread_id = shared.next_thread_id.fetch_add(1, Ordering::SeqCst);
    let mut io = PacketIo { stream, seq: 0 };

    // --- connection phase ---

    let initial_plugin = if shared.config.auth_switch {
        "caching_sha2_password"
    } else {
        "mysql_native_password"
    };

    io.write_packet(&handshake_payload(thread_id, initial_plugin))
        .await?;

    let _handshake_response = io.read_packet().await?;

    if shared.config.auth_switch {
        // switch the client over to native password with a fresh scramble
        let mut switch = vec![0xfe_u8];
        switch.extend_from_slice(b"mysql_native_password\x00");
        switch.extend_from_slice(b"ABCDEFGHIJKLMNOPQRST\x00");
        io.write_packet(&switch).await?;

        let _switch_response = io.read_packet().await?;
    }

    io.write_packet(&ok_payload(0, 0, STATUS_AUTOCOMMIT, 0))
        .await?;

    // --- command phase ---

    let mut state = ConnState {
        thread_id,
        in_trans: false,
        next_stmt_id: 1,
        statements: HashMap::new(),
    };

    loop {
        let payload = match io.read_packet().await {
            Ok(payload) => payload,
            Err(_) => return Ok(()), // client hung up
        };

        if payload.is_empty() {
            continue;
        }

        match payload[0] {
            // COM_QUIT
            0x01 => return Ok(()),

            // COM_INIT_DB
            0x02 => {
                io.write_packet(&ok_payload(0, 0, status_of(&state), 0))
                    .await?;
            }

            // COM_QUERY
            0x03 => {
                let sql = String::from_utf8_lossy(&payload[1..]).to_string();
                handle_query(&mut io, &shared, &mut state, &sql).await?;
            }

            // COM_PING
            0x0e => {
                io.write_packet(&ok_payload(0, 0, status_of(&state), 0))
                    .await?;
            }

            // COM_STMT_PREPARE
            0x16 => {
                shared.prepares.fetch_add(1, Ordering::SeqCst);

                let sql = String::from_utf8_lossy(&payload[1..]).to_string();
                handle_prepare(&mut io, &mut state, &sql).await?;
            }

            // COM_STMT_EXECUTE
            0x17 => {
                handle_execute(&mut io, &mut state, &payload).await?;
            }

            // COM_STMT_CLOSE: no response
            0x19 => {}

            // COM_RESET_CONNECTION
            0x1f => {
                state.in_trans = false;
                state.statements.clear();
                shared.killed.lock().unwrap().remove(&state.thread_id);

                io.write_packet(&ok_payload(0, 0, STATUS_AUTOCOMMIT, 0))
                    .await?;
            }

            _ => {
                io.write_packet(&err_payload(1047, "08S01", "unknown command"))
                    .await?;
            }
        }
    }
}

fn status_of(state: &ConnState) -> u16 {
    if state.in_trans {
        STATUS_AUTOCOMMIT | STATUS_IN_TRANS
    } else {
        STATUS_AUTOCOMMIT
    }
}

async fn handle_query(
    io: &mut PacketIo,
    shared: &Arc<Shared>,
    state: &mut ConnState,
    sql: &str,
) -> std::io::Result<()> {
    // naive multi-statement support: respond per `;`-separated statement,
    // flagging MORE_RESULTS on all but the last
    let statements: Vec<&str> = sql
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    for (i, statement) in statements.iter().enumerate() {
        let last = i + 1 == statements.len();
        let more = if last { 0 } else { STATUS_MORE_RESULTS };

        handle_single_query(io, shared, state, statement, more).await?;
    }

    Ok(())
}

async fn handle_single_query(
    io: &mut PacketIo,
    shared: &Arc<Shared>,
    state: &mut ConnState,
    sql: &str,
    more: u16,
) -> std::io::Result<()> {
    let upper = sql.to_ascii_uppercase();
    let status = status_of(state) | more;

    if let Some(rest) = upper.strip_prefix("SELECT SLEEP(") {
        let secs: f64 = rest
            .trim_end_matches(')')
            .trim()
            .parse()
            .unwrap_or(0.0);

        let notify = Arc::new(Notify::new());
        shared
            .sleepers
            .lock()
            .unwrap()
            .insert(state.thread_id, notify.clone());

        let interrupted = tokio::select! {
            _ = notify.notified() => true,
            _ = tokio::time::sleep(Duration::from_secs_f64(secs)) => false,
        };

        shared.sleepers.lock().unwrap().remove(&state.thread_id);

        if interrupted {
            shared.killed.lock().unwrap().insert(state.thread_id);

            return io
                .write_packet(&err_payload(1317, "70100", "Query execution was interrupted"))
                .await;
        }

        return write_text_result(
            io,
            &[column("SLEEP(n)", TYPE_LONGLONG, 63)],
            &[vec![Some("0".to_string())]],
            status,
        )
        .await;
    }

    if let Some(rest) = upper.strip_prefix("KILL QUERY ") {
        shared.kills.fetch_add(1, Ordering::SeqCst);

        if let Ok(target) = rest.trim().parse::<u32>() {
            if let Some(notify) = shared.sleepers.lock().unwrap().get(&target) {
                notify.notify_one();
            }
        }

        return io.write_packet(&ok_payload(0, 0, status, 0)).await;
    }

    if upper == "DO SLEEP(0)" {
        if shared.killed.lock().unwrap().remove(&state.thread_id) {
            return io
                .write_packet(&err_payload(1317, "70100", "Query execution was interrupted"))
                .await;
        }

        return io.write_packet(&ok_payload(0, 0, status, 0)).await;
    }

    match &*upper {
        "SELECT 1 + 1" => {
            write_text_result(
                io,
                &[column("1 + 1", TYPE_LONGLONG, 63)],
                &[vec![Some("2".to_string())]],
                status,
            )
            .await
        }

        "SELECT 1 AS X, 2 AS X, 3 AS X" => {
            write_text_result(
                io,
                &[
                    column("x", TYPE_LONGLONG, 63),
                    column("x", TYPE_LONGLONG, 63),
                    column("x", TYPE_LONGLONG, 63),
                ],
                &[vec![
                    Some("1".to_string()),
                    Some("2".to_string()),
                    Some("3".to_string()),
                ]],
                status,
            )
            .await
        }

        "SELECT N FROM SEQ" => {
            let rows: Vec<Vec<Option<String>>> =
                (0..5).map(|n| vec![Some(n.to_string())]).collect();

            write_text_result(io, &[column("n", TYPE_LONGLONG, 63)], &rows, status).await
        }

        "SELECT * FROM EMPTY" => {
            write_text_result(io, &[column("id", TYPE_LONGLONG, 63)], &[], status).await
        }

        "START TRANSACTION" => {
            state.in_trans = true;
            io.write_packet(&ok_payload(0, 0, status_of(state) | more, 0))
                .await
        }

        "COMMIT" | "ROLLBACK" => {
            state.in_trans = false;
            io.write_packet(&ok_payload(0, 0, status_of(state) | more, 0))
                .await
        }

        _ if upper.starts_with("INSERT") => {
            io.write_packet(&ok_payload(1, 7, status, 0)).await
        }

        _ if upper.starts_with("SELECT NULL") => {
            write_text_result(io, &[column("NULL", TYPE_VAR_STRING, 45)], &[vec![None]], status)
                .await
        }

        // SET ..., DO ..., etc.
        _ => io.write_packet(&ok_payload(0, 0, status, 0)).await,
    }
}

async fn handle_prepare(
    io: &mut PacketIo,
    state: &mut ConnState,
    sql: &str,
) -> std::io::Result<()> {
    let params = sql.matches('?').count();
    let columns = if sql.trim_start().to_ascii_uppercase().starts_with("SELECT") {
        1
    } else {
        0
    };

    let stmt_id = state.next_stmt_id;
    state.next_stmt_id += 1;

    state.statements.insert(
        stmt_id,
        PreparedStmt {
            sql: sql.to_string(),
            params,
            columns,
        },
    );

    // COM_STMT_PREPARE_OK
    let mut ok = vec![0x00_u8];
    ok.extend_from_slice(&stmt_id.to_le_bytes());
    ok.extend_from_slice(&(columns as u16).to_le_bytes());
    ok.extend_from_slice(&(params as u16).to_le_bytes());
    ok.push(0x00);
    ok.extend_from_slice(&0_u16.to_le_bytes());
    io.write_packet(&ok).await?;

    for _ in 0..params {
        io.write_packet(&column_def_payload(&column("?", TYPE_VAR_STRING, 63)))
            .await?;
    }

    if columns > 0 {
        let name = if sql.trim() == "SELECT ?" { "?" } else { "c" };

        io.write_packet(&column_def_payload(&column(name, TYPE_VAR_STRING, CHARSET_UTF8MB4)))
            .await?;
    }

    // DEPRECATE_EOF was negotiated: no trailing EOF packets

    Ok(())
}

async fn handle_execute(
    io: &mut PacketIo,
    state: &mut ConnState,
    payload: &[u8],
) -> std::io::Result<()> {
    let stmt_id = u32::from_le_bytes(payload[1..5].try_into().unwrap());

    let Some(stmt) = state.statements.get(&stmt_id) else {
        return io
            .write_packet(&err_payload(1243, "HY000", "Unknown prepared statement handler"))
            .await;
    };

    let status = status_of(state);

    // parse the first bound parameter, if any, for echoing back
    let first_param = parse_first_param(&payload[10..], stmt.params);

    if stmt.columns == 0 {
        return io.write_packet(&ok_payload(1, 7, status, 0)).await;
    }

    let name = if stmt.sql.trim() == "SELECT ?" { "?" } else { "c" };

    // column count
    io.write_packet(&[stmt.columns as u8]).await?;
    io.write_packet(&column_def_payload(&column(name, TYPE_VAR_STRING, CHARSET_UTF8MB4)))
        .await?;

    // one binary row echoing the first parameter
    let mut row = vec![0x00_u8];
    let bitmap_len = (stmt.columns + 9) / 8;

    match first_param {
        Some(value) => {
            row.extend(std::iter::repeat(0).take(bitmap_len));
            push_lenenc_str(&mut row, &value);
        }

        None => {
            // NULL: set the bit for column 0 (offset 2)
            let mut bitmap = vec![0_u8; bitmap_len];
            bitmap[0] |= 1 << 2;
            row.extend_from_slice(&bitmap);
        }
    }

    io.write_packet(&row).await?;

    io.write_packet(&eof_ok_payload(status, 0)).await
}

/// Decode the first parameter of a COM_STMT_EXECUTE parameter block the way
/// this client encodes it (types always sent).
fn parse_first_param(mut buf: &[u8], params: usize) -> Option<String> {
    if params == 0 {
        return Some(String::new());
    }

    let bitmap_len = (params + 7) / 8;
    let null_bitmap = &buf[..bitmap_len];
    let first_is_null = null_bitmap[0] & 1 != 0;
    buf = &buf[bitmap_len..];

    // new_params_bound_flag
    assert_eq!(buf[0], 0x01, "client always sends parameter types");
    buf = &buf[1..];

    let first_type = buf[0];
    let first_unsigned = buf[1] & 0x80 != 0;
    buf = &buf[2 * params..];

    if first_is_null {
        return None;
    }

    Some(match first_type {
        TYPE_LONGLONG if first_unsigned => {
            u64::from_le_bytes(buf[..8].try_into().unwrap()).to_string()
        }
        TYPE_LONGLONG => i64::from_le_bytes(buf[..8].try_into().unwrap()).to_string(),

        0x04 => f32::from_le_bytes(buf[..4].try_into().unwrap()).to_string(),
        0x05 => f64::from_le_bytes(buf[..8].try_into().unwrap()).to_string(),

        // VAR_STRING / BLOB: lenenc
        _ => {
            let (len, consumed) = read_lenenc(buf);
            String::from_utf8_lossy(&buf[consumed..consumed + len as usize]).to_string()
        }
    })
}

fn read_lenenc(buf: &[u8]) -> (u64, usize) {
    match buf[0] {
        0xfc => (u64::from(u16::from_le_bytes(buf[1..3].try_into().unwrap())), 3),
        0xfd => {
            let v = u64::from(buf[1]) | u64::from(buf[2]) << 8 | u64::from(buf[3]) << 16;
            (v, 4)
        }
        0xfe => (u64::from_le_bytes(buf[1..9].try_into().unwrap()), 9),
        v => (u64::from(v), 1),
    }
}

// --- payload builders ---

struct MockColumn {
    name: String,
    type_id: u8,
    charset: u16,
}

fn column(name: &str, type_id: u8, charset: u16) -> MockColumn {
    MockColumn {
        name: name.to_string(),
        type_id,
        charset,
    }
}

fn handshake_payload(thread_id: u32, plugin: &str) -> Vec<u8> {
    let caps: u32 = CAP_MYSQL
        | CAP_CONNECT_WITH_DB
        | CAP_PROTOCOL_41
        | CAP_TRANSACTIONS
        | CAP_SECURE_CONNECTION
        | CAP_MULTI_STATEMENTS
        | CAP_MULTI_RESULTS
        | CAP_PS_MULTI_RESULTS
        | CAP_PLUGIN_AUTH
        | CAP_PLUGIN_AUTH_LENENC
        | CAP_DEPRECATE_EOF;

    let mut payload = vec![0x0a_u8];
    payload.extend_from_slice(b"8.0.18-mock\x00");
    payload.extend_from_slice(&thread_id.to_le_bytes());

    // scramble part 1 + filler
    payload.extend_from_slice(b"abcdefgh");
    payload.push(0x00);

    payload.extend_from_slice(&(caps as u16).to_le_bytes());

    // collation, status
    payload.push(CHARSET_UTF8MB4 as u8);
    payload.extend_from_slice(&STATUS_AUTOCOMMIT.to_le_bytes());

    payload.extend_from_slice(&((caps >> 16) as u16).to_le_bytes());

    // auth plugin data length, 10 reserved bytes
    payload.push(21);
    payload.extend_from_slice(&[0_u8; 10]);

    // scramble part 2 + NUL
    payload.extend_from_slice(b"ijklmnopqrst");
    payload.push(0x00);

    payload.extend_from_slice(plugin.as_bytes());
    payload.push(0x00);

    payload
}

fn ok_payload(affected: u64, last_insert_id: u64, status: u16, warnings: u16) -> Vec<u8> {
    let mut payload = vec![0x00_u8];
    push_lenenc_int(&mut payload, affected);
    push_lenenc_int(&mut payload, last_insert_id);
    payload.extend_from_slice(&status.to_le_bytes());
    payload.extend_from_slice(&warnings.to_le_bytes());
    payload
}

/// Under DEPRECATE_EOF the result-set terminator is an OK packet with an
/// EOF header.
fn eof_ok_payload(status: u16, warnings: u16) -> Vec<u8> {
    let mut payload = vec![0xfe_u8];
    push_lenenc_int(&mut payload, 0);
    push_lenenc_int(&mut payload, 0);
    payload.extend_from_slice(&status.to_le_bytes());
    payload.extend_from_slice(&warnings.to_le_bytes());
    payload
}

fn err_payload(code: u16, sql_state: &str, message: &str) -> Vec<u8> {
    let mut payload = vec![0xff_u8];
    payload.extend_from_slice(&code.to_le_bytes());
    payload.push(b'#');
    payload.extend_from_slice(sql_state.as_bytes());
    payload.extend_from_slice(message.as_bytes());
    payload
}

fn column_def_payload(column: &MockColumn) -> Vec<u8> {
    let mut payload = Vec::new();

    push_lenenc_str(&mut payload, "def");
    push_lenenc_str(&mut payload, "mock");
    push_lenenc_str(&mut payload, "t");
    push_lenenc_str(&mut payload, "t");
    push_lenenc_str(&mut payload, &column.name);
    push_lenenc_str(&mut payload, &column.name);

    payload.push(0x0c);
    payload.extend_from_slice(&column.charset.to_le_bytes());
    payload.extend_from_slice(&255_u32.to_le_bytes());
    payload.push(column.type_id);
    payload.extend_from_slice(&0_u16.to_le_bytes());
    payload.push(0);
    payload.extend_from_slice(&[0, 0]);

    payload
}

async fn write_text_result(
    io: &mut PacketIo,
    columns: &[MockColumn],
    rows: &[Vec<Option<String>>],
    status: u16,
) -> std::io::Result<()> {
    io.write_packet(&[columns.len() as u8]).await?;

    for column in columns {
        io.write_packet(&column_def_payload(column)).await?;
    }

    for row in rows {
        let mut payload = Vec::new();

        for value in row {
            match value {
                Some(value) => push_lenenc_str(&mut payload, value),
                None => payload.push(0xfb),
            }
        }

        io.write_packet(&payload).await?;
    }

    io.write_packet(&eof_ok_payload(status, 0)).await
}

fn push_lenenc_int(buf: &mut Vec<u8>, value: u64) {
    if value < 0xfb {
        buf.push(value as u8);
    } else if value <= 0xffff {
        buf.push(0xfc);
        buf.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xff_ffff {
        buf.push(0xfd);
        buf.extend_from_slice(&(value as u32).to_le_bytes()[..3]);
    } else {
        buf.push(0xfe);
        buf.extend_from_slice(&value.to_le_bytes());
    }
}

fn push_lenenc_str(buf: &mut Vec<u8>, value: &str) {
    push_lenenc_int(buf, value.len() as u64);
    buf.extend_from_slice(value.as_bytes());
}
