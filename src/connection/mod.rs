use crate::common::StatementCache;
use crate::error::{Error, ErrorKind, Result};
use crate::options::ConnectOptions;
use crate::protocol::text::{ComInitDb, ComPing, ComQuit, ComResetConnection};
use crate::protocol::Status;
use crate::statement::Statement;

mod establish;
mod executor;
mod kill;
mod stream;
mod tls;

pub(crate) use kill::kill_query;
pub(crate) use stream::{Busy, PacketStream};

/// The maximum packet size we tell the server we accept.
pub(crate) const MAX_PACKET_SIZE: u32 = 16 * 1024 * 1024;

/// A single connection to a MySQL or MariaDB server.
///
/// Most applications use [`Client`][crate::Client], which multiplexes
/// queries over a pool of these; a bare connection is useful for one-off
/// sessions and tools.
pub struct Connection {
    pub(crate) stream: PacketStream,

    /// The server thread id from the handshake; `KILL QUERY` targets this.
    pub(crate) thread_id: u32,

    pub(crate) server_version: String,

    /// Statements prepared on this connection, by SQL text. Statement ids
    /// are scoped to the connection, so the cache is too.
    pub(crate) cache_statement: StatementCache<Statement>,
}

impl Connection {
    /// Open a connection using a `mysql://` connection URI.
    pub async fn connect(url: &str) -> Result<Self> {
        let options: ConnectOptions = url.parse()?;

        Self::connect_with(&options).await
    }

    /// Open a connection with explicit options.
    pub async fn connect_with(options: &ConnectOptions) -> Result<Self> {
        if options.connect_timeout.is_zero() {
            Self::establish(options).await
        } else {
            tokio::time::timeout(options.connect_timeout, Self::establish(options))
                .await
                .map_err(|_| {
                    Error::connect(format!(
                        "timed out after {:?} while establishing a connection",
                        options.connect_timeout
                    ))
                })?
        }
    }

    /// The version string reported by the server, e.g. `8.0.18`.
    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// The server-assigned connection (thread) id.
    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    /// Round-trip a `COM_PING`.
    pub async fn ping(&mut self) -> Result<()> {
        self.stream.wait_until_ready().await?;
        self.stream.send_packet(ComPing).await?;
        self.stream.recv_ok().await?;

        Ok(())
    }

    /// Change the default schema for this session (`COM_INIT_DB`).
    pub async fn use_database(&mut self, database: &str) -> Result<()> {
        self.stream.wait_until_ready().await?;
        self.stream.send_packet(ComInitDb(database)).await?;
        self.stream.recv_ok().await?;

        Ok(())
    }

    /// Send `COM_QUIT` and tear down the socket. The server does not
    /// respond.
    pub async fn close(mut self) -> Result<()> {
        let _ = self.stream.send_packet(ComQuit).await;
        self.stream.shutdown().await?;

        Ok(())
    }

    /// `COM_RESET_CONNECTION`: the server discards session state including
    /// every prepared statement, so the local cache is emptied with it.
    pub(crate) async fn reset(&mut self) -> Result<()> {
        self.stream.wait_until_ready().await?;
        self.stream.send_packet(ComResetConnection).await?;
        self.stream.recv_ok().await?;

        self.cache_statement.clear();

        Ok(())
    }

    /// At a command boundary, with nothing abandoned in flight.
    pub(crate) fn is_ready(&self) -> bool {
        self.stream.busy == Busy::NotBusy
    }

    /// Ready *and* safe to hand to the next borrower: no response pending
    /// and no transaction left open.
    pub(crate) fn is_clean(&self) -> bool {
        self.is_ready()
            && !self
                .stream
                .server_status
                .contains(Status::SERVER_STATUS_IN_TRANS)
    }

    /// A connection that comes back from a borrower mid-command was
    /// cancelled; the response is still owed by the server.
    pub(crate) fn was_cancelled(&self) -> bool {
        !self.is_ready()
    }

    /// Absorb the aftermath of a cancelled query: consume whatever is left
    /// of the abandoned response, then run `DO SLEEP(0)` to soak up a stale
    /// kill flag. ERR 1317 ("query interrupted") on either step is the
    /// expected outcome of a kill and counts as success.
    pub(crate) async fn drain_cancelled(&mut self) -> Result<()> {
        match self.stream.wait_until_ready().await {
            Ok(()) => {}
            Err(Error::Server(e)) if e.kind() == ErrorKind::QueryInterrupted => {}
            Err(e) => return Err(e),
        }

        match self.run_query("DO SLEEP(0)", None).await {
            Ok(_) => Ok(()),
            Err(Error::Server(e)) if e.kind() == ErrorKind::QueryInterrupted => Ok(()),
            Err(e) => Err(e),
        }
    }

}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("thread_id", &self.thread_id)
            .field("server_version", &self.server_version)
            .finish()
    }
}
