use std::time::Duration;

use tokio::net::TcpStream;

use crate::error::{Error, Result};

/// Open a TCP connection to `host:port`, bounded by `timeout` when one is
/// configured (a zero timeout waits indefinitely).
pub(crate) async fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let connect = TcpStream::connect((host, port));

    let stream = if timeout.is_zero() {
        connect.await.map_err(Error::connect)?
    } else {
        tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| {
                Error::connect(format!(
                    "timed out after {:?} connecting to {}:{}",
                    timeout, host, port
                ))
            })?
            .map_err(Error::connect)?
    };

    // Disable Nagle; the protocol is request/response and every flush is a
    // complete command.
    stream.set_nodelay(true).map_err(Error::connect)?;

    Ok(stream)
}
