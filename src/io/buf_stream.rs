use std::io;
use std::ops::{Deref, DerefMut};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// A buffered duplex stream.
///
/// Writes are staged into `wbuf` until [`flush`][Self::flush]; reads pull
/// through `rbuf` so a partial packet arrival never hands out incomplete
/// data.
pub(crate) struct BufStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) stream: S,

    wbuf: Vec<u8>,
    rbuf: BytesMut,
}

impl<S> BufStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(stream: S) -> Self {
        Self {
            stream,
            wbuf: Vec::with_capacity(1024),
            rbuf: BytesMut::with_capacity(8192),
        }
    }

    /// The staged (unflushed) write buffer.
    pub(crate) fn buffer_mut(&mut self) -> &mut Vec<u8> {
        &mut self.wbuf
    }

    pub(crate) fn is_write_buffered(&self) -> bool {
        !self.wbuf.is_empty()
    }

    pub(crate) async fn flush(&mut self) -> io::Result<()> {
        if !self.wbuf.is_empty() {
            self.stream.write_all(&self.wbuf).await?;
            self.wbuf.clear();
        }

        self.stream.flush().await
    }

    /// Read exactly `n` bytes off the stream.
    pub(crate) async fn read(&mut self, n: usize) -> io::Result<Bytes> {
        while self.rbuf.len() < n {
            let read = self.stream.read_buf(&mut self.rbuf).await?;

            if read == 0 {
                // The server hung up on us; a well-behaved server sends
                // nothing after the response to COM_QUIT, anything else is
                // an abnormal termination.
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "connection closed unexpectedly",
                ));
            }
        }

        Ok(self.rbuf.split_to(n).freeze())
    }
}

impl<S> Deref for BufStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    type Target = S;

    fn deref(&self) -> &Self::Target {
        &self.stream
    }
}

impl<S> DerefMut for BufStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.stream
    }
}
