use bytes::Bytes;
use tokio::net::TcpStream;

use crate::error::{err_protocol, Result};
use crate::io::{BufExt, BufStream, Decode, Encode};
use crate::net::MaybeTlsStream;
use crate::protocol::response::{EofPacket, OkPacket};
use crate::protocol::{Capabilities, Packet, Status};

/// Payloads at least this large are split across packets.
const MAX_PACKET_PAYLOAD: usize = 0xff_ff_ff;

/// What the connection is in the middle of, from the protocol's point of
/// view.
///
/// Anything other than `NotBusy` at release time means a command was
/// abandoned mid-flight (the future driving it was dropped); the pool
/// treats that as a cancelled query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Busy {
    NotBusy,

    /// Waiting for the next result-set header (or terminal OK).
    Result,

    /// Waiting for more rows (or the terminal EOF) of a result set.
    Row,
}

/// The framed packet transport under a connection: sequencing, splitting
/// and joining, and the busy/ready bookkeeping shared by every command.
pub(crate) struct PacketStream {
    stream: BufStream<MaybeTlsStream<TcpStream>>,

    pub(crate) capabilities: Capabilities,
    pub(crate) sequence_id: u8,
    pub(crate) busy: Busy,
    pub(crate) server_status: Status,

    // staging buffer so a payload can be measured (and split) before its
    // headers are written
    scratch: Vec<u8>,
}

impl PacketStream {
    pub(crate) fn new(socket: TcpStream, capabilities: Capabilities) -> Self {
        Self {
            stream: BufStream::new(MaybeTlsStream::Raw(socket)),
            capabilities,
            sequence_id: 0,
            busy: Busy::NotBusy,
            server_status: Status::empty(),
            scratch: Vec::with_capacity(1024),
        }
    }

    pub(crate) fn is_tls(&self) -> bool {
        self.stream.stream.is_tls()
    }

    #[cfg(feature = "tls")]
    pub(crate) async fn upgrade_tls(
        &mut self,
        host: &str,
        config: std::sync::Arc<rustls::ClientConfig>,
    ) -> Result<()> {
        self.stream.stream.upgrade(host, config).await
    }

    pub(crate) async fn shutdown(&mut self) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        self.stream.flush().await?;
        self.stream.stream.shutdown().await?;

        Ok(())
    }

    /// Stage a packet in the write buffer, splitting the payload at the
    /// 16 MiB − 1 boundary. Each emitted packet consumes one sequence id;
    /// a payload of exactly `n * (16 MiB − 1)` bytes is terminated by an
    /// empty packet.
    pub(crate) fn write_packet<'en, T>(&mut self, payload: T)
    where
        T: Encode<'en, Capabilities>,
    {
        self.scratch.clear();
        payload.encode_with(&mut self.scratch, self.capabilities);

        let buf = self.stream.buffer_mut();
        let mut offset = 0;

        loop {
            let chunk = (self.scratch.len() - offset).min(MAX_PACKET_PAYLOAD);

            buf.extend_from_slice(&(chunk as u32).to_le_bytes()[..3]);
            buf.push(self.sequence_id);
            buf.extend_from_slice(&self.scratch[offset..offset + chunk]);

            self.sequence_id = self.sequence_id.wrapping_add(1);
            offset += chunk;

            if offset >= self.scratch.len() && chunk < MAX_PACKET_PAYLOAD {
                break;
            }
        }
    }

    /// Begin a new command: the sequence id restarts at zero, the packet is
    /// written and the buffer flushed.
    pub(crate) async fn send_packet<'en, T>(&mut self, payload: T) -> Result<()>
    where
        T: Encode<'en, Capabilities>,
    {
        self.sequence_id = 0;
        self.write_packet(payload);
        self.flush().await
    }

    pub(crate) async fn flush(&mut self) -> Result<()> {
        self.stream.flush().await?;

        Ok(())
    }

    /// Receive one logical packet, reassembling 16 MiB splits. An `ERR`
    /// payload is converted into [`Error::Server`][crate::Error::Server]
    /// here so command loops never see it; `ERR` terminates the command, so
    /// the stream is marked ready again first.
    pub(crate) async fn recv_packet(&mut self) -> Result<Packet> {
        let mut joined: Option<Vec<u8>> = None;

        let payload = loop {
            let header = self.stream.read(4).await?;
            let len =
                usize::from(header[0]) | usize::from(header[1]) << 8 | usize::from(header[2]) << 16;
            let sequence = header[3];

            if sequence != self.sequence_id {
                return Err(err_protocol!(
                    "packet sequence out of order: expected {}, received {}",
                    self.sequence_id,
                    sequence
                ));
            }

            self.sequence_id = self.sequence_id.wrapping_add(1);

            let chunk = self.stream.read(len).await?;

            if joined.is_none() && len < MAX_PACKET_PAYLOAD {
                // the common case: one packet, zero copies
                break chunk;
            }

            let acc = joined.get_or_insert_with(Vec::new);
            acc.extend_from_slice(&chunk);

            if len < MAX_PACKET_PAYLOAD {
                break Bytes::new();
            }
        };

        let payload = match joined {
            Some(joined) => Bytes::from(joined),
            None => payload,
        };

        if payload.is_empty() {
            return Err(err_protocol!("received a packet with an empty payload"));
        }

        if payload[0] == 0xff {
            self.busy = Busy::NotBusy;

            let err = crate::protocol::response::ErrPacket::decode_with(
                payload,
                self.capabilities,
            )?;

            return Err(crate::error::ServerError::from(err).into());
        }

        Ok(Packet(payload))
    }

    pub(crate) async fn recv_ok(&mut self) -> Result<OkPacket> {
        let ok = self.recv_packet().await?.ok()?;
        self.server_status = ok.status;

        Ok(ok)
    }

    /// Read the EOF packet terminating a column-definition list, unless the
    /// server negotiated `DEPRECATE_EOF` (in which case there is none).
    pub(crate) async fn maybe_recv_eof(&mut self) -> Result<Option<EofPacket>> {
        if self.capabilities.contains(Capabilities::DEPRECATE_EOF) {
            return Ok(None);
        }

        let eof = self.recv_packet().await?.eof(self.capabilities)?;
        self.server_status = eof.status;

        Ok(Some(eof))
    }

    /// Flush pending writes and consume any response the connection walked
    /// away from, until the protocol is back at a command boundary.
    pub(crate) async fn wait_until_ready(&mut self) -> Result<()> {
        if self.stream.is_write_buffered() {
            self.flush().await?;
        }

        while self.busy != Busy::NotBusy {
            while self.busy == Busy::Row {
                let packet = self.recv_packet().await?;

                if packet[0] == 0xfe && packet.len() < 9 {
                    let eof = packet.eof(self.capabilities)?;
                    self.server_status = eof.status;

                    self.busy = if eof.status.contains(Status::SERVER_MORE_RESULTS_EXISTS) {
                        Busy::Result
                    } else {
                        Busy::NotBusy
                    };
                }
            }

            while self.busy == Busy::Result {
                let packet = self.recv_packet().await?;

                if packet[0] == 0x00 {
                    let ok = packet.ok()?;
                    self.server_status = ok.status;

                    if !ok.status.contains(Status::SERVER_MORE_RESULTS_EXISTS) {
                        self.busy = Busy::NotBusy;
                    }
                } else {
                    // a result-set header; skip its column definitions and
                    // fall into the row loop above
                    self.busy = Busy::Row;

                    let mut bytes = packet.into_bytes();
                    let columns = bytes.get_uint_lenenc()?;

                    for _ in 0..columns {
                        let _ = self.recv_packet().await?;
                    }

                    self.maybe_recv_eof().await?;
                }
            }
        }

        Ok(())
    }
}
