use bytes::{Buf, Bytes};

use crate::error::{err_protocol, Result, ServerError};
use crate::io::{BufExt, Decode};
use crate::protocol::Capabilities;

/// Signals that an error occurred.
///
/// The SQLSTATE is only present after the protocol-41 handshake completed;
/// an early failure (e.g. the server is over `max_connections`) omits it.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_basic_err_packet.html>
#[derive(Debug)]
pub(crate) struct ErrPacket {
    pub(crate) error_code: u16,
    pub(crate) sql_state: String,
    pub(crate) error_message: String,
}

impl Decode<'_, Capabilities> for ErrPacket {
    fn decode_with(mut buf: Bytes, capabilities: Capabilities) -> Result<Self> {
        let header = buf.get_u8();
        if header != 0xff {
            return Err(err_protocol!(
                "expected 0xFF (ERR) but found 0x{:02X}",
                header
            ));
        }

        let error_code = buf.get_u16_le();
        let mut sql_state = String::new();

        if capabilities.contains(Capabilities::PROTOCOL_41) && buf.first() == Some(&b'#') {
            buf.advance(1);
            sql_state = buf.get_str(5)?;
        }

        let error_message = buf.get_str(buf.len())?;

        Ok(Self {
            error_code,
            sql_state,
            error_message,
        })
    }
}

impl From<ErrPacket> for ServerError {
    fn from(packet: ErrPacket) -> Self {
        ServerError::new(packet.error_code, packet.sql_state, packet.error_message)
    }
}
