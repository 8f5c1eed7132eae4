use bytes::{Buf, Bytes};

use crate::error::{err_protocol, Result};
use crate::io::Decode;
use crate::protocol::Status;

/// Marks the end of a column-definition list or a row stream when the server
/// did not negotiate `DEPRECATE_EOF`. Distinguished from a row by its header
/// byte (`0xFE`) and a payload shorter than 9 bytes.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_basic_eof_packet.html>
#[derive(Debug)]
pub(crate) struct EofPacket {
    pub(crate) warnings: u16,
    pub(crate) status: Status,
}

impl Decode<'_> for EofPacket {
    fn decode_with(mut buf: Bytes, _: ()) -> Result<Self> {
        let header = buf.get_u8();
        if header != 0xfe {
            return Err(err_protocol!(
                "expected 0xFE (EOF) but found 0x{:02X}",
                header
            ));
        }

        let warnings = buf.get_u16_le();
        let status = Status::from_bits_truncate(buf.get_u16_le());

        Ok(Self { warnings, status })
    }
}
