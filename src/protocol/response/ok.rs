use bytes::{Buf, Bytes};

use crate::error::{err_protocol, Result};
use crate::io::{BufExt, Decode};
use crate::protocol::Status;

/// Signals successful completion of a command.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_basic_ok_packet.html>
#[derive(Debug)]
pub(crate) struct OkPacket {
    pub(crate) affected_rows: u64,
    pub(crate) last_insert_id: u64,
    pub(crate) status: Status,
    pub(crate) warnings: u16,
}

impl Decode<'_> for OkPacket {
    fn decode_with(mut buf: Bytes, _: ()) -> Result<Self> {
        let header = buf.get_u8();
        if header != 0 && header != 0xfe {
            return Err(err_protocol!(
                "expected 0x00 or 0xFE (OK) but found 0x{:02X}",
                header
            ));
        }

        let affected_rows = buf.get_uint_lenenc()?;
        let last_insert_id = buf.get_uint_lenenc()?;
        let status = Status::from_bits_truncate(buf.get_u16_le());
        let warnings = buf.get_u16_le();

        // the remainder is a human-readable status message plus optional
        // session-state tracking, neither of which we surface

        Ok(Self {
            affected_rows,
            last_insert_id,
            status,
            warnings,
        })
    }
}
