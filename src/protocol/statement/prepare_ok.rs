use bytes::{Buf, Bytes};

use crate::error::{err_protocol, Result};
use crate::io::Decode;

/// The leading packet of a successful `COM_STMT_PREPARE` response. Followed
/// by `params` parameter definitions and `columns` column definitions, each
/// group EOF-terminated on pre-`DEPRECATE_EOF` servers.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_stmt_prepare.html#sect_protocol_com_stmt_prepare_response_ok>
#[derive(Debug)]
pub(crate) struct ComStmtPrepareOk {
    pub(crate) statement_id: u32,
    pub(crate) columns: u16,
    pub(crate) params: u16,
    pub(crate) warnings: u16,
}

impl Decode<'_> for ComStmtPrepareOk {
    fn decode_with(mut buf: Bytes, _: ()) -> Result<Self> {
        let header = buf.get_u8();
        if header != 0x00 {
            return Err(err_protocol!(
                "expected 0x00 (COM_STMT_PREPARE_OK) but found 0x{:02X}",
                header
            ));
        }

        let statement_id = buf.get_u32_le();
        let columns = buf.get_u16_le();
        let params = buf.get_u16_le();

        // reserved filler : int<1>
        buf.advance(1);

        let warnings = buf.get_u16_le();

        Ok(Self {
            statement_id,
            columns,
            params,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::ComStmtPrepareOk;
    use crate::io::Decode;
    use bytes::Bytes;

    #[test]
    fn it_decodes_prepare_ok() {
        let p = ComStmtPrepareOk::decode(Bytes::from_static(
            b"\x00\x01\x00\x00\x00\x01\x00\x02\x00\x00\x00\x00",
        ))
        .unwrap();

        assert_eq!(p.statement_id, 1);
        assert_eq!(p.columns, 1);
        assert_eq!(p.params, 2);
        assert_eq!(p.warnings, 0);
    }
}
