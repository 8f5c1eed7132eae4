use bytes::BufMut;

use crate::io::Encode;
use crate::protocol::Capabilities;

/// Deallocate a server-side prepared statement. The server sends no
/// response.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_stmt_close.html>
#[derive(Debug)]
pub(crate) struct ComStmtClose {
    pub(crate) statement_id: u32,
}

impl Encode<'_, Capabilities> for ComStmtClose {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.push(0x19); // COM_STMT_CLOSE
        buf.put_u32_le(self.statement_id);
    }
}
