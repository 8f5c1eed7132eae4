use crate::io::Encode;
use crate::protocol::Capabilities;

/// Create a server-side prepared statement from a SQL string.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_stmt_prepare.html>
#[derive(Debug)]
pub(crate) struct ComStmtPrepare<'a>(pub(crate) &'a str);

impl Encode<'_, Capabilities> for ComStmtPrepare<'_> {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.push(0x16); // COM_STMT_PREPARE
        buf.extend_from_slice(self.0.as_bytes());
    }
}
