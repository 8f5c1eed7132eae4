use crate::io::Encode;
use crate::protocol::Capabilities;

/// Reset the session: user variables, temporary tables and prepared
/// statements are discarded server-side. Answered with OK or ERR.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_reset_connection.html>
#[derive(Debug)]
pub(crate) struct ComResetConnection;

impl Encode<'_, Capabilities> for ComResetConnection {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.push(0x1f); // COM_RESET_CONNECTION
    }
}
