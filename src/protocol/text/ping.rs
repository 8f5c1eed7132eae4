use crate::io::Encode;
use crate::protocol::Capabilities;

/// Check if the server is alive; answered with OK.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_ping.html>
#[derive(Debug)]
pub(crate) struct ComPing;

impl Encode<'_, Capabilities> for ComPing {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.push(0x0e); // COM_PING
    }
}
