use crate::io::Encode;
use crate::protocol::Capabilities;

/// Tell the server we are hanging up. There is no response; the server
/// closes the socket.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_quit.html>
#[derive(Debug)]
pub(crate) struct ComQuit;

impl Encode<'_, Capabilities> for ComQuit {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.push(0x01); // COM_QUIT
    }
}
