use crate::io::Encode;
use crate::protocol::Capabilities;

/// Execute a SQL statement over the text protocol.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_query.html>
#[derive(Debug)]
pub(crate) struct ComQuery<'a>(pub(crate) &'a str);

impl Encode<'_, Capabilities> for ComQuery<'_> {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.push(0x03); // COM_QUERY
        buf.extend_from_slice(self.0.as_bytes());
    }
}
