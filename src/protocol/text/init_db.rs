use crate::io::Encode;
use crate::protocol::Capabilities;

/// Change the default schema of the connection. Answered with OK or ERR.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_com_init_db.html>
#[derive(Debug)]
pub(crate) struct ComInitDb<'a>(pub(crate) &'a str);

impl Encode<'_, Capabilities> for ComInitDb<'_> {
    fn encode_with(&self, buf: &mut Vec<u8>, _: Capabilities) {
        buf.push(0x02); // COM_INIT_DB
        buf.extend_from_slice(self.0.as_bytes());
    }
}
