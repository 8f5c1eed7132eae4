use bytes::{Buf, Bytes};

use crate::error::{err_protocol, Result};
use crate::io::{BufExt, Decode};
use crate::protocol::auth::AuthPlugin;

/// Sent by the server when it wants the client to restart authentication
/// with a different plugin and a fresh scramble.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_connection_phase_packets_protocol_auth_switch_request.html>
#[derive(Debug)]
pub(crate) struct AuthSwitchRequest {
    pub(crate) plugin: AuthPlugin,
    pub(crate) data: Bytes,
}

impl Decode<'_> for AuthSwitchRequest {
    fn decode_with(mut buf: Bytes, _: ()) -> Result<Self> {
        let header = buf.get_u8();
        if header != 0xfe {
            return Err(err_protocol!(
                "expected 0xFE (AUTH_SWITCH) but found 0x{:02X}",
                header
            ));
        }

        let plugin = AuthPlugin::from(&*buf.get_str_nul()?);

        // the fresh scramble is usually sent NUL-terminated; the terminator
        // is not part of the nonce
        let mut data = buf;
        if data.last() == Some(&0) {
            data.truncate(data.len() - 1);
        }

        Ok(Self { plugin, data })
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthPlugin, AuthSwitchRequest};
    use crate::io::Decode;
    use bytes::Bytes;

    #[test]
    fn it_decodes_auth_switch() {
        let mut payload = vec![0xfe_u8];
        payload.extend_from_slice(b"caching_sha2_password\x00");
        payload.extend_from_slice(b"abcdefghijklmnopqrst\x00");

        let p = AuthSwitchRequest::decode(Bytes::from(payload)).unwrap();

        assert_eq!(p.plugin, AuthPlugin::CachingSha2Password);
        assert_eq!(&p.data[..], b"abcdefghijklmnopqrst");
    }
}
