use bytes::BufMut;

use crate::io::{BufMutExt, Encode};
use crate::protocol::auth::AuthPlugin;
use crate::protocol::Capabilities;

/// HandshakeResponse41, sent by the client after the (optional) TLS upgrade.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_connection_phase_packets_protocol_handshake_response.html>
/// <https://mariadb.com/kb/en/connection/#handshake-response-packet>
#[derive(Debug)]
pub(crate) struct HandshakeResponse<'a> {
    pub(crate) max_packet_size: u32,
    pub(crate) collation: u8,
    pub(crate) username: &'a str,
    pub(crate) database: Option<&'a str>,
    pub(crate) auth_plugin: &'a AuthPlugin,
    pub(crate) auth_response: &'a [u8],
}

impl Encode<'_, Capabilities> for HandshakeResponse<'_> {
    fn encode_with(&self, buf: &mut Vec<u8>, capabilities: Capabilities) {
        // client capabilities : int<4>
        buf.put_u32_le(capabilities.bits() as u32);

        // max packet size : int<4>
        buf.put_u32_le(self.max_packet_size);

        // client character collation : int<1>
        buf.put_u8(self.collation);

        // reserved : string<19>
        buf.extend_from_slice(&[0_u8; 19]);

        if capabilities.contains(Capabilities::MYSQL) {
            // reserved : string<4>
            buf.extend_from_slice(&[0_u8; 4]);
        } else {
            // MariaDB extended client capabilities : int<4>
            buf.put_u32_le((capabilities.bits() >> 32) as u32);
        }

        // username : string<NUL>
        buf.put_str_nul(self.username);

        if capabilities.contains(Capabilities::PLUGIN_AUTH_LENENC_DATA) {
            // auth response : string<lenenc>
            buf.put_bytes_lenenc(self.auth_response);
        } else if capabilities.contains(Capabilities::SECURE_CONNECTION) {
            // auth response length : int<1>
            buf.put_u8(self.auth_response.len() as u8);

            // auth response : string<{len}>
            buf.extend_from_slice(self.auth_response);
        } else {
            // no auth response : int<1>
            buf.put_u8(0);
        }

        if capabilities.contains(Capabilities::CONNECT_WITH_DB) {
            if let Some(database) = self.database {
                // database : string<NUL>
                buf.put_str_nul(database);
            }
        }

        if capabilities.contains(Capabilities::PLUGIN_AUTH) {
            // client auth plugin name : string<NUL>
            buf.put_str_nul(self.auth_plugin.name());
        }
    }
}
