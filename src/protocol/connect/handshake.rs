use bytes::{Buf, Bytes};

use crate::error::Result;
use crate::io::{BufExt, Decode};
use crate::protocol::auth::AuthPlugin;
use crate::protocol::{Capabilities, Status};

/// The initial handshake packet sent by the server, always HandshakeV10 on
/// the servers we support.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_connection_phase_packets_protocol_handshake_v10.html>
/// <https://mariadb.com/kb/en/connection/#initial-handshake-packet>
#[derive(Debug)]
pub(crate) struct Handshake {
    pub(crate) protocol_version: u8,
    pub(crate) server_version: String,
    pub(crate) connection_id: u32,
    pub(crate) server_capabilities: Capabilities,
    pub(crate) server_default_collation: u8,
    pub(crate) status: Status,
    pub(crate) auth_plugin: AuthPlugin,
    pub(crate) auth_plugin_data: Vec<u8>,
}

impl Decode<'_> for Handshake {
    fn decode_with(mut buf: Bytes, _: ()) -> Result<Self> {
        let protocol_version = buf.get_u8(); // int<1>
        let server_version = buf.get_str_nul()?; // string<NUL>
        let connection_id = buf.get_u32_le(); // int<4>

        // the 20-byte scramble arrives in two parts on either side of the
        // fixed fields below
        let mut scramble = Vec::with_capacity(20);

        // scramble first part : string<8>
        scramble.extend_from_slice(&buf.get_bytes(8)?);

        // reserved filler : string<1>
        buf.advance(1);

        // capability_flags_1 : int<2>
        let capabilities_1 = buf.get_u16_le();
        let mut capabilities = Capabilities::from_bits_truncate(capabilities_1.into());

        // character_set : int<1>
        let collation = buf.get_u8();

        // status_flags : int<2>
        let status = Status::from_bits_truncate(buf.get_u16_le());

        // capability_flags_2 : int<2>
        let capabilities_2 = buf.get_u16_le();
        capabilities |= Capabilities::from_bits_truncate(u64::from(capabilities_2) << 16);

        // auth_plugin_data_len : int<1> (0x00 when PLUGIN_AUTH is unset)
        let auth_plugin_data_len = buf.get_u8();

        // reserved : string<6>
        buf.advance(6);

        if capabilities.contains(Capabilities::MYSQL) {
            // reserved : string<4>
            buf.advance(4);
        } else {
            // MariaDB extended capability_flags_3 : int<4>
            let capabilities_3 = buf.get_u32_le();
            capabilities |= Capabilities::from_bits_truncate(u64::from(capabilities_3) << 32);
        }

        if capabilities.contains(Capabilities::SECURE_CONNECTION) {
            // scramble second part : string<n> where n = max(12, data_len - 9)
            let len = ((auth_plugin_data_len as isize) - 9).max(12) as usize;
            scramble.extend_from_slice(&buf.get_bytes(len)?);

            // NUL terminator of the scramble, not part of the value
            buf.advance(1);
        }

        let auth_plugin = if capabilities.contains(Capabilities::PLUGIN_AUTH) {
            AuthPlugin::from(&*buf.get_str_nul()?)
        } else {
            AuthPlugin::MySqlNativePassword
        };

        Ok(Self {
            protocol_version,
            server_version,
            connection_id,
            server_capabilities: capabilities,
            server_default_collation: collation,
            status,
            auth_plugin,
            auth_plugin_data: scramble,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthPlugin, Capabilities, Handshake, Status};
    use crate::io::Decode;
    use bytes::Bytes;

    const HANDSHAKE_MARIA_DB_10_4_7: &[u8] = b"\n5.5.5-10.4.7-MariaDB-1:10.4.7+maria~bionic\x00\x0b\x00\x00\x00t6L\\j\"dS\x00\xfe\xf7\x08\x02\x00\xff\x81\x15\x00\x00\x00\x00\x00\x00\x07\x00\x00\x00U14Oph9\"<H5n\x00mysql_native_password\x00";
    const HANDSHAKE_MYSQL_8_0_18: &[u8] = b"\n8.0.18\x00\x19\x00\x00\x00\x114aB0c\x06g\x00\xff\xff\xff\x02\x00\xff\xc7\x15\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00tL\x03s\x0f[4\rl4. \x00caching_sha2_password\x00";

    #[test]
    fn it_decodes_handshake_mysql_8_0_18() {
        let p = Handshake::decode(Bytes::from_static(HANDSHAKE_MYSQL_8_0_18)).unwrap();

        assert_eq!(p.protocol_version, 10);
        assert_eq!(p.server_version, "8.0.18");
        assert_eq!(p.connection_id, 0x19);
        assert_eq!(p.server_default_collation, 255);

        assert!(p.server_capabilities.contains(
            Capabilities::MYSQL
                | Capabilities::PROTOCOL_41
                | Capabilities::SSL
                | Capabilities::SECURE_CONNECTION
                | Capabilities::PLUGIN_AUTH
                | Capabilities::PLUGIN_AUTH_LENENC_DATA
                | Capabilities::DEPRECATE_EOF
        ));

        assert!(p.status.contains(Status::SERVER_STATUS_AUTOCOMMIT));
        assert_eq!(p.auth_plugin, AuthPlugin::CachingSha2Password);

        assert_eq!(
            &p.auth_plugin_data[..],
            &[17, 52, 97, 66, 48, 99, 6, 103, 116, 76, 3, 115, 15, 91, 52, 13, 108, 52, 46, 32]
        );
    }

    #[test]
    fn it_decodes_handshake_mariadb_10_4_7() {
        let p = Handshake::decode(Bytes::from_static(HANDSHAKE_MARIA_DB_10_4_7)).unwrap();

        assert_eq!(p.protocol_version, 10);
        assert_eq!(&p.server_version, "5.5.5-10.4.7-MariaDB-1:10.4.7+maria~bionic");
        assert_eq!(p.server_default_collation, 8);

        assert!(!p.server_capabilities.contains(Capabilities::MYSQL));
        assert!(p.server_capabilities.contains(
            Capabilities::PROTOCOL_41
                | Capabilities::SECURE_CONNECTION
                | Capabilities::PLUGIN_AUTH
                | Capabilities::DEPRECATE_EOF
        ));

        assert!(p.status.contains(Status::SERVER_STATUS_AUTOCOMMIT));
        assert_eq!(p.auth_plugin, AuthPlugin::MySqlNativePassword);

        assert_eq!(
            &p.auth_plugin_data[..],
            &[
                116, 54, 76, 92, 106, 34, 100, 83, 85, 49, 52, 79, 112, 104, 57, 34, 60, 72, 53,
                110,
            ]
        );
    }
}
