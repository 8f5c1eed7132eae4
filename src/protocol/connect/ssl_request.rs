use bytes::BufMut;

use crate::io::Encode;
use crate::protocol::Capabilities;

/// The abbreviated handshake response that requests a TLS upgrade. It shares
/// the fixed 32-byte prefix of [`HandshakeResponse`][super::HandshakeResponse];
/// the full response follows over the encrypted stream, on the same sequence
/// counter.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_connection_phase_packets_protocol_ssl_request.html>
#[derive(Debug)]
pub(crate) struct SslRequest {
    pub(crate) max_packet_size: u32,
    pub(crate) collation: u8,
}

impl Encode<'_, Capabilities> for SslRequest {
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
    }
}
