use std::ops::Deref;

use bytes::Bytes;

use crate::error::Result;

mod capabilities;
mod status;

pub(crate) mod auth;
pub(crate) mod connect;
pub(crate) mod response;
pub(crate) mod statement;
pub(crate) mod text;

pub(crate) use capabilities::Capabilities;
pub(crate) use status::Status;

use crate::io::Decode;
use response::{EofPacket, OkPacket};

/// One complete packet payload, reassembled across any 16 MiB splits.
#[derive(Debug)]
pub(crate) struct Packet(pub(crate) Bytes);

impl Packet {
    pub(crate) fn ok(self) -> Result<OkPacket> {
        OkPacket::decode(self.0)
    }

    pub(crate) fn eof(self, capabilities: Capabilities) -> Result<EofPacket> {
        if capabilities.contains(Capabilities::DEPRECATE_EOF) {
            // the server will still send 0xFE markers at result-set
            // boundaries, but their payload is an OK packet
            let ok = OkPacket::decode(self.0)?;

            Ok(EofPacket {
                warnings: ok.warnings,
                status: ok.status,
            })
        } else {
            EofPacket::decode(self.0)
        }
    }

    pub(crate) fn decode<'de, T>(self) -> Result<T>
    where
        T: Decode<'de, ()>,
    {
        self.decode_with(())
    }

    pub(crate) fn decode_with<'de, T, C>(self, context: C) -> Result<T>
    where
        T: Decode<'de, C>,
    {
        T::decode_with(self.0, context)
    }

    pub(crate) fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl Deref for Packet {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}
