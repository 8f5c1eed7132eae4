use bytes::{Buf, Bytes};

use crate::error::{err_protocol, Error, Result};

/// Read primitives of the MySQL wire protocol from a packet payload.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_basic_dt_integers.html>
pub(crate) trait BufExt {
    /// Advance past and return the next `n` bytes.
    fn get_bytes(&mut self, n: usize) -> Result<Bytes>;

    /// Advance past and return the next `n` bytes as a UTF-8 string.
    fn get_str(&mut self, n: usize) -> Result<String>;

    /// Read a NUL-terminated string; the terminator is consumed but excluded
    /// from the value.
    fn get_str_nul(&mut self) -> Result<String>;

    /// Read a length-encoded integer.
    ///
    /// The first byte identifies the width: `< 0xFB` is the literal value,
    /// `0xFC` a 2-byte, `0xFD` a 3-byte and `0xFE` an 8-byte little-endian
    /// integer. `0xFB` (NULL) and `0xFF` (ERR) never start a valid length;
    /// callers that may see them check the first byte before calling this.
    fn get_uint_lenenc(&mut self) -> Result<u64>;

    /// Read a length-encoded string.
    fn get_str_lenenc(&mut self) -> Result<String>;

    /// Read a length-encoded byte sequence.
    fn get_bytes_lenenc(&mut self) -> Result<Bytes>;
}

impl BufExt for Bytes {
    fn get_bytes(&mut self, n: usize) -> Result<Bytes> {
        checked(self, n)?;

        Ok(self.split_to(n))
    }

    fn get_str(&mut self, n: usize) -> Result<String> {
        let bytes = self.get_bytes(n)?;

        String::from_utf8(bytes.to_vec()).map_err(Error::decode)
    }

    fn get_str_nul(&mut self) -> Result<String> {
        let nul = memchr::memchr(b'\0', self)
            .ok_or_else(|| err_protocol!("expected NUL-terminated string in packet"))?;

        let value = self.get_str(nul)?;

        // skip the terminator itself
        self.advance(1);

        Ok(value)
    }

    fn get_uint_lenenc(&mut self) -> Result<u64> {
        checked(self, 1)?;

        Ok(match self.get_u8() {
            0xfc => {
                checked(self, 2)?;
                u64::from(self.get_u16_le())
            }

            0xfd => {
                checked(self, 3)?;
                self.get_uint_le(3)
            }

            0xfe => {
                checked(self, 8)?;
                self.get_u64_le()
            }

            value @ (0xfb | 0xff) => {
                return Err(err_protocol!(
                    "0x{:02X} is not a valid length-encoded integer prefix",
                    value
                ));
            }

            // a single-byte literal
            value => u64::from(value),
        })
    }

    fn get_str_lenenc(&mut self) -> Result<String> {
        let len = self.get_uint_lenenc()?;

        self.get_str(len as usize)
    }

    fn get_bytes_lenenc(&mut self) -> Result<Bytes> {
        let len = self.get_uint_lenenc()?;

        self.get_bytes(len as usize)
    }
}

fn checked(buf: &Bytes, n: usize) -> Result<()> {
    if buf.remaining() < n {
        return Err(err_protocol!(
            "unexpected end of packet; wanted {} byte(s), {} remain",
            n,
            buf.remaining()
        ));
    }

    Ok(())
}
