use bytes::BufMut;

/// Write primitives of the MySQL wire protocol into an outgoing buffer.
pub(crate) trait BufMutExt {
    fn put_uint_lenenc(&mut self, value: u64);

    fn put_str_nul(&mut self, value: &str);

    fn put_bytes_lenenc(&mut self, value: &[u8]);

    fn put_str_lenenc(&mut self, value: &str);
}

impl BufMutExt for Vec<u8> {
    fn put_uint_lenenc(&mut self, value: u64) {
        if value < 0xfb {
            self.put_u8(value as u8);
        } else if value <= u16::MAX as u64 {
            self.put_u8(0xfc);
            self.put_u16_le(value as u16);
        } else if value <= 0xff_ff_ff {
            self.put_u8(0xfd);
            self.put_uint_le(value, 3);
        } else {
            self.put_u8(0xfe);
            self.put_u64_le(value);
        }
    }

    fn put_str_nul(&mut self, value: &str) {
        self.extend_from_slice(value.as_bytes());
        self.push(0);
    }

    fn put_bytes_lenenc(&mut self, value: &[u8]) {
        self.put_uint_lenenc(value.len() as u64);
        self.extend_from_slice(value);
    }

    fn put_str_lenenc(&mut self, value: &str) {
        self.put_bytes_lenenc(value.as_bytes());
    }
}
