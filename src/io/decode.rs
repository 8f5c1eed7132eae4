use bytes::Bytes;

use crate::error::Result;

/// A type that can be decoded from a packet payload, given a context.
pub(crate) trait Decode<'de, Context = ()>
where
    Self: Sized,
{
    fn decode(buf: Bytes) -> Result<Self>
    where
        Self: Decode<'de, ()>,
    {
        Self::decode_with(buf, ())
    }

    fn decode_with(buf: Bytes, context: Context) -> Result<Self>;
}

impl Decode<'_> for Bytes {
    fn decode_with(buf: Bytes, _: ()) -> Result<Self> {
        Ok(buf)
    }
}
