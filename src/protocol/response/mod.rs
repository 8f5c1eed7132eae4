mod eof;
mod err;
mod ok;

pub(crate) use eof::EofPacket;
pub(crate) use err::ErrPacket;
pub(crate) use ok::OkPacket;
