mod buf;
mod buf_mut;
mod buf_stream;
mod decode;
mod encode;

pub(crate) use buf::BufExt;
pub(crate) use buf_mut::BufMutExt;
pub(crate) use buf_stream::BufStream;
pub(crate) use decode::Decode;
pub(crate) use encode::Encode;
