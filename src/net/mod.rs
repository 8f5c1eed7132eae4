mod socket;
mod tls;

pub(crate) use socket::connect_tcp;
pub(crate) use tls::MaybeTlsStream;

#[cfg(feature = "tls")]
pub(crate) use tls::configure_tls_connector;
