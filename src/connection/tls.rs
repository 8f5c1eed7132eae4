use crate::connection::{PacketStream, MAX_PACKET_SIZE};
use crate::error::{Error, Result};
use crate::options::ConnectOptions;
use crate::protocol::Capabilities;

/// Upgrade the stream to TLS if the options ask for it and the server
/// supports it. Runs between the server handshake and our handshake
/// response; the sequence counter continues across the upgrade.
pub(super) async fn maybe_upgrade(
    stream: &mut PacketStream,
    options: &ConnectOptions,
) -> Result<()> {
    if !options.ssl_mode.is_enabled() {
        return Ok(());
    }

    // after intersecting with the server mask, SSL still being set means
    // the server advertised it
    if !stream.capabilities.contains(Capabilities::SSL) {
        if options.ssl_mode.is_required() {
            return Err(Error::Tls("server does not support TLS".into()));
        }

        return Ok(());
    }

    upgrade(stream, options).await
}

#[cfg(feature = "tls")]
async fn upgrade(stream: &mut PacketStream, options: &ConnectOptions) -> Result<()> {
    use crate::net::configure_tls_connector;
    use crate::protocol::connect::SslRequest;

    let config = configure_tls_connector(
        options.ssl_mode.accept_invalid_certs(),
        options.ssl_mode.accept_invalid_hostnames(),
        options.ssl_ca.as_deref(),
        options.ssl_cert.as_deref(),
        options.ssl_key.as_deref(),
    )
    .await?;

    stream.write_packet(SslRequest {
        max_packet_size: MAX_PACKET_SIZE,
        collation: options.collation_id(),
    });

    stream.flush().await?;

    stream.upgrade_tls(&options.host, config).await
}

#[cfg(not(feature = "tls"))]
async fn upgrade(stream: &mut PacketStream, options: &ConnectOptions) -> Result<()> {
    if options.ssl_mode.is_required() {
        return Err(Error::Tls(
            "TLS is required but support was not compiled in (enable the `tls` feature)".into(),
        ));
    }

    // downgrade gracefully; the handshake response must not claim SSL
    stream.capabilities.remove(Capabilities::SSL);

    Ok(())
}
