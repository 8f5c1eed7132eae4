use bytes::Bytes;

use crate::common::StatementCache;
use crate::connection::{tls, Connection, PacketStream, MAX_PACKET_SIZE};
use crate::error::{err_protocol, Error, Result};
use crate::net::connect_tcp;
use crate::options::ConnectOptions;
use crate::protocol::auth::{self, AuthPlugin};
use crate::protocol::connect::{AuthSwitchRequest, Handshake, HandshakeResponse};
use crate::protocol::{Capabilities, Packet};

impl Connection {
    pub(super) async fn establish(options: &ConnectOptions) -> Result<Self> {
        let mut capabilities = Capabilities::PROTOCOL_41
            | Capabilities::LONG_PASSWORD
            | Capabilities::SECURE_CONNECTION
            | Capabilities::TRANSACTIONS
            | Capabilities::PLUGIN_AUTH
            | Capabilities::MULTI_RESULTS
            | Capabilities::PS_MULTI_RESULTS
            | Capabilities::CONNECT_WITH_DB
            | Capabilities::PLUGIN_AUTH_LENENC_DATA
            | Capabilities::LOCAL_FILES
            | Capabilities::DEPRECATE_EOF;

        if options.multi_statements {
            capabilities |= Capabilities::MULTI_STATEMENTS;
        }

        if options.ssl_mode.is_enabled() {
            capabilities |= Capabilities::SSL;
        }

        let socket = connect_tcp(&options.host, options.port, std::time::Duration::ZERO).await?;
        let mut stream = PacketStream::new(socket, capabilities);

        // https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_protocol_connection_phase.html

        let handshake: Handshake = stream
            .recv_packet()
            .await
            .map_err(connect_err)?
            .decode()?;

        if handshake.protocol_version != 10 {
            return Err(err_protocol!(
                "unsupported protocol version {}",
                handshake.protocol_version
            ));
        }

        if options.compress {
            // negotiating COMPRESS without implementing payload compression
            // would desynchronize the stream, so the flag stays off
            log::debug!("`compress` was requested but payload compression is not implemented; continuing uncompressed");
        }

        // keep only what both sides speak; PROTOCOL_41 is non-negotiable
        stream.capabilities &= handshake.server_capabilities;
        stream.capabilities |= Capabilities::PROTOCOL_41;

        tls::maybe_upgrade(&mut stream, options).await?;

        let mut plugin = handshake.auth_plugin;
        let mut nonce = Bytes::from(handshake.auth_plugin_data);

        let auth_response = plugin.scramble(&options.password, &nonce);

        stream.write_packet(HandshakeResponse {
            max_packet_size: MAX_PACKET_SIZE,
            collation: options.collation_id(),
            username: &options.username,
            database: options.database.as_deref(),
            auth_plugin: &plugin,
            auth_response: &auth_response,
        });

        stream.flush().await?;

        // authentication loop: OK ends it; the server may switch plugins or
        // ask for more data any number of times before that
        loop {
            let packet = stream.recv_packet().await.map_err(auth_err)?;

            match packet[0] {
                0x00 => {
                    let ok = packet.ok()?;
                    stream.server_status = ok.status;
                    break;
                }

                // Auth-Switch-Request: restart with the named plugin and a
                // fresh scramble
                0xfe => {
                    let switch: AuthSwitchRequest = packet.decode()?;

                    plugin = switch.plugin;
                    nonce = switch.data;

                    let response = plugin.scramble(&options.password, &nonce);

                    stream.write_packet(&response[..]);
                    stream.flush().await?;
                }

                // Auth-More-Data: plugin-specific sub-protocol
                0x01 => {
                    handle_auth_more_data(&mut stream, options, &plugin, &nonce, &packet).await?;
                }

                header => {
                    return Err(err_protocol!(
                        "unexpected packet 0x{:02X} during authentication",
                        header
                    ));
                }
            }
        }

        let mut connection = Self {
            stream,
            thread_id: handshake.connection_id,
            server_version: handshake.server_version,
            cache_statement: StatementCache::new(options.effective_cache_size()),
        };

        // the handshake already announced the collation; an explicit
        // SET NAMES is only needed for non-default charsets
        if connection.needs_set_names(options) {
            validate_charset(&options.charset)?;

            connection
                .run_query(&format!("SET NAMES {}", options.charset), None)
                .await?;
        }

        log::debug!(
            "connected to {} {} as thread {}",
            if connection.server_version.contains("MariaDB") {
                "MariaDB"
            } else {
                "MySQL"
            },
            connection.server_version,
            connection.thread_id,
        );

        Ok(connection)
    }

    fn needs_set_names(&self, options: &ConnectOptions) -> bool {
        options.charset != "utf8mb4"
    }
}

/// The `caching_sha2_password` (and `sha256_password`) sub-protocol after
/// the initial scramble was sent.
async fn handle_auth_more_data(
    stream: &mut PacketStream,
    options: &ConnectOptions,
    plugin: &AuthPlugin,
    nonce: &Bytes,
    packet: &Packet,
) -> Result<()> {
    let data = &packet[1..];

    match plugin {
        AuthPlugin::CachingSha2Password | AuthPlugin::Sha256Password => match data.first() {
            // fast auth succeeded; the OK packet follows
            Some(0x03) => Ok(()),

            // full authentication required
            Some(0x04) => {
                if stream.is_tls() {
                    // the channel is encrypted; send the password in the
                    // clear, NUL-terminated
                    let mut cleartext = options.password.as_bytes().to_vec();
                    cleartext.push(0);

                    stream.write_packet(&cleartext[..]);
                    stream.flush().await?;
                } else {
                    // ask for the server's RSA public key
                    stream.write_packet(&[0x02_u8][..]);
                    stream.flush().await?;

                    let packet = stream.recv_packet().await.map_err(auth_err)?;

                    if packet[0] != 0x01 {
                        return Err(err_protocol!(
                            "expected the server RSA public key (0x01), found 0x{:02X}",
                            packet[0]
                        ));
                    }

                    let encrypted = auth::encrypt_rsa(&packet[1..], &options.password, nonce)?;

                    stream.write_packet(&encrypted[..]);
                    stream.flush().await?;
                }

                Ok(())
            }

            // the full PEM public key, unprompted (sha256_password over a
            // trusted channel does this)
            _ if data.len() > 1 => {
                let encrypted = auth::encrypt_rsa(data, &options.password, nonce)?;

                stream.write_packet(&encrypted[..]);
                stream.flush().await?;

                Ok(())
            }

            _ => Err(err_protocol!(
                "unexpected auth-more-data for plugin {}",
                plugin.name()
            )),
        },

        _ => Err(err_protocol!(
            "unexpected auth-more-data for plugin {}",
            plugin.name()
        )),
    }
}

fn validate_charset(charset: &str) -> Result<()> {
    if charset.is_empty()
        || !charset
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(Error::Configuration(
            format!("invalid charset name {:?}", charset).into(),
        ));
    }

    Ok(())
}

/// Server errors before the handshake response map onto connect errors
/// (e.g. 1040 "too many connections").
fn connect_err(err: Error) -> Error {
    match err {
        Error::Server(e) => Error::Connect(e),
        e => e,
    }
}

/// Server errors during the exchange map onto auth errors (1045 access
/// denied, 1133/1862 password expired, ...).
fn auth_err(err: Error) -> Error {
    match err {
        Error::Server(e) => Error::Auth(e),
        e => e,
    }
}
