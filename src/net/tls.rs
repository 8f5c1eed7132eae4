use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::error::Error;

#[cfg(feature = "tls")]
use std::sync::Arc;

#[cfg(feature = "tls")]
use {
    rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    rustls::client::WebPkiServerVerifier,
    rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime},
    rustls::{
        CertificateError, ClientConfig, DigitallySignedStruct, Error as TlsError, RootCertStore,
        SignatureScheme,
    },
    std::path::Path,
};

/// A stream that may or may not have gone through the STARTTLS-style upgrade.
pub(crate) enum MaybeTlsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    Raw(S),

    #[cfg(feature = "tls")]
    Tls(tokio_rustls::client::TlsStream<S>),

    // a transient state while `upgrade` is in flight; observing it outside
    // of `upgrade` means the upgrade future was dropped mid-handshake
    Upgrading,
}

impl<S> MaybeTlsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn is_tls(&self) -> bool {
        #[cfg(feature = "tls")]
        {
            matches!(self, Self::Tls(_))
        }

        #[cfg(not(feature = "tls"))]
        {
            false
        }
    }

    #[cfg(feature = "tls")]
    pub(crate) async fn upgrade(
        &mut self,
        host: &str,
        config: Arc<ClientConfig>,
    ) -> Result<(), Error> {
        let stream = match std::mem::replace(self, MaybeTlsStream::Upgrading) {
            MaybeTlsStream::Raw(stream) => stream,

            MaybeTlsStream::Tls(_) => {
                return Err(Error::Tls("connection has already been upgraded".into()));
            }

            MaybeTlsStream::Upgrading => {
                return Err(Error::Tls(
                    "connection was broken by a previous failed upgrade".into(),
                ));
            }
        };

        let server_name = ServerName::try_from(host.to_owned()).map_err(Error::tls)?;
        let connector = tokio_rustls::TlsConnector::from(config);

        *self = MaybeTlsStream::Tls(
            connector
                .connect(server_name, stream)
                .await
                .map_err(Error::tls)?,
        );

        Ok(())
    }
}

impl<S> AsyncRead for MaybeTlsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Raw(s) => Pin::new(s).poll_read(cx, buf),

            #[cfg(feature = "tls")]
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_read(cx, buf),

            MaybeTlsStream::Upgrading => Poll::Ready(Err(broken())),
        }
    }
}

impl<S> AsyncWrite for MaybeTlsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            MaybeTlsStream::Raw(s) => Pin::new(s).poll_write(cx, buf),

            #[cfg(feature = "tls")]
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_write(cx, buf),

            MaybeTlsStream::Upgrading => Poll::Ready(Err(broken())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Raw(s) => Pin::new(s).poll_flush(cx),

            #[cfg(feature = "tls")]
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_flush(cx),

            MaybeTlsStream::Upgrading => Poll::Ready(Err(broken())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeTlsStream::Raw(s) => Pin::new(s).poll_shutdown(cx),

            #[cfg(feature = "tls")]
            MaybeTlsStream::Tls(s) => Pin::new(s).poll_shutdown(cx),

            MaybeTlsStream::Upgrading => Poll::Ready(Err(broken())),
        }
    }
}

fn broken() -> io::Error {
    io::Error::new(
        io::ErrorKind::ConnectionAborted,
        "TLS upgrade was interrupted",
    )
}

/// Build a rustls client configuration from the connection options.
///
/// `accept_invalid_certs` replaces certificate verification entirely;
/// `accept_invalid_hostnames` keeps chain verification but ignores the
/// name mismatch error. Both are plumbing for `ssl-verify`/`ssl-mode`.
#[cfg(feature = "tls")]
pub(crate) async fn configure_tls_connector(
    accept_invalid_certs: bool,
    accept_invalid_hostnames: bool,
    root_cert_path: Option<&Path>,
    client_cert_path: Option<&Path>,
    client_key_path: Option<&Path>,
) -> Result<Arc<ClientConfig>, Error> {
    let builder = ClientConfig::builder();

    let builder = if accept_invalid_certs {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DummyTlsVerifier))
    } else {
        let mut cert_store = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect(),
        };

        if let Some(ca) = root_cert_path {
            let data = tokio::fs::read(ca).await?;
            let mut cursor = std::io::Cursor::new(data);

            for cert in rustls_pemfile::certs(&mut cursor) {
                cert_store
                    .add(cert.map_err(Error::tls)?)
                    .map_err(Error::tls)?;
            }
        }

        if accept_invalid_hostnames {
            let verifier = WebPkiServerVerifier::builder(Arc::new(cert_store))
                .build()
                .map_err(Error::tls)?;

            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoHostnameTlsVerifier { verifier }))
        } else {
            builder.with_root_certificates(cert_store)
        }
    };

    let config = match (client_cert_path, client_key_path) {
        (Some(cert), Some(key)) => {
            let cert_chain = {
                let data = tokio::fs::read(cert).await?;
                let mut cursor = std::io::Cursor::new(data);

                rustls_pemfile::certs(&mut cursor)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(Error::tls)?
            };

            let key = {
                let data = tokio::fs::read(key).await?;
                let mut cursor = std::io::Cursor::new(data);

                rustls_pemfile::private_key(&mut cursor)
                    .map_err(Error::tls)?
                    .ok_or_else(|| Error::Tls("no private key found in ssl-key file".into()))?
            };

            builder
                .with_client_auth_cert(cert_chain, key)
                .map_err(Error::tls)?
        }

        (None, None) => builder.with_no_client_auth(),

        _ => {
            return Err(Error::Configuration(
                "ssl-cert and ssl-key must be provided together".into(),
            ));
        }
    };

    Ok(Arc::new(config))
}

#[cfg(feature = "tls")]
#[derive(Debug)]
struct DummyTlsVerifier;

#[cfg(feature = "tls")]
impl ServerCertVerifier for DummyTlsVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA1,
            SignatureScheme::ECDSA_SHA1_Legacy,
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
            SignatureScheme::ED448,
        ]
    }
}

/// A verifier that delegates to the stock WebPKI verifier but tolerates a
/// hostname mismatch.
#[cfg(feature = "tls")]
#[derive(Debug)]
struct NoHostnameTlsVerifier {
    verifier: Arc<WebPkiServerVerifier>,
}

#[cfg(feature = "tls")]
impl ServerCertVerifier for NoHostnameTlsVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        match self.verifier.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Err(TlsError::InvalidCertificate(CertificateError::NotValidForName)) => {
                Ok(ServerCertVerified::assertion())
            }
            result => result,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        self.verifier.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        self.verifier.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.verifier.supported_verify_schemes()
    }
}
