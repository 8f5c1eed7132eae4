use std::str::FromStr;

use crate::error::Error;

/// How (and whether) to negotiate TLS with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslMode {
    /// Never attempt TLS, even when the server supports it.
    Disabled,

    /// Upgrade to TLS when the server supports it, without certificate
    /// verification; fall back to cleartext otherwise.
    Preferred,

    /// Require TLS, without certificate verification.
    Required,

    /// Require TLS and verify the certificate chain, but tolerate a
    /// hostname mismatch.
    VerifyCa,

    /// Require TLS with full certificate and hostname verification.
    VerifyIdentity,
}

impl Default for SslMode {
    fn default() -> Self {
        SslMode::Preferred
    }
}

impl SslMode {
    pub(crate) fn is_enabled(&self) -> bool {
        !matches!(self, SslMode::Disabled)
    }

    pub(crate) fn is_required(&self) -> bool {
        matches!(
            self,
            SslMode::Required | SslMode::VerifyCa | SslMode::VerifyIdentity
        )
    }

    pub(crate) fn accept_invalid_certs(&self) -> bool {
        matches!(self, SslMode::Preferred | SslMode::Required)
    }

    pub(crate) fn accept_invalid_hostnames(&self) -> bool {
        matches!(self, SslMode::VerifyCa)
    }
}

impl FromStr for SslMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        Ok(match &*s.to_ascii_lowercase() {
            "disabled" => SslMode::Disabled,
            "preferred" => SslMode::Preferred,
            "required" => SslMode::Required,
            "verify_ca" | "verify-ca" => SslMode::VerifyCa,
            "verify_identity" | "verify-identity" => SslMode::VerifyIdentity,

            _ => {
                return Err(Error::Configuration(
                    format!("unknown value {:?} for `ssl-mode`", s).into(),
                ));
            }
        })
    }
}
