use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// An authentication plugin advertised by the server.
///
/// Plugins we do not know produce an empty authentication response; the
/// server then answers with an Auth-Switch-Request naming something we
/// hopefully do know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AuthPlugin {
    MySqlNativePassword,
    CachingSha2Password,
    Sha256Password,
    Unknown(Box<str>),
}

impl AuthPlugin {
    pub(crate) fn name(&self) -> &str {
        match self {
            AuthPlugin::MySqlNativePassword => "mysql_native_password",
            AuthPlugin::CachingSha2Password => "caching_sha2_password",
            AuthPlugin::Sha256Password => "sha256_password",
            AuthPlugin::Unknown(name) => name,
        }
    }

    /// Derive the auth response sent in the handshake response (or after an
    /// auth switch) from the password and the server scramble.
    pub(crate) fn scramble(&self, password: &str, nonce: &[u8]) -> Vec<u8> {
        if password.is_empty() {
            return Vec::new();
        }

        match self {
            AuthPlugin::MySqlNativePassword => {
                // the nonce for mysql_native_password is (optionally) NUL-terminated
                let end = memchr::memchr(b'\0', nonce).unwrap_or(nonce.len());

                scramble_sha1(password, &nonce[..end])
            }

            // sha256_password uses the same initial scramble as
            // caching_sha2_password; the difference is in the exchange that
            // follows, not in this derivation
            AuthPlugin::CachingSha2Password | AuthPlugin::Sha256Password => {
                scramble_sha256(password, nonce)
            }

            AuthPlugin::Unknown(_) => Vec::new(),
        }
    }
}

impl From<&str> for AuthPlugin {
    fn from(name: &str) -> Self {
        match name {
            "mysql_native_password" => AuthPlugin::MySqlNativePassword,
            "caching_sha2_password" => AuthPlugin::CachingSha2Password,
            "sha256_password" => AuthPlugin::Sha256Password,

            _ => AuthPlugin::Unknown(name.into()),
        }
    }
}

// SHA1( password ) ^ SHA1( seed + SHA1( SHA1( password ) ) )
// https://mariadb.com/kb/en/connection/#mysql_native_password-plugin
fn scramble_sha1(password: &str, seed: &[u8]) -> Vec<u8> {
    let mut ctx = Sha1::new();

    ctx.update(password);

    let mut pw_hash = ctx.finalize_reset();

    ctx.update(&pw_hash);

    let pw_hash_hash = ctx.finalize_reset();

    ctx.update(seed);
    ctx.update(&pw_hash_hash);

    let pw_seed_hash_hash = ctx.finalize();

    xor_eq(&mut pw_hash, &pw_seed_hash_hash);

    pw_hash.to_vec()
}

// SHA256( password ) ^ SHA256( SHA256( SHA256( password ) ) + seed )
// https://dev.mysql.com/doc/dev/mysql-server/8.0.12/page_caching_sha2_authentication_exchanges.html
fn scramble_sha256(password: &str, seed: &[u8]) -> Vec<u8> {
    let mut ctx = Sha256::new();

    ctx.update(password);

    let mut pw_hash = ctx.finalize_reset();

    ctx.update(&pw_hash);

    let pw_hash_hash = ctx.finalize_reset();

    ctx.update(&pw_hash_hash);
    ctx.update(seed);

    let pw_seed_hash_hash = ctx.finalize();

    xor_eq(&mut pw_hash, &pw_seed_hash_hash);

    pw_hash.to_vec()
}

/// Encrypt the password for the `caching_sha2_password` full-auth path when
/// the channel is not TLS: NUL-terminate, XOR with the repeating scramble,
/// then RSA-OAEP(SHA-1) under the server's public key.
pub(crate) fn encrypt_rsa(public_key_pem: &[u8], password: &str, nonce: &[u8]) -> Result<Vec<u8>> {
    let pem = std::str::from_utf8(public_key_pem)
        .map_err(|_| Error::protocol("server RSA public key is not valid UTF-8"))?;

    let key = RsaPublicKey::from_public_key_pem(pem).map_err(Error::protocol)?;

    let mut pass = Vec::with_capacity(password.len() + 1);
    pass.extend_from_slice(password.as_bytes());
    pass.push(0);

    for (i, byte) in pass.iter_mut().enumerate() {
        *byte ^= nonce[i % nonce.len()];
    }

    key.encrypt(&mut rand::thread_rng(), Oaep::new::<Sha1>(), &pass)
        .map_err(Error::protocol)
}

fn xor_eq(dst: &mut [u8], src: &[u8]) {
    debug_assert_eq!(dst.len(), src.len());

    for (l, r) in dst.iter_mut().zip(src) {
        *l ^= r;
    }
}
