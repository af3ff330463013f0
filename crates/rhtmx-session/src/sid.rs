//! Session id generation

use crate::config::HashFunc;
use crate::error::{Result, SessionError};
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use sha1::Sha1;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha1 = Hmac<Sha1>;

const RANDOM_BYTES: usize = 24;

/// Generate a session id from the client address, the current time and
/// random bytes, hashed with `func`.
///
/// Md5 is a plain digest; Sha1 is HMAC-SHA1 keyed with `key`.
/// The id is lowercase hex.
pub fn generate(func: HashFunc, key: &str, remote_addr: Option<SocketAddr>) -> Result<String> {
    let mut random = [0u8; RANDOM_BYTES];
    rand::thread_rng()
        .try_fill_bytes(&mut random)
        .map_err(|e| SessionError::Crypto(e.to_string()))?;

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();

    let mut signature = Vec::with_capacity(64);
    if let Some(addr) = remote_addr {
        signature.extend_from_slice(addr.to_string().as_bytes());
    }
    signature.extend_from_slice(nanos.to_string().as_bytes());
    signature.extend_from_slice(&random);

    let digest = match func {
        HashFunc::Md5 => Md5::digest(&signature).to_vec(),
        HashFunc::Sha1 => {
            let mut mac = HmacSha1::new_from_slice(key.as_bytes())
                .map_err(|e| SessionError::Crypto(e.to_string()))?;
            mac.update(&signature);
            mac.finalize().into_bytes().to_vec()
        }
    };

    Ok(hex::encode(digest))
}

/// Random alphanumeric key used when no hash key is configured
pub fn random_key(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
