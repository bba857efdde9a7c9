//! Self-verifying bearer tokens.
//!
//! A token is `base64url(nonce || expiry || tag)`: 16 random bytes, the
//! expiry as big-endian unix milliseconds, and an HMAC-SHA256 tag over the
//! first two parts keyed by the server secret. Verification is purely
//! cryptographic; the session store is consulted separately so revocation
//! still works while a token would otherwise verify.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 16;
const EXPIRY_LEN: usize = 8;
const TAG_LEN: usize = 32;

/// Stateless token codec. All operations are synchronous and CPU-bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCodec;

impl TokenCodec {
    /// Generate an unguessable, cookie-safe token that embeds its own
    /// expiry and a verification tag derived from `secret`.
    pub fn generate(&self, secret: &str, ttl: Duration) -> String {
        let mut payload = [0u8; NONCE_LEN + EXPIRY_LEN];
        rand::thread_rng().fill_bytes(&mut payload[..NONCE_LEN]);

        let expires_at = Utc::now() + ttl;
        payload[NONCE_LEN..].copy_from_slice(&expires_at.timestamp_millis().to_be_bytes());

        let tag = tag(secret, &payload);

        let mut raw = Vec::with_capacity(NONCE_LEN + EXPIRY_LEN + TAG_LEN);
        raw.extend_from_slice(&payload);
        raw.extend_from_slice(&tag);
        URL_SAFE_NO_PAD.encode(raw)
    }

    /// True only when the tag matches under `secret` and the embedded
    /// expiry has not passed. Malformed input is a plain `false`; callers
    /// never learn why a token was rejected.
    pub fn verify(&self, token: &str, secret: &str) -> bool {
        let raw = match URL_SAFE_NO_PAD.decode(token.as_bytes()) {
            Ok(raw) => raw,
            Err(_) => return false,
        };

        if raw.len() != NONCE_LEN + EXPIRY_LEN + TAG_LEN {
            return false;
        }

        let (payload, presented_tag) = raw.split_at(NONCE_LEN + EXPIRY_LEN);
        let expected = tag(secret, payload);
        if !bool::from(expected.as_slice().ct_eq(presented_tag)) {
            return false;
        }

        let mut expiry_bytes = [0u8; EXPIRY_LEN];
        expiry_bytes.copy_from_slice(&payload[NONCE_LEN..]);
        i64::from_be_bytes(expiry_bytes) > Utc::now().timestamp_millis()
    }
}

fn tag(secret: &str, payload: &[u8]) -> [u8; TAG_LEN] {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    mac.finalize().into_bytes().into()
}

/// Deterministic one-way digest of a raw token; this is the only form a
/// token takes inside the session store.
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn fresh_token_verifies() {
        let codec = TokenCodec;
        let token = codec.generate(SECRET, Duration::minutes(5));
        assert!(codec.verify(&token, SECRET));
    }

    #[test]
    fn expired_token_is_rejected() {
        let codec = TokenCodec;
        let token = codec.generate(SECRET, Duration::milliseconds(-1));
        assert!(!codec.verify(&token, SECRET));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let codec = TokenCodec;
        let token = codec.generate(SECRET, Duration::minutes(5));
        assert!(!codec.verify(&token, "another-secret-another-secret-xx"));
    }

    #[test]
    fn any_single_character_mutation_is_rejected() {
        let codec = TokenCodec;
        let token = codec.generate(SECRET, Duration::minutes(5));

        for index in 0..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[index] = if bytes[index] == b'A' { b'B' } else { b'A' };
            let mutated = String::from_utf8(bytes).unwrap();
            if mutated == token {
                continue;
            }
            assert!(!codec.verify(&mutated, SECRET), "mutation at {} verified", index);
        }
    }

    #[test]
    fn garbage_input_is_rejected() {
        let codec = TokenCodec;
        assert!(!codec.verify("", SECRET));
        assert!(!codec.verify("not base64!!!", SECRET));
        assert!(!codec.verify(&URL_SAFE_NO_PAD.encode([0u8; 4]), SECRET));
    }

    #[test]
    fn token_hash_is_stable_and_hex() {
        let first = hash_token("token-a");
        let second = hash_token("token-a");
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert_ne!(first, hash_token("token-b"));
    }
}
