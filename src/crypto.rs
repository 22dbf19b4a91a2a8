//! Token generation, hashing, and PKCE verification for the OAuth core.
//!
//! Every credential this crate hands out (client id, client secret,
//! access token, refresh token) is a random byte string, base64url
//! encoded without padding, and prefixed with a kind tag so consumers
//! can route on it without a lookup. Only the SHA-256 hash is ever
//! persisted.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Token kind prefixes. Consumers detect credential kind by prefix.
pub const CLIENT_ID_PREFIX: &str = "bow_client_";
pub const CLIENT_SECRET_PREFIX: &str = "bow_secret_";
pub const ACCESS_TOKEN_PREFIX: &str = "bow_oauth_";
pub const REFRESH_TOKEN_PREFIX: &str = "bow_rt_";

/// Draws 32 bytes from the OS CSPRNG, base64url-encodes without padding,
/// and prefixes with `prefix`. Returns `(plaintext, sha256_hex_hash)`.
pub fn generate_token(prefix: &str) -> (String, String) {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let plaintext = format!("{prefix}{}", URL_SAFE_NO_PAD.encode(bytes));
    let hash = hash(&plaintext);
    (plaintext, hash)
}

/// Lowercase hex SHA-256 of the UTF-8 bytes of `value`.
pub fn hash(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time equality over two hex digests, to avoid a timing
/// oracle on secret/token-hash comparisons performed in application code
/// (lookups keyed by the hash itself are already constant-time at the
/// database layer).
pub fn hashes_equal(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Computes the PKCE S256 challenge for a verifier: base64url(SHA-256(verifier)), no padding.
pub fn pkce_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Verifies a PKCE S256 `code_verifier` against a stored `code_challenge`.
/// Rejects empty inputs; compares in constant time.
pub fn verify_pkce_s256(code_verifier: &str, code_challenge: &str) -> bool {
    if code_verifier.is_empty() || code_challenge.is_empty() {
        return false;
    }
    let computed = pkce_challenge(code_verifier);
    computed.as_bytes().ct_eq(code_challenge.as_bytes()).into()
}
