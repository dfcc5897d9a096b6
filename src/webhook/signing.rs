//! HMAC-SHA256 signing for webhook payloads.
//!
//! The signature is a hex-encoded HMAC-SHA256 digest over the canonical JSON
//! serialization of the payload, sent as `sha256=<hex>` in the signature
//! header. Canonical means deterministic key ordering, so the receiver can
//! re-serialize the body it parsed and recompute the identical digest.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header prefix for signature values.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Serialize a payload with deterministic key ordering.
///
/// `serde_json::Value` keeps object keys in a sorted map, so a plain
/// serialization of a `Value` is already canonical. Callers that start from
/// a struct should convert through `serde_json::to_value` first.
pub fn canonical_json(payload: &serde_json::Value) -> String {
    payload.to_string()
}

/// Generate a random 32-byte hex secret for a webhook subscription.
pub fn generate_secret() -> String {
    use rand::RngCore;

    let mut secret_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret_bytes);
    hex::encode(secret_bytes)
}

/// Compute the hex HMAC-SHA256 signature of a payload.
pub fn sign(payload: &serde_json::Value, secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(canonical_json(payload).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a signature against a freshly computed one.
///
/// Accepts the raw hex digest with or without the `sha256=` prefix. The
/// comparison is constant-time so a byte mismatch position is not observable
/// through timing.
pub fn verify(payload: &serde_json::Value, signature: &str, secret: &str) -> bool {
    let signature = signature.strip_prefix(SIGNATURE_PREFIX).unwrap_or(signature);
    let expected = sign(payload, secret);
    constant_time_eq(signature.as_bytes(), expected.as_bytes())
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
