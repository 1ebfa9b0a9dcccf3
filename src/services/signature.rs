//! HMAC-SHA256 signing for outbound payloads.
//!
//! Signatures are lowercase hex over the exact body bytes. Headers carry them
//! as `sha256=<hex>`; [`verify`] accepts either form.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_PREFIX: &str = "sha256=";
const SECRET_PREFIX: &str = "whsec_";
const SECRET_BYTE_LENGTH: usize = 32;

/// Hex-encoded HMAC-SHA256 of `payload` under `secret`.
pub fn sign(payload: &[u8], secret: &str) -> String {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(secret.as_bytes()).expect("HMAC key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// The value placed in the signature header.
pub fn signature_header_value(payload: &[u8], secret: &str) -> String {
    format!("{}{}", SIGNATURE_PREFIX, sign(payload, secret))
}

/// Recompute and compare in constant time.
pub fn verify(payload: &[u8], signature: &str, secret: &str) -> bool {
    let provided = signature.trim();
    let provided = provided.strip_prefix(SIGNATURE_PREFIX).unwrap_or(provided);
    let expected = sign(payload, secret);
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Fresh random signing secret, `whsec_` + 32 random bytes.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTE_LENGTH];
    rand::thread_rng().fill(&mut bytes);
    format!("{}{}", SECRET_PREFIX, URL_SAFE_NO_PAD.encode(bytes))
}
