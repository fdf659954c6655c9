//! HMAC-SHA512 request signing in the gateway's canonical form.
//!
//! Parameters are ordered by key, empty values are skipped, and both keys and
//! values are form-encoded (space becomes `+`). The digest is sent as
//! lowercase hex.

use hmac::{Hmac, Mac};
use sha2::Sha512;
use std::collections::BTreeMap;
use url::form_urlencoded::byte_serialize;

use crate::GatewayError;

type HmacSha512 = Hmac<Sha512>;

pub const SECURE_HASH: &str = "vnp_SecureHash";
pub const SECURE_HASH_TYPE: &str = "vnp_SecureHashType";

fn encode(raw: &str) -> String {
    byte_serialize(raw.as_bytes()).collect()
}

/// `k1=v1&k2=v2...` over the sorted, non-empty parameters.
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{}={}", encode(key), encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Lowercase hex HMAC-SHA512 of `data`.
pub fn hmac_sha512_hex(secret: &str, data: &str) -> Result<String, GatewayError> {
    let mut mac =
        HmacSha512::new_from_slice(secret.as_bytes()).map_err(|_| GatewayError::InvalidKey)?;
    mac.update(data.as_bytes());
    Ok(to_hex(&mac.finalize().into_bytes()))
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{:02x}", b);
        out
    })
}

/// Signs `params` and returns `(query, signature)`.
pub fn sign(secret: &str, params: &BTreeMap<String, String>) -> Result<(String, String), GatewayError> {
    let query = canonical_query(params);
    let signature = hmac_sha512_hex(secret, &query)?;
    Ok((query, signature))
}

/// Checks a callback's signature over every other parameter it carries.
pub fn verify(secret: &str, params: &BTreeMap<String, String>) -> bool {
    let Some(provided) = params.get(SECURE_HASH) else {
        return false;
    };
    let signed: BTreeMap<String, String> = params
        .iter()
        .filter(|(key, _)| key.as_str() != SECURE_HASH && key.as_str() != SECURE_HASH_TYPE)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    match hmac_sha512_hex(secret, &canonical_query(&signed)) {
        Ok(expected) => expected.eq_ignore_ascii_case(provided),
        Err(_) => false,
    }
}
