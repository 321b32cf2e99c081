//! Canonical request construction and key derivation for SigV4.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use super::SigningError;

type HmacSha256 = Hmac<Sha256>;

/// Algorithm identifier emitted in the string to sign and the
/// `Authorization` header.
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

const TERMINATOR: &str = "aws4_request";

/// Percent-encodes `input` using the RFC 3986 unreserved set.
///
/// `/` is kept literal when `keep_slash` is set, which is how path segments
/// are joined back together.
#[must_use]
pub fn uri_encode(input: &str, keep_slash: bool) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(char::from(byte));
            }
            b'/' if keep_slash => encoded.push('/'),
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

pub(crate) fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return String::from("/");
    }
    let encoded = uri_encode(path, true);
    if encoded.starts_with('/') {
        encoded
    } else {
        format!("/{encoded}")
    }
}

/// Encodes query pairs and sorts them by key, then value.
pub(crate) fn canonical_query(query: &[(String, String)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(key, value)| (uri_encode(key, false), uri_encode(value, false)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Canonical header block and the `;`-joined signed header list.
pub(crate) struct CanonicalHeaders {
    pub(crate) block: String,
    pub(crate) signed: String,
}

pub(crate) fn canonical_headers(headers: &BTreeMap<String, String>) -> CanonicalHeaders {
    let block: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();
    let signed = headers.keys().map(String::as_str).collect::<Vec<_>>().join(";");
    CanonicalHeaders { block, signed }
}

/// Lower-cases a header name and normalises its value: trimmed, with inner
/// whitespace runs collapsed to a single space.
pub(crate) fn normalise_header(name: &str, value: &str) -> (String, String) {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    (name.trim().to_ascii_lowercase(), collapsed)
}

#[must_use]
pub(crate) fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub(crate) fn canonical_request(
    method: &str,
    uri: &str,
    query: &str,
    headers: &CanonicalHeaders,
    payload_hash: &str,
) -> String {
    format!(
        "{method}\n{uri}\n{query}\n{}\n{}\n{payload_hash}",
        headers.block, headers.signed
    )
}

pub(crate) fn credential_scope(date: &str, region: &str, service: &str) -> String {
    format!("{date}/{region}/{service}/{TERMINATOR}")
}

pub(crate) fn string_to_sign(amz_date: &str, scope: &str, canonical_request: &str) -> String {
    format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        sha256_hex(canonical_request.as_bytes())
    )
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SigningError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|err| SigningError::Key(err.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Derives the date, region, and service scoped signing key.
///
/// The key is recomputed on every call and never cached.
///
/// # Errors
///
/// Returns [`SigningError::Key`] when the HMAC cannot be initialised.
pub fn derive_signing_key(
    secret_access_key: &str,
    date: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, SigningError> {
    let k_secret = format!("AWS4{secret_access_key}");
    let k_date = hmac_sha256(k_secret.as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, TERMINATOR.as_bytes())
}

pub(crate) fn signature(key: &[u8], string_to_sign: &str) -> Result<String, SigningError> {
    hmac_sha256(key, string_to_sign.as_bytes()).map(hex::encode)
}
