//! Signed session tokens.
//!
//! ```text
//! <base64url-no-pad(json payload)>.<base64url-no-pad(HMAC-SHA256(secret, first segment))>
//! ```
//!
//! The MAC covers the encoded payload segment, so verification never parses
//! untrusted JSON before the signature has been checked.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::{Serialize, de::DeserializeOwned};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Why a token was refused.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SignatureError {
    #[error("token is not of the form <payload>.<signature>")]
    Malformed,
    #[error("token segment is not valid base64url")]
    Encoding,
    #[error("signature mismatch")]
    Mismatch,
    #[error("payload could not be decoded: {0}")]
    Payload(String),
}

fn mac(secret: &[u8], data: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC key of any size");
    mac.update(data);
    mac
}

/// Serializes `payload` and signs it with `secret`.
pub fn sign<T: Serialize>(payload: &T, secret: &[u8]) -> Result<String, SignatureError> {
    let json = sonic_rs::to_string(payload).map_err(|e| SignatureError::Payload(e.to_string()))?;
    let body = URL_SAFE_NO_PAD.encode(json.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac(secret, body.as_bytes()).finalize().into_bytes());

    Ok(format!("{}.{}", body, signature))
}

/// Checks the signature of `token` and decodes its payload.
pub fn verify<T: DeserializeOwned>(token: &str, secret: &[u8]) -> Result<T, SignatureError> {
    let (body, signature) = token.split_once('.').ok_or(SignatureError::Malformed)?;
    if body.is_empty() || signature.contains('.') {
        return Err(SignatureError::Malformed);
    }

    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| SignatureError::Encoding)?;
    mac(secret, body.as_bytes())
        .verify_slice(&signature)
        .map_err(|_| SignatureError::Mismatch)?;

    let json = URL_SAFE_NO_PAD.decode(body).map_err(|_| SignatureError::Encoding)?;
    sonic_rs::from_slice(&json).map_err(|e| SignatureError::Payload(e.to_string()))
}
