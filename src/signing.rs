use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::{SigningError, VerificationError};

/// Header carrying the base64 RSA-SHA256 signature of a webhook body.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Decode a private key from its transport encoding (base64 of the PEM text).
pub fn decode_private_key(encoded: &str) -> Result<String, SigningError> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| SigningError::KeyEncoding(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| SigningError::KeyEncoding(e.to_string()))
}

fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, SigningError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|pkcs8_err| {
            RsaPrivateKey::from_pkcs1_pem(pem)
                .map_err(|pkcs1_err| format!("pkcs8: {pkcs8_err}; pkcs1: {pkcs1_err}"))
        })
        .map_err(SigningError::MalformedKey)
}

fn parse_public_key(pem: &str) -> Result<RsaPublicKey, VerificationError> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|spki_err| {
            RsaPublicKey::from_pkcs1_pem(pem)
                .map_err(|pkcs1_err| format!("spki: {spki_err}; pkcs1: {pkcs1_err}"))
        })
        .map_err(VerificationError::MalformedKey)
}

/// Sign `data` with an RSA private key (PKCS#8 or PKCS#1 PEM).
///
/// Uses RSASSA-PKCS1-v1_5 over SHA-256 and returns the signature base64-encoded.
/// The caller must transmit exactly the bytes that were signed.
pub fn sign(data: &[u8], private_key_pem: &str) -> Result<String, SigningError> {
    let key = parse_private_key(private_key_pem)?;
    let signing_key = SigningKey::<Sha256>::new(key);
    let signature = signing_key
        .try_sign(data)
        .map_err(|e| SigningError::Signature(e.to_string()))?;
    Ok(BASE64.encode(signature.to_bytes()))
}

/// Check a base64 signature against `data` and an RSA public key.
///
/// Mismatches return `Ok(false)`. Only input that cannot be parsed at all
/// is an error.
pub fn verify(data: &[u8], signature_b64: &str, public_key_pem: &str) -> Result<bool, VerificationError> {
    let key = parse_public_key(public_key_pem)?;
    let raw = BASE64
        .decode(signature_b64.trim())
        .map_err(|e| VerificationError::MalformedSignature(e.to_string()))?;

    let Ok(signature) = Signature::try_from(raw.as_slice()) else {
        return Ok(false);
    };

    let verifying_key = VerifyingKey::<Sha256>::new(key);
    Ok(verifying_key.verify(data, &signature).is_ok())
}

/// Find the signature header in a list of request headers.
pub fn parse_signature_header<'a, I>(headers: I, signature_header: &str) -> Option<String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    headers
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(signature_header))
        .map(|(_, value)| value.to_string())
}

/// Check a received webhook body against the value of its signature header.
///
/// An empty signature never verifies.
pub fn verify_webhook_body(body: &[u8], signature: &str, public_key_pem: &str) -> Result<bool, VerificationError> {
    if signature.trim().is_empty() {
        return Ok(false);
    }
    verify(body, signature, public_key_pem)
}

/// Verify an incoming webhook request in one call.
///
/// Returns `Ok(false)` when the signature header is missing or does not match.
pub fn verify_webhook_request<'a, I>(
    headers: I,
    body: &[u8],
    public_key_pem: &str,
) -> Result<bool, VerificationError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let Some(signature) = parse_signature_header(headers, SIGNATURE_HEADER) else {
        return Ok(false);
    };
    verify_webhook_body(body, &signature, public_key_pem)
}
