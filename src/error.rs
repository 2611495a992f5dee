use thiserror::Error;

/// Errors produced while signing a payload.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SigningError {
    /// The transport encoding (base64) of the key could not be decoded.
    #[error("private key is not valid base64: {0}")]
    KeyEncoding(String),

    /// The key material is not a PKCS#8 or PKCS#1 RSA private key.
    #[error("malformed private key: {0}")]
    MalformedKey(String),

    /// The signature scheme rejected the input.
    #[error("signing failed: {0}")]
    Signature(String),
}

/// Errors produced when a signature cannot be checked at all.
///
/// A signature that simply does not match is *not* an error;
/// verification returns `Ok(false)` in that case.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// The key material is not an SPKI or PKCS#1 RSA public key.
    #[error("malformed public key: {0}")]
    MalformedKey(String),

    /// The signature is not valid base64.
    #[error("malformed signature: {0}")]
    MalformedSignature(String),
}

/// Reasons a single event delivery attempt failed.
///
/// These never escape [`EventDispatcher::send_event`](crate::EventDispatcher::send_event);
/// they are logged and turned into error metrics.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Required credentials are missing for the selected transport.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network failure after the retry policy was exhausted.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote end answered with a status we do not accept.
    #[error("unexpected response status {status} {status_text}")]
    Status { status: u16, status_text: String },

    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to write event: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Signing(#[from] SigningError),
}

/// Failures talking to the analytics backend.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metrics transport error: {0}")]
    Transport(String),

    #[error("metrics backend returned status {status} {status_text}")]
    Status { status: u16, status_text: String },

    #[error("failed to serialize metrics: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_message_includes_code_and_text() {
        let err = DeliveryError::Status {
            status: 500,
            status_text: "Internal Server Error".to_string(),
        };
        assert_eq!(err.to_string(), "unexpected response status 500 Internal Server Error");
    }

    #[test]
    fn signing_errors_pass_through_delivery_errors() {
        let err: DeliveryError = SigningError::MalformedKey("bad pem".to_string()).into();
        assert_eq!(err.to_string(), "malformed private key: bad pem");
    }
}
