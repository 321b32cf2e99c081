//! Error types for request signing and transport.

use thiserror::Error;

/// Errors raised while constructing a signer or signing a request.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SigningError {
    /// Raised when a credential or scope component is empty.
    #[error("missing {0}")]
    MissingField(&'static str),
    /// Raised when the request cannot be expressed canonically.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Raised when the HMAC key cannot be initialised.
    #[error("signing key derivation failed: {0}")]
    Key(String),
}

/// Errors raised while sending a signed request and decoding the response.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TransportError {
    /// Non-success status without a recognizable error envelope.
    #[error("HTTP {status}: {body}")]
    Http {
        /// Status code returned by the endpoint.
        status: u16,
        /// Raw response body.
        body: String,
    },
    /// Error envelope returned by the provider.
    #[error("{code}: {message}")]
    Provider {
        /// Status code returned by the endpoint.
        status: u16,
        /// Provider error code, for example `ValidationError`.
        code: String,
        /// Provider error message, surfaced verbatim.
        message: String,
    },
    /// Connection, TLS, or timeout failure before a response arrived.
    #[error("network error: {0}")]
    Network(String),
    /// The response body could not be parsed.
    #[error("failed to decode {format} response: {message}")]
    Decode {
        /// Format the body was sniffed as.
        format: &'static str,
        /// Parser message.
        message: String,
    },
    /// Signing failed before anything was sent.
    #[error(transparent)]
    Signing(#[from] SigningError),
}

impl From<reqwest::Error> for TransportError {
    fn from(value: reqwest::Error) -> Self {
        Self::Network(value.to_string())
    }
}
