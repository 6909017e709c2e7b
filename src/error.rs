//! Application error types for registry-auth-shim
//!
//! This module defines the error types shared between the token codec,
//! the auth middleware and the upstream forwarder.
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Failure of the randomness capability
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EntropyError {
    /// The source returned fewer bytes than requested
    #[error("short read: wanted {wanted} bytes, got {got}")]
    ShortRead { wanted: usize, got: usize },

    /// The source itself failed
    #[error("entropy source unavailable: {0}")]
    Unavailable(String),
}

/// Failure of the key-derivation capability
#[derive(Debug, Error, Clone, PartialEq)]
#[error("key derivation failed: {0}")]
pub struct KdfError(pub String);

/// KDF cost parameters above the verification ceiling
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KdfLimitError {
    #[error("time cost {value} exceeds limit {limit}")]
    TimeCost { value: u32, limit: u32 },

    #[error("memory cost {value} KiB exceeds limit {limit} KiB")]
    MemoryCost { value: u32, limit: u32 },
}

/// Errors raised while issuing a token
///
/// These are fatal for the request that triggered issuance and map to a 500.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IssueError {
    /// CSPRNG under-delivered
    #[error("rand: {0}")]
    Entropy(#[from] EntropyError),

    /// The configured KDF parameters were rejected
    #[error("kdf: {0}")]
    KeyDerivation(#[from] KdfError),

    /// The MAC could not be keyed or computed
    #[error("hmac: {0}")]
    Signing(String),

    /// The blocking worker running the KDF failed
    #[error("worker: {0}")]
    Worker(String),
}

/// Errors raised while verifying a token
///
/// These are classification signals, not faults. A Basic credential echoed
/// back as a bearer token fails here on every request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VerifyError {
    /// Not URL-safe unpadded base64
    #[error("decode: {0}")]
    Decode(String),

    /// Decoded payload is smaller than header plus signature
    #[error("too short: {len} bytes, need at least {min}")]
    TooShort { len: usize, min: usize },

    /// Unknown format tag
    #[error("unsupported version {0}")]
    UnsupportedVersion(u8),

    /// Stored expiry does not fit a signed timestamp
    #[error("invalid expiration")]
    InvalidExpiry,

    /// Expiry is in the past
    #[error("expired")]
    Expired,

    /// Embedded KDF parameters are outside the accepted range
    #[error("invalid kdf parameters: {0}")]
    InvalidKdfParams(String),

    /// HMAC mismatch
    #[error("bad signature")]
    BadSignature,
}

/// Upstream forwarding errors
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Upstream request failed
    #[error("Upstream error: {0}")]
    Upstream(#[from] reqwest::Error),

    /// The target URL could not be built from the request
    #[error("Invalid upstream URI: {0}")]
    InvalidUri(String),
}

/// Application-level error type
///
/// Aggregates the start-up failures surfaced by `main`.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Server error
    #[error("Server error: {0}")]
    Server(#[from] crate::server::ServerError),

    /// Logging initialization error
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] crate::telemetry::TelemetryError),
}
