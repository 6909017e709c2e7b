//! Signed anonymous token codec
//!
//! Tokens are self-describing: every parameter needed to verify them travels
//! inside the token, so the server keeps no state beyond the shared secret.
//!
//! Byte layout (integers big-endian), URL-safe base64 without padding:
//!
//! ```text
//! version(1) | nonce(32) | expiry(8) | time_cost(4) | memory_kib(4) | parallelism(1) | salt(64) | hmac-sha512(64)
//! ```
//!
//! The signature covers every byte before it and is keyed by an Argon2id
//! derivation of the shared secret under the embedded salt and cost
//! parameters.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha512;

use crate::error::{EntropyError, IssueError, KdfLimitError, VerifyError};

use super::traits::{Argon2Kdf, EntropySource, KdfParams, KeyDerivation, OsEntropy};

/// The only supported format tag
pub const TOKEN_VERSION: u8 = 1;

/// Length of the random nonce
pub const NONCE_LEN: usize = 32;

/// Length of the per-token KDF salt
pub const KDF_SALT_LEN: usize = 64;

/// Length of the HMAC-SHA512 signature
pub const SIGNATURE_LEN: usize = 64;

const EXPIRY_OFFSET: usize = 1 + NONCE_LEN;
const TIME_COST_OFFSET: usize = EXPIRY_OFFSET + 8;
const MEMORY_COST_OFFSET: usize = TIME_COST_OFFSET + 4;
const PARALLELISM_OFFSET: usize = MEMORY_COST_OFFSET + 4;
const SALT_OFFSET: usize = PARALLELISM_OFFSET + 1;

/// Bytes covered by the signature
pub const HEADER_LEN: usize = SALT_OFFSET + KDF_SALT_LEN;

/// Smallest decoded size a token can have
pub const MIN_TOKEN_LEN: usize = HEADER_LEN + SIGNATURE_LEN;

type HmacSha512 = Hmac<Sha512>;

/// Upper bounds on KDF costs accepted from a presented token
///
/// The parameters come from the token, so without a ceiling a forged token
/// could ask the server for an arbitrarily expensive derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfLimits {
    /// Largest accepted time cost
    #[serde(default = "default_max_time_cost")]
    pub max_time_cost: u32,

    /// Largest accepted memory cost in KiB
    #[serde(default = "default_max_memory_cost_kib")]
    pub max_memory_cost_kib: u32,
}

impl Default for KdfLimits {
    fn default() -> Self {
        Self {
            max_time_cost: default_max_time_cost(),
            max_memory_cost_kib: default_max_memory_cost_kib(),
        }
    }
}

fn default_max_time_cost() -> u32 {
    16
}

fn default_max_memory_cost_kib() -> u32 {
    1024 * 1024 // 1 GiB
}

impl KdfLimits {
    /// Check that `params` stays within these limits
    pub fn check(&self, params: &KdfParams) -> Result<(), KdfLimitError> {
        if params.time_cost > self.max_time_cost {
            return Err(KdfLimitError::TimeCost {
                value: params.time_cost,
                limit: self.max_time_cost,
            });
        }
        if params.memory_cost_kib > self.max_memory_cost_kib {
            return Err(KdfLimitError::MemoryCost {
                value: params.memory_cost_kib,
                limit: self.max_memory_cost_kib,
            });
        }
        Ok(())
    }
}

/// Issues and verifies signed anonymous tokens
pub struct TokenForge {
    entropy: Arc<dyn EntropySource>,
    kdf: Arc<dyn KeyDerivation>,
    defaults: KdfParams,
    limits: KdfLimits,
}

impl std::fmt::Debug for TokenForge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenForge")
            .field("defaults", &self.defaults)
            .field("limits", &self.limits)
            .finish()
    }
}

impl TokenForge {
    /// Create a forge backed by the OS CSPRNG and Argon2id
    pub fn new(defaults: KdfParams, limits: KdfLimits) -> Self {
        Self::with_capabilities(Arc::new(OsEntropy), Arc::new(Argon2Kdf), defaults, limits)
    }

    /// Create a forge with explicit randomness and KDF capabilities
    pub fn with_capabilities(
        entropy: Arc<dyn EntropySource>,
        kdf: Arc<dyn KeyDerivation>,
        defaults: KdfParams,
        limits: KdfLimits,
    ) -> Self {
        Self {
            entropy,
            kdf,
            defaults,
            limits,
        }
    }

    /// KDF parameters stamped into newly issued tokens
    pub fn defaults(&self) -> &KdfParams {
        &self.defaults
    }

    /// Issue a token that expires `ttl` from now
    ///
    /// A negative `ttl` yields a token that is already expired.
    pub fn issue(&self, secret: &[u8], ttl: Duration) -> Result<String, IssueError> {
        self.issue_at(secret, ttl, Utc::now().timestamp())
    }

    /// Issue a token relative to the Unix timestamp `now`
    pub fn issue_at(&self, secret: &[u8], ttl: Duration, now: i64) -> Result<String, IssueError> {
        let mut nonce = [0u8; NONCE_LEN];
        self.fill_random(&mut nonce)?;

        let expiry = now.saturating_add(ttl.num_seconds());

        let mut salt = [0u8; KDF_SALT_LEN];
        self.fill_random(&mut salt)?;

        let params = self.defaults;

        let mut buf = Vec::with_capacity(MIN_TOKEN_LEN);
        buf.push(TOKEN_VERSION);
        buf.extend_from_slice(&nonce);
        buf.extend_from_slice(&(expiry as u64).to_be_bytes());
        buf.extend_from_slice(&params.time_cost.to_be_bytes());
        buf.extend_from_slice(&params.memory_cost_kib.to_be_bytes());
        buf.push(params.parallelism);
        buf.extend_from_slice(&salt);

        let key = self.kdf.derive(secret, &salt, &params)?;

        let mut mac =
            HmacSha512::new_from_slice(&key).map_err(|e| IssueError::Signing(e.to_string()))?;
        mac.update(&buf);
        buf.extend_from_slice(&mac.finalize().into_bytes());

        Ok(URL_SAFE_NO_PAD.encode(buf))
    }

    /// Verify a token against `secret` at the current time
    pub fn verify(&self, secret: &[u8], token: &str) -> Result<(), VerifyError> {
        self.verify_at(secret, token, Utc::now().timestamp())
    }

    /// Verify a token against `secret` at the Unix timestamp `now`
    pub fn verify_at(&self, secret: &[u8], token: &str, now: i64) -> Result<(), VerifyError> {
        let decoded = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| VerifyError::Decode(e.to_string()))?;

        if decoded.len() < MIN_TOKEN_LEN {
            return Err(VerifyError::TooShort {
                len: decoded.len(),
                min: MIN_TOKEN_LEN,
            });
        }

        if decoded[0] != TOKEN_VERSION {
            return Err(VerifyError::UnsupportedVersion(decoded[0]));
        }

        let expiry = i64::try_from(be_u64(&decoded[EXPIRY_OFFSET..]))
            .map_err(|_| VerifyError::InvalidExpiry)?;
        if now > expiry {
            return Err(VerifyError::Expired);
        }

        let params = KdfParams {
            time_cost: be_u32(&decoded[TIME_COST_OFFSET..]),
            memory_cost_kib: be_u32(&decoded[MEMORY_COST_OFFSET..]),
            parallelism: decoded[PARALLELISM_OFFSET],
        };
        self.limits
            .check(&params)
            .map_err(|e| VerifyError::InvalidKdfParams(e.to_string()))?;

        let salt = &decoded[SALT_OFFSET..HEADER_LEN];
        let key = self
            .kdf
            .derive(secret, salt, &params)
            .map_err(|e| VerifyError::InvalidKdfParams(e.to_string()))?;

        let mut mac = HmacSha512::new_from_slice(&key).map_err(|_| VerifyError::BadSignature)?;
        mac.update(&decoded[..HEADER_LEN]);
        mac.verify_slice(&decoded[HEADER_LEN..])
            .map_err(|_| VerifyError::BadSignature)
    }

    fn fill_random(&self, dest: &mut [u8]) -> Result<(), EntropyError> {
        let got = self.entropy.fill(dest)?;
        if got != dest.len() {
            return Err(EntropyError::ShortRead {
                wanted: dest.len(),
                got,
            });
        }
        Ok(())
    }
}

fn be_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(buf)
}

fn be_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(buf)
}
