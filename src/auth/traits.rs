//! Capability traits for the token codec
//!
//! Randomness and key derivation are the only non-pure operations in token
//! issuance and verification. They sit behind these traits so tests can
//! substitute fixed, failing or recording implementations.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{EntropyError, KdfError};

/// Length of the derived signing key in bytes
pub const SIGNING_KEY_LEN: usize = 64;

/// Argon2id cost parameters
///
/// These travel inside every token, so verification always uses the exact
/// parameters the issuer used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Number of passes
    pub time_cost: u32,

    /// Memory size in KiB
    pub memory_cost_kib: u32,

    /// Degree of parallelism (serialized as one byte)
    pub parallelism: u8,
}

impl KdfParams {
    /// Parallelism derived from the available CPUs, clamped to fit one byte
    pub fn default_parallelism() -> u8 {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        cpus.clamp(1, u8::MAX as usize) as u8
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            time_cost: 4,
            memory_cost_kib: 64 * 1024,
            parallelism: Self::default_parallelism(),
        }
    }
}

/// Source of cryptographically secure random bytes
pub trait EntropySource: Send + Sync {
    /// Fill `dest` and return the number of bytes written
    fn fill(&self, dest: &mut [u8]) -> Result<usize, EntropyError>;
}

/// Memory-hard password-based key derivation
#[cfg_attr(test, mockall::automock)]
pub trait KeyDerivation: Send + Sync {
    /// Derive a signing key from `secret` and `salt` under `params`
    fn derive(
        &self,
        secret: &[u8],
        salt: &[u8],
        params: &KdfParams,
    ) -> Result<[u8; SIGNING_KEY_LEN], KdfError>;
}

/// Operating-system CSPRNG
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, dest: &mut [u8]) -> Result<usize, EntropyError> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| EntropyError::Unavailable(e.to_string()))?;
        Ok(dest.len())
    }
}

/// Argon2id (version 0x13) key derivation
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Kdf;

impl KeyDerivation for Argon2Kdf {
    fn derive(
        &self,
        secret: &[u8],
        salt: &[u8],
        params: &KdfParams,
    ) -> Result<[u8; SIGNING_KEY_LEN], KdfError> {
        let argon_params = Params::new(
            params.memory_cost_kib,
            params.time_cost,
            u32::from(params.parallelism),
            Some(SIGNING_KEY_LEN),
        )
        .map_err(|e| KdfError(e.to_string()))?;

        let mut key = [0u8; SIGNING_KEY_LEN];
        Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params)
            .hash_password_into(secret, salt, &mut key)
            .map_err(|e| KdfError(e.to_string()))?;

        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_params() -> KdfParams {
        KdfParams {
            time_cost: 1,
            memory_cost_kib: 64,
            parallelism: 1,
        }
    }

    // Test 1: Default parallelism always fits a byte and is never zero
    #[test]
    fn test_default_parallelism_in_range() {
        let p = KdfParams::default_parallelism();
        assert!(p >= 1);
    }

    // Test 2: Default params match the documented costs
    #[test]
    fn test_default_params() {
        let params = KdfParams::default();
        assert_eq!(params.time_cost, 4);
        assert_eq!(params.memory_cost_kib, 65536);
        assert_eq!(params.parallelism, KdfParams::default_parallelism());
    }

    // Test 3: OsEntropy fills the whole buffer
    #[test]
    fn test_os_entropy_fills_buffer() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        assert_eq!(OsEntropy.fill(&mut a).unwrap(), 32);
        assert_eq!(OsEntropy.fill(&mut b).unwrap(), 32);
        assert_ne!(a, b, "two 32-byte draws should differ");
    }

    // Test 4: Argon2 derivation is deterministic for identical inputs
    #[test]
    fn test_argon2_deterministic() {
        let salt = [7u8; 64];
        let k1 = Argon2Kdf.derive(b"secret", &salt, &cheap_params()).unwrap();
        let k2 = Argon2Kdf.derive(b"secret", &salt, &cheap_params()).unwrap();
        assert_eq!(k1, k2);
    }

    // Test 5: Salt and secret both change the derived key
    #[test]
    fn test_argon2_salt_and_secret_matter() {
        let base = Argon2Kdf
            .derive(b"secret", &[1u8; 64], &cheap_params())
            .unwrap();
        let other_salt = Argon2Kdf
            .derive(b"secret", &[2u8; 64], &cheap_params())
            .unwrap();
        let other_secret = Argon2Kdf
            .derive(b"other", &[1u8; 64], &cheap_params())
            .unwrap();
        assert_ne!(base, other_salt);
        assert_ne!(base, other_secret);
    }

    // Test 6: Cost parameters change the derived key
    #[test]
    fn test_argon2_params_matter() {
        let salt = [3u8; 64];
        let k1 = Argon2Kdf.derive(b"secret", &salt, &cheap_params()).unwrap();
        let k2 = Argon2Kdf
            .derive(
                b"secret",
                &salt,
                &KdfParams {
                    time_cost: 2,
                    ..cheap_params()
                },
            )
            .unwrap();
        assert_ne!(k1, k2);
    }

    // Test 7: Invalid params are rejected rather than panicking
    #[test]
    fn test_argon2_rejects_invalid_params() {
        let zero_time = KdfParams {
            time_cost: 0,
            ..cheap_params()
        };
        assert!(Argon2Kdf.derive(b"secret", &[0u8; 64], &zero_time).is_err());

        // memory must be at least 8 KiB per lane
        let starved = KdfParams {
            time_cost: 1,
            memory_cost_kib: 8,
            parallelism: 4,
        };
        assert!(Argon2Kdf.derive(b"secret", &[0u8; 64], &starved).is_err());
    }
}
