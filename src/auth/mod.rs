//! Anonymous-pull authentication for registry-auth-shim
//!
//! This module provides the authentication building blocks:
//! - Self-describing signed token issuance and verification
//! - Capability traits for randomness and key derivation
//! - Bearer value classification (anonymous token or echoed credential)
//! - The manager that runs key derivation off the async runtime

pub mod bearer;
pub mod manager;
pub mod token;
pub mod traits;

pub use bearer::{classify_bearer, BearerCredential};
pub use manager::{AuthConfig, AuthManager};
pub use token::{KdfLimits, TokenForge, MIN_TOKEN_LEN, TOKEN_VERSION};
pub use traits::{Argon2Kdf, EntropySource, KdfParams, KeyDerivation, OsEntropy};
