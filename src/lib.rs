//! registry-auth-shim - Docker Registry v2 token auth in front of a Basic-auth registry
//!
//! This crate provides a reverse proxy that lets Docker clients pull
//! anonymously with self-verifying signed tokens, and push or pull privately
//! by having their Basic credentials relayed to the upstream registry.

pub mod auth;
pub mod config;
pub mod error;
pub mod server;
pub mod telemetry;
