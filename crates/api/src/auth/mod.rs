//! Authentication primitives.
//!
//! - [`password`] -- Argon2id hashing and strength rules.
//! - [`jwt`] -- access tokens with tenancy claims, refresh-token helpers.

pub mod jwt;
pub mod password;
