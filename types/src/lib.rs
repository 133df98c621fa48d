//! Fundamental types for the lattice peer-to-peer core.
//!
//! This crate defines the types shared across every other crate in the
//! workspace: identity fingerprints, key material and signatures.

pub mod id;
pub mod keys;

pub use id::PeerId;
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
