//! Cryptographic primitives for the lattice peer layer.
//!
//! - **Ed25519** for the long-term node identity and handshake signatures
//! - **Blake2b-256** for identity fingerprints and channel key derivation
//! - PEM load-or-generate persistence of the long-term private key

pub mod hash;
pub mod identity;
pub mod keys;
pub mod pem;
pub mod sign;

pub use hash::{blake2b_256, blake2b_256_multi, fingerprint};
pub use identity::{IdentityError, LocalIdentity};
pub use keys::{generate_keypair, keypair_from_private, keypair_from_seed, public_from_private};
pub use sign::{sign_message, verify_signature};
