//! Peer identity fingerprints.

use std::fmt;
use std::str::FromStr;

/// A 32-byte identity fingerprint — the Blake2b-256 digest of a peer's
/// long-term public key.
///
/// This is the network-wide, address-independent identifier of a node:
/// the discovery target in flood searches and the identity recorded for a
/// peer once its secure handshake completes. A zeroed `PeerId` means
/// "identity not yet proven".
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub [u8; 32]);

impl PeerId {
    /// The all-zero fingerprint used before a handshake has proven identity.
    pub const UNKNOWN: PeerId = PeerId([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether this is the zero fingerprint (identity not yet established).
    pub fn is_unknown(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Parse from a slice; `None` unless exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Eight hex chars is enough to tell peers apart in logs.
        write!(f, "PeerId({}…)", &hex::encode(self.0)[..8])
    }
}

impl FromStr for PeerId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_roundtrip() {
        let id = PeerId::new([0xAB; 32]);
        let s = id.to_string();
        assert_eq!(s.len(), 64);
        assert_eq!(s.parse::<PeerId>().unwrap(), id);
    }

    #[test]
    fn unknown_is_zeroed() {
        assert!(PeerId::UNKNOWN.is_unknown());
        assert!(!PeerId::new([1; 32]).is_unknown());
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(PeerId::from_slice(&[0u8; 31]).is_none());
        assert!(PeerId::from_slice(&[0u8; 33]).is_none());
        assert!(PeerId::from_slice(&[7u8; 32]).is_some());
    }

    #[test]
    fn parse_rejects_bad_hex() {
        assert!("zz".repeat(32).parse::<PeerId>().is_err());
        assert!("abcd".parse::<PeerId>().is_err());
    }
}
