//! Peer identity and the identifier validation boundary
//!
//! The radio layer hands peer identifiers around as opaque strings in the
//! form `"<pubkey-hex>:<session-uuid>"`. [`PeerId::decode`] is the single
//! place such a string is validated; an identifier that fails to decode
//! never creates a session.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors from decoding a peer identifier string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerIdError {
    #[error("missing ':' separator")]
    MissingSeparator,
    #[error("empty pubkey part")]
    EmptyPubkey,
    #[error("empty session part")]
    EmptySession,
    #[error("pubkey is not valid hex: {0}")]
    InvalidPubkey(String),
}

/// Unique identifier for a peer observed over the proximity link
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId {
    /// Overlay public key (hex encoded)
    pub pubkey: String,
    /// Unique session identifier
    pub uuid: String,
}

impl PeerId {
    pub fn new(pubkey: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            pubkey: pubkey.into(),
            uuid: uuid.into(),
        }
    }

    /// Decode an externally-encoded identifier string.
    ///
    /// This is the validation boundary: the pubkey part must be non-empty
    /// hex, the session part non-empty, joined by exactly one `:`.
    pub fn decode(s: &str) -> Result<Self, PeerIdError> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 2 {
            return Err(PeerIdError::MissingSeparator);
        }
        let (pubkey, uuid) = (parts[0], parts[1]);
        if pubkey.is_empty() {
            return Err(PeerIdError::EmptyPubkey);
        }
        if uuid.is_empty() {
            return Err(PeerIdError::EmptySession);
        }
        hex::decode(pubkey).map_err(|e| PeerIdError::InvalidPubkey(e.to_string()))?;
        Ok(Self::new(pubkey, uuid))
    }

    /// Encode back to the wire form accepted by [`PeerId::decode`]
    pub fn encode(&self) -> String {
        format!("{}:{}", self.pubkey, self.uuid)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pubkey, self.uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_roundtrip() {
        let id = PeerId::decode("abcd1234:session-1").unwrap();
        assert_eq!(id.pubkey, "abcd1234");
        assert_eq!(id.uuid, "session-1");
        assert_eq!(id.encode(), "abcd1234:session-1");
        assert_eq!(PeerId::decode(&id.encode()).unwrap(), id);
    }

    #[test]
    fn test_decode_rejects_missing_separator() {
        assert_eq!(
            PeerId::decode("not-a-valid-id"),
            Err(PeerIdError::MissingSeparator)
        );
        assert_eq!(
            PeerId::decode("a:b:c"),
            Err(PeerIdError::MissingSeparator)
        );
    }

    #[test]
    fn test_decode_rejects_empty_parts() {
        assert_eq!(PeerId::decode(":uuid"), Err(PeerIdError::EmptyPubkey));
        assert_eq!(PeerId::decode("abcd:"), Err(PeerIdError::EmptySession));
    }

    #[test]
    fn test_decode_rejects_non_hex_pubkey() {
        assert!(matches!(
            PeerId::decode("zzzz:uuid"),
            Err(PeerIdError::InvalidPubkey(_))
        ));
        // odd-length hex is also invalid
        assert!(matches!(
            PeerId::decode("abc:uuid"),
            Err(PeerIdError::InvalidPubkey(_))
        ));
    }

    #[test]
    fn test_display_matches_encode() {
        let id = PeerId::new("00ff", "u1");
        assert_eq!(id.to_string(), id.encode());
    }
}
