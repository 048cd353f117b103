use serde::{Deserialize, Serialize};
use std::fmt;

/// 128-bit opaque identifier naming one circuit, rendered as 32 hex chars.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct TrackingId(pub [u8; 16]);

impl TrackingId {
    /// Draw a fresh random tracking id.
    pub fn new() -> Self {
        let mut bytes = [0u8; 16];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; 16] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl Default for TrackingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrackingId({})", self.to_hex())
    }
}

impl fmt::Display for TrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<TrackingId> for String {
    fn from(id: TrackingId) -> String {
        id.to_hex()
    }
}

impl TryFrom<String> for TrackingId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s).ok_or_else(|| format!("invalid tracking id: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let id = TrackingId::new();
        let hex = id.to_hex();
        assert_eq!(hex.len(), 32);
        assert_eq!(TrackingId::from_hex(&hex), Some(id));
    }

    #[test]
    fn distinct_draws() {
        let a = TrackingId::new();
        let b = TrackingId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_malformed_hex() {
        assert_eq!(TrackingId::from_hex("not-hex"), None);
        assert_eq!(TrackingId::from_hex("abcd"), None);
    }
}
