use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest and highest node identifier the directory may allocate (§3).
pub const NODE_ID_MIN: u32 = 1;
pub const NODE_ID_MAX: u32 = 99;

/// An integer in `[1,99]` rendered as three zero-padded decimals, e.g. `014`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    /// Construct a node id, rejecting values outside `[1,99]`.
    pub fn new(value: u32) -> Option<Self> {
        if (NODE_ID_MIN..=NODE_ID_MAX).contains(&value) {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Three zero-padded decimal digits, e.g. `"014"`.
    pub fn label(&self) -> String {
        format!("{:03}", self.0)
    }

    /// `node-<label>`, the segment substituted for `directory` in a node URL.
    pub fn node_name(&self) -> String {
        format!("node-{}", self.label())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.label())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range() {
        assert!(NodeId::new(0).is_none());
        assert!(NodeId::new(100).is_none());
    }

    #[test]
    fn accepts_bounds() {
        assert!(NodeId::new(1).is_some());
        assert!(NodeId::new(99).is_some());
    }

    #[test]
    fn label_is_zero_padded() {
        assert_eq!(NodeId::new(1).unwrap().label(), "001");
        assert_eq!(NodeId::new(14).unwrap().label(), "014");
        assert_eq!(NodeId::new(99).unwrap().label(), "099");
        assert_eq!(NodeId::new(14).unwrap().node_name(), "node-014");
    }
}
