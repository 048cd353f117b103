use crate::tracking::TrackingId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-hop acknowledgement state (§3): either the remaining expected success
/// notifications (counts down from 2 to 0) or a failure descriptor string.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PendingEntry {
    Remaining(u8),
    Failed(String),
}

impl PendingEntry {
    pub fn initial() -> Self {
        PendingEntry::Remaining(2)
    }

    /// A hop is "done" once its counter has reached zero.
    pub fn is_done(&self) -> bool {
        matches!(self, PendingEntry::Remaining(0))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PendingEntry::Failed(_))
    }

    /// Decrement by one, floored at zero. No-op on an already-failed entry.
    pub fn decrement(&mut self) {
        if let PendingEntry::Remaining(n) = self {
            *n = n.saturating_sub(1);
        }
    }

    pub fn fail(&mut self, reason: String) {
        *self = PendingEntry::Failed(reason);
    }
}

/// Outcome of evaluating a `CircuitRecord`'s `pending` map against the
/// terminal-determinism rule in §8 (invariant 6).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CircuitOutcome {
    Pending,
    Success,
    Error(String),
}

/// Directory-held state for one provisioned circuit (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CircuitRecord {
    pub tracking_id: TrackingId,
    pub hops: [String; 3],
    pub pending: HashMap<String, PendingEntry>,
    pub created_at: DateTime<Utc>,
}

impl CircuitRecord {
    pub fn new(tracking_id: TrackingId, hops: [String; 3]) -> Self {
        let pending = hops
            .iter()
            .cloned()
            .map(|url| (url, PendingEntry::initial()))
            .collect();

        Self {
            tracking_id,
            hops,
            pending,
            created_at: Utc::now(),
        }
    }

    /// Evaluate the terminal-determinism rule (§8 invariant 6): any failed
    /// entry yields that entry's error; all-done yields success; otherwise
    /// the circuit is still pending.
    pub fn outcome(&self) -> CircuitOutcome {
        for (hop, entry) in &self.pending {
            if let PendingEntry::Failed(reason) = entry {
                return CircuitOutcome::Error(format!("error at {hop}: {reason}"));
            }
        }

        if self.pending.values().all(PendingEntry::is_done) {
            CircuitOutcome::Success
        } else {
            CircuitOutcome::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hops() -> [String; 3] {
        [
            "https://node-001.example".to_string(),
            "https://node-002.example".to_string(),
            "https://node-003.example".to_string(),
        ]
    }

    #[test]
    fn fresh_circuit_is_pending() {
        let rec = CircuitRecord::new(TrackingId::new(), sample_hops());
        assert_eq!(rec.outcome(), CircuitOutcome::Pending);
    }

    #[test]
    fn all_done_is_success() {
        let mut rec = CircuitRecord::new(TrackingId::new(), sample_hops());
        for entry in rec.pending.values_mut() {
            entry.decrement();
            entry.decrement();
        }
        assert_eq!(rec.outcome(), CircuitOutcome::Success);
    }

    #[test]
    fn any_failure_is_error() {
        let mut rec = CircuitRecord::new(TrackingId::new(), sample_hops());
        let hop = rec.hops[1].clone();
        rec.pending.get_mut(&hop).unwrap().fail("timeout".into());
        match rec.outcome() {
            CircuitOutcome::Error(msg) => {
                assert!(msg.contains(&hop));
                assert!(msg.contains("timeout"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn decrement_floors_at_zero() {
        let mut entry = PendingEntry::Remaining(1);
        entry.decrement();
        entry.decrement();
        assert!(entry.is_done());
    }

    #[test]
    fn partial_progress_is_still_pending() {
        let mut rec = CircuitRecord::new(TrackingId::new(), sample_hops());
        let hop = rec.hops[0].clone();
        rec.pending.get_mut(&hop).unwrap().decrement();
        assert_eq!(rec.outcome(), CircuitOutcome::Pending);
    }
}
