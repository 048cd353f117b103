use onion_types::{CircuitOutcome, CircuitRecord, NodeId, TrackingId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, warn};

/// Process-wide mutable circuit state (§5): an explicit struct rather than a
/// hidden global, owning both the circuit map and a per-circuit completion
/// notifier so `/check` can wait without polling.
pub struct CircuitRegistry {
    circuits: Arc<RwLock<HashMap<TrackingId, CircuitRecord>>>,
    notifiers: Arc<RwLock<HashMap<TrackingId, Arc<Notify>>>>,
    node_ids: Arc<RwLock<HashMap<TrackingId, [NodeId; 3]>>>,
}

impl CircuitRegistry {
    pub fn new() -> Self {
        Self {
            circuits: Arc::new(RwLock::new(HashMap::new())),
            notifiers: Arc::new(RwLock::new(HashMap::new())),
            node_ids: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a freshly allocated circuit (§4.D `POST /route`).
    pub async fn insert(&self, tracking_id: TrackingId, ids: [NodeId; 3], hops: [String; 3]) {
        let record = CircuitRecord::new(tracking_id, hops);
        self.circuits.write().await.insert(tracking_id, record);
        self.notifiers
            .write()
            .await
            .insert(tracking_id, Arc::new(Notify::new()));
        self.node_ids.write().await.insert(tracking_id, ids);
    }

    /// Node identifiers currently in use by any live circuit, used to enforce
    /// distinctness when allocating a new route (§4.D).
    pub async fn live_node_ids(&self) -> Vec<NodeId> {
        self.node_ids
            .read()
            .await
            .values()
            .flat_map(|ids| ids.iter().copied())
            .collect()
    }

    /// Apply one `/notify` report (§4.D): decrement on success, replace with
    /// a failure descriptor otherwise, and wake anyone waiting on `/check`.
    /// Unknown tracking ids or node addresses are logged and ignored.
    pub async fn record_notify(&self, tracking_id: TrackingId, node_address: &str, status: &str) {
        let mut circuits = self.circuits.write().await;
        let Some(record) = circuits.get_mut(&tracking_id) else {
            warn!(%tracking_id, "notify for unknown tracking id");
            return;
        };
        let Some(entry) = record.pending.get_mut(node_address) else {
            warn!(%tracking_id, node_address, "notify for unknown node address");
            return;
        };

        if status == "success" {
            entry.decrement();
        } else {
            entry.fail(status.to_string());
        }
        drop(circuits);

        if let Some(notify) = self.notifiers.read().await.get(&tracking_id) {
            notify.notify_waiters();
        }
    }

    pub async fn outcome(&self, tracking_id: &TrackingId) -> Option<CircuitOutcome> {
        self.circuits
            .read()
            .await
            .get(tracking_id)
            .map(CircuitRecord::outcome)
    }

    pub async fn notifier(&self, tracking_id: &TrackingId) -> Option<Arc<Notify>> {
        self.notifiers.read().await.get(tracking_id).cloned()
    }

    pub async fn hops(&self, tracking_id: &TrackingId) -> Option<[String; 3]> {
        self.circuits
            .read()
            .await
            .get(tracking_id)
            .map(|rec| rec.hops.clone())
    }

    pub async fn node_ids(&self, tracking_id: &TrackingId) -> Option<[NodeId; 3]> {
        self.node_ids.read().await.get(tracking_id).copied()
    }

    /// Remove a circuit's bookkeeping after `/check` returns a terminal
    /// result (§4.D: "removes the circuit record").
    pub async fn remove(&self, tracking_id: &TrackingId) {
        self.circuits.write().await.remove(tracking_id);
        self.notifiers.write().await.remove(tracking_id);
        self.node_ids.write().await.remove(tracking_id);
        debug!(%tracking_id, "circuit record removed");
    }

    pub async fn snapshot(&self) -> HashMap<TrackingId, CircuitRecord> {
        self.circuits.read().await.clone()
    }
}

impl Default for CircuitRegistry {
    fn default() -> Self {
        Self::new()
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

    fn sample_ids() -> [NodeId; 3] {
        [
            NodeId::new(1).unwrap(),
            NodeId::new(2).unwrap(),
            NodeId::new(3).unwrap(),
        ]
    }

    #[tokio::test]
    async fn notify_success_twice_per_hop_converges() {
        let registry = CircuitRegistry::new();
        let id = TrackingId::new();
        let hops = sample_hops();
        registry.insert(id, sample_ids(), hops.clone()).await;

        for hop in &hops {
            registry.record_notify(id, hop, "success").await;
            registry.record_notify(id, hop, "success").await;
        }

        assert_eq!(registry.outcome(&id).await, Some(CircuitOutcome::Success));
    }

    #[tokio::test]
    async fn failure_at_any_hop_is_error() {
        let registry = CircuitRegistry::new();
        let id = TrackingId::new();
        let hops = sample_hops();
        registry.insert(id, sample_ids(), hops.clone()).await;

        registry.record_notify(id, &hops[1], "connection refused").await;

        match registry.outcome(&id).await {
            Some(CircuitOutcome::Error(msg)) => assert!(msg.contains(&hops[1])),
            other => panic!("expected error outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_tracking_id_is_ignored() {
        let registry = CircuitRegistry::new();
        let id = TrackingId::new();
        registry.record_notify(id, "https://node-001.example", "success").await;
        assert_eq!(registry.outcome(&id).await, None);
    }

    #[tokio::test]
    async fn notify_wakes_waiter() {
        let registry = Arc::new(CircuitRegistry::new());
        let id = TrackingId::new();
        let hops = sample_hops();
        registry.insert(id, sample_ids(), hops.clone()).await;

        let notify = registry.notifier(&id).await.unwrap();
        let waiter = {
            let notify = notify.clone();
            tokio::spawn(async move {
                notify.notified().await;
            })
        };

        registry.record_notify(id, &hops[0], "success").await;
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be woken")
            .unwrap();
    }

    #[tokio::test]
    async fn live_node_ids_reflects_active_circuits() {
        let registry = CircuitRegistry::new();
        let id = TrackingId::new();
        let ids = sample_ids();
        registry.insert(id, ids, sample_hops()).await;

        let live = registry.live_node_ids().await;
        for node_id in &ids {
            assert!(live.contains(node_id));
        }
    }
}
