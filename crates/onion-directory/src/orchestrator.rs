use async_trait::async_trait;
use onion_types::{OnionError, OnionResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Everything a hop process needs at launch (§4.C environment variables).
#[derive(Clone, Debug)]
pub struct HopLaunchSpec {
    pub port: u16,
    pub directory_node: String,
    pub this_node: String,
    pub tracking_id: String,
    pub public_key_pem: String,
}

/// The provisioning collaborator (§4.D). A production deployment plugs a
/// cloud-CLI-backed implementation in here without touching the circuit
/// state machine; the cloud CLI itself is out of scope.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn launch(&self, node_id: &str, spec: &HopLaunchSpec) -> OnionResult<()>;
    async fn teardown(&self, node_id: &str) -> OnionResult<()>;
}

/// Execs the `onion-hop` binary as a child process per node, in scope for
/// exercising the full circuit lifecycle on one machine (§4.D).
pub struct LocalProcessOrchestrator {
    hop_binary_path: PathBuf,
    children: Arc<Mutex<HashMap<String, Child>>>,
}

impl LocalProcessOrchestrator {
    pub fn new(hop_binary_path: PathBuf) -> Self {
        Self {
            hop_binary_path,
            children: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl Orchestrator for LocalProcessOrchestrator {
    async fn launch(&self, node_id: &str, spec: &HopLaunchSpec) -> OnionResult<()> {
        let child = Command::new(&self.hop_binary_path)
            .env("PORT", spec.port.to_string())
            .env("DIRECTORY_NODE", &spec.directory_node)
            .env("THIS_NODE", &spec.this_node)
            .env("TRACKING_ID", &spec.tracking_id)
            .env("PUBLIC_KEY", &spec.public_key_pem)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                OnionError::Orchestrator(format!("failed to spawn hop {node_id}: {e}"))
            })?;

        info!(node_id, this_node = %spec.this_node, "launched hop process");
        self.children.lock().await.insert(node_id.to_string(), child);
        Ok(())
    }

    async fn teardown(&self, node_id: &str) -> OnionResult<()> {
        let mut children = self.children.lock().await;
        if let Some(mut child) = children.remove(node_id) {
            if let Err(e) = child.kill().await {
                warn!(node_id, error = %e, "failed to kill hop process, it may already be gone");
            }
            debug!(node_id, "tore down hop process");
        } else {
            debug!(node_id, "teardown requested for unknown or already-torn-down hop");
        }
        Ok(())
    }
}
