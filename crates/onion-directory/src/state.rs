use crate::config::DirectoryConfig;
use crate::orchestrator::Orchestrator;
use crate::registry::CircuitRegistry;
use std::sync::Arc;

/// Process-wide shared state handed to every connection handler (§5).
pub struct DirectoryState {
    pub config: DirectoryConfig,
    pub registry: CircuitRegistry,
    pub orchestrator: Arc<dyn Orchestrator>,
}

impl DirectoryState {
    pub fn new(config: DirectoryConfig, orchestrator: Arc<dyn Orchestrator>) -> Self {
        Self {
            config,
            registry: CircuitRegistry::new(),
            orchestrator,
        }
    }
}
