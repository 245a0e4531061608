//! Node registry (spec §4.8, §9): the process-wide `id -> node` map the
//! external control surface uses to locate a live node, redesigned per §9's
//! note into an explicit, scoped registry owned by one [`Engine`](crate::Engine)
//! rather than a global. Grounded on the teacher's
//! `orchestrator::pattern::PatternRegistry` — a `RwLock<HashMap<..>>` behind
//! a small typed API — generalized from pattern configs to control handles.

use crate::node::ControlHandle;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Thread-safe `node id -> control handle` map, populated by the executor
/// as each node opens (while it still has exclusive access to call
/// [`Node::control_handle`](crate::node::Node::control_handle)) and read by
/// the control surface for the lifetime of the run.
#[derive(Default)]
pub struct NodeRegistry {
    handles: RwLock<HashMap<String, Arc<dyn ControlHandle>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` under `node_id`. Called once per controllable node
    /// during the executor's open phase.
    pub fn register(&self, node_id: impl Into<String>, handle: Arc<dyn ControlHandle>) {
        let mut handles = self.handles.write().expect("node registry lock poisoned");
        handles.insert(node_id.into(), handle);
    }

    /// Look up the control handle for `node_id`, if that node registered
    /// one.
    pub fn get(&self, node_id: &str) -> Option<Arc<dyn ControlHandle>> {
        let handles = self.handles.read().expect("node registry lock poisoned");
        handles.get(node_id).cloned()
    }

    /// Every currently registered node id, for diagnostics.
    pub fn ids(&self) -> Vec<String> {
        let handles = self.handles.read().expect("node registry lock poisoned");
        handles.keys().cloned().collect()
    }

    /// Drop every registered handle. Called during shutdown (spec §4.9 step
    /// 4, generalized from connection sets to the control registry).
    pub fn clear(&self) {
        let mut handles = self.handles.write().expect("node registry lock poisoned");
        handles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExternalRequestError;
    use crate::params::ParamValue;
    use async_trait::async_trait;

    struct Stub;

    #[async_trait]
    impl ControlHandle for Stub {
        async fn receive_request(&self, _args: Vec<ParamValue>) -> std::result::Result<(), ExternalRequestError> {
            Ok(())
        }
    }

    #[test]
    fn register_then_get_round_trips() {
        let registry = NodeRegistry::new();
        registry.register("mute:0", Arc::new(Stub));
        assert!(registry.get("mute:0").is_some());
        assert!(registry.get("mute:1").is_none());
    }

    #[test]
    fn clear_drops_every_handle() {
        let registry = NodeRegistry::new();
        registry.register("mute:0", Arc::new(Stub));
        registry.clear();
        assert!(registry.get("mute:0").is_none());
        assert!(registry.ids().is_empty());
    }
}
