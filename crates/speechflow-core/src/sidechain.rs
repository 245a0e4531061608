//! Sidechain bus (spec §4.7): a process-wide registry of named scalar
//! buses nodes use to share sub-chunk-rate values (gain reduction, VAD
//! flags) without routing them as chunks on an edge.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const BUS_CAPACITY: usize = 64;

/// A single named bus. Events are `(event_name, value)` scalar tuples —
/// `"sidechain-decibel" -> -6.2`, say — never chunks.
pub struct SidechainBus {
    tx: broadcast::Sender<(String, f64)>,
}

impl SidechainBus {
    fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Publish a scalar event. Silently dropped if nobody is subscribed.
    pub fn publish(&self, event: &str, value: f64) {
        let _ = self.tx.send((event.to_string(), value));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<(String, f64)> {
        self.tx.subscribe()
    }
}

/// Process-wide `name -> SidechainBus` registry. Lives exactly as long as
/// the executor that owns it: nodes only ever see an `Arc` clone, never
/// the registry itself, so a bus named during one graph run never leaks
/// into the next.
#[derive(Default)]
pub struct SidechainRegistry {
    buses: Mutex<HashMap<String, Arc<SidechainBus>>>,
}

impl SidechainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the bus for `name`, creating it on first access.
    pub fn access_bus(&self, name: &str) -> Arc<SidechainBus> {
        let mut buses = self.buses.lock().expect("sidechain registry mutex poisoned");
        Arc::clone(buses.entry(name.to_string()).or_insert_with(|| Arc::new(SidechainBus::new())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn access_bus_returns_the_same_bus_for_repeated_names() {
        let registry = SidechainRegistry::new();
        let a = registry.access_bus("gain-reduction");
        let mut rx = a.subscribe();
        let b = registry.access_bus("gain-reduction");
        b.publish("sidechain-decibel", -4.5);
        let (name, value) = rx.recv().await.unwrap();
        assert_eq!(name, "sidechain-decibel");
        assert_eq!(value, -4.5);
    }

    #[tokio::test]
    async fn distinct_names_are_isolated_buses() {
        let registry = SidechainRegistry::new();
        let a = registry.access_bus("a");
        let b = registry.access_bus("b");
        let mut rx_b = b.subscribe();
        a.publish("x", 1.0);
        b.publish("y", 2.0);
        let (name, value) = rx_b.recv().await.unwrap();
        assert_eq!(name, "y");
        assert_eq!(value, 2.0);
    }
}
