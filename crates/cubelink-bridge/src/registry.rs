//! Thread-safe cube registry
//!
//! The registry is the single piece of shared mutable state in the bridge:
//! the scanner inserts into it, the command fan-out iterates it, and
//! discovery observers read its count. Every operation takes the same mutex
//! for its full duration; critical sections hold only `Arc` copies and
//! pushes, with real work done outside the lock.
//!
//! The collection is insertion-ordered and append-only; a cube is never
//! removed after link loss (a known, accepted gap).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::device::Cube;

/// Insertion-ordered, append-only collection of cubes
#[derive(Debug, Default)]
pub struct CubeRegistry {
    cubes: Mutex<Vec<Arc<Cube>>>,
    next_serial: AtomicU32,
}

impl CubeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next cube serial (insertion order, starting at 1)
    pub fn allocate_serial(&self) -> u32 {
        self.next_serial.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Insert a cube.
    ///
    /// Returns `false` without inserting when a cube with the same radio
    /// address is already registered; the address check and the push happen
    /// under one lock acquisition, so overlapping scans cannot race a
    /// duplicate in.
    pub fn add(&self, cube: Arc<Cube>) -> bool {
        let mut cubes = self.cubes.lock().unwrap();
        if cubes.iter().any(|c| c.address() == cube.address()) {
            warn!(address = format!("{:#014x}", cube.address()), "duplicate cube dropped");
            return false;
        }
        debug!(
            serial = cube.serial(),
            address = format!("{:#014x}", cube.address()),
            "cube registered"
        );
        cubes.push(cube);
        true
    }

    /// Number of registered cubes
    pub fn count(&self) -> usize {
        self.cubes.lock().unwrap().len()
    }

    /// Cube at `index` in insertion order
    pub fn get(&self, index: usize) -> Option<Arc<Cube>> {
        self.cubes.lock().unwrap().get(index).cloned()
    }

    /// Check whether a radio address is already registered
    pub fn contains_address(&self, address: u64) -> bool {
        self.cubes
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.address() == address)
    }

    /// Copy the current cube list.
    ///
    /// Fan-out iterates the snapshot outside the lock; cubes registered
    /// after the snapshot may or may not receive a concurrently routed
    /// command (no exactly-once guarantee).
    pub fn snapshot(&self) -> Vec<Arc<Cube>> {
        self.cubes.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::CharacteristicTable;
    use crate::test_utils::MockLink;

    fn cube(registry: &CubeRegistry, address: u64) -> Arc<Cube> {
        Arc::new(Cube::new(
            registry.allocate_serial(),
            Arc::new(MockLink::new(address)),
            CharacteristicTable::default(),
        ))
    }

    #[test]
    fn test_serials_start_at_one() {
        let registry = CubeRegistry::new();
        assert_eq!(registry.allocate_serial(), 1);
        assert_eq!(registry.allocate_serial(), 2);
    }

    #[test]
    fn test_insertion_order() {
        let registry = CubeRegistry::new();
        registry.add(cube(&registry, 0xA));
        registry.add(cube(&registry, 0xB));

        assert_eq!(registry.count(), 2);
        assert_eq!(registry.get(0).unwrap().address(), 0xA);
        assert_eq!(registry.get(1).unwrap().address(), 0xB);
        assert!(registry.get(2).is_none());
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let registry = CubeRegistry::new();
        assert!(registry.add(cube(&registry, 0xA)));
        assert!(!registry.add(cube(&registry, 0xA)));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_contains_address() {
        let registry = CubeRegistry::new();
        registry.add(cube(&registry, 0xA));
        assert!(registry.contains_address(0xA));
        assert!(!registry.contains_address(0xB));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = CubeRegistry::new();
        registry.add(cube(&registry, 0xA));
        let snapshot = registry.snapshot();
        registry.add(cube(&registry, 0xB));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.count(), 2);
    }
}
