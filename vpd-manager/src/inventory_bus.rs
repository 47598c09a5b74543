//! The narrow inventory-bus interface C8 replicates cache updates onto.
//!
//! The real bus is a D-Bus-style object tree external to this core (out of
//! scope per the surrounding service); this trait is the seam the
//! redundancy coordinator writes through.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CacheUpdateFailed(pub String);
impl fmt::Display for CacheUpdateFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inventory-bus cache update failed: {}", self.0)
    }
}
impl std::error::Error for CacheUpdateFailed {
}

pub trait InventoryBus: fmt::Debug {
    fn update_cache(&self, inventory_path: &str, record: &str, keyword: &str, value: &[u8]) -> Result<(), CacheUpdateFailed>;
}

/// A bus stand-in that discards every update; useful where the cache is
/// genuinely not wired up (e.g. a standalone CLI invocation).
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopInventoryBus;
impl InventoryBus for NoopInventoryBus {
    fn update_cache(&self, _inventory_path: &str, _record: &str, _keyword: &str, _value: &[u8]) -> Result<(), CacheUpdateFailed> {
        Ok(())
    }
}

/// An in-memory bus for tests: records the last value seen per
/// `(inventory_path, record, keyword)`.
#[derive(Debug, Default)]
pub struct InMemoryInventoryBus {
    cache: Mutex<HashMap<(String, String, String), Vec<u8>>>,
}
impl InMemoryInventoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, inventory_path: &str, record: &str, keyword: &str) -> Option<Vec<u8>> {
        let key = (inventory_path.to_owned(), record.to_owned(), keyword.to_owned());
        self.cache.lock().unwrap().get(&key).cloned()
    }
}
impl InventoryBus for InMemoryInventoryBus {
    fn update_cache(&self, inventory_path: &str, record: &str, keyword: &str, value: &[u8]) -> Result<(), CacheUpdateFailed> {
        let key = (inventory_path.to_owned(), record.to_owned(), keyword.to_owned());
        self.cache.lock().unwrap().insert(key, value.to_vec());
        Ok(())
    }
}
