//! The shared key-value map. Touched only from the event loop thread, so no
//! locking is needed: see `net::server`.

use std::collections::HashMap;

/// Byte-string to byte-string mapping, process-wide, non-persistent.
#[derive(Debug, Default)]
pub struct Store {
    map: HashMap<Vec<u8>, Vec<u8>>,
}

impl Store {
    pub fn new() -> Self {
        Store {
            map: HashMap::new(),
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.map.get(key).map(Vec::as_slice)
    }

    pub fn set(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.map.insert(key, value);
    }

    /// Removes `key` if present. Idempotent: absent keys are not an error.
    pub fn del(&mut self, key: &[u8]) {
        self.map.remove(key);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.map.len()
    }
}
