use std::sync::{Arc, Mutex};

use hashbrown::{HashMap, HashSet};

use super::{KvSlot, PersistError, PersistResult};

/// In-memory [`KvSlot`]. Clones share the same storage, so a clone outlives
/// the queue that wrote to it and can be handed to the next one.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvSlot {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<String, String>,
    fail_writes: bool,
    failing_keys: HashSet<String>,
}

impl MemoryKvSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key` without going through a queue.
    pub fn insert_raw(&self, key: &str, value: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.values.insert(key.to_string(), value.to_string());
        }
    }

    /// Returns the raw stored value under `key`.
    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.values.get(key).cloned())
    }

    /// Makes every subsequent write fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_writes = fail;
        }
    }

    /// Makes writes to `key` alone fail until reset.
    pub fn set_fail_writes_for(&self, key: &str, fail: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            if fail {
                inner.failing_keys.insert(key.to_string());
            } else {
                inner.failing_keys.remove(key);
            }
        }
    }
}

impl KvSlot for MemoryKvSlot {
    fn read(&self, key: &str) -> PersistResult<Option<String>> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| PersistError::Message("memory slot poisoned".to_string()))?;
        Ok(inner.values.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> PersistResult<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| PersistError::Message("memory slot poisoned".to_string()))?;
        if inner.fail_writes || inner.failing_keys.contains(key) {
            return Err(PersistError::Message("write rejected".to_string()));
        }
        inner.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
