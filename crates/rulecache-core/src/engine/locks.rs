use crate::model::CacheKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

type LockMap = HashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>;

/// At most one in-flight compile per cache key. Different keys never contend.
/// An entry lives only while someone holds or waits for its key.
#[derive(Debug, Default, Clone)]
pub struct KeyLocks {
    inner: Arc<Mutex<LockMap>>,
}

/// Held for the duration of one compile.
#[derive(Debug)]
pub struct KeyGuard {
    key: CacheKey,
    map: Arc<Mutex<LockMap>>,
    _held: OwnedMutexGuard<()>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &CacheKey) -> KeyGuard {
        let lock = {
            let mut map = self.inner.lock().unwrap();
            map.entry(key.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        KeyGuard {
            key: key.clone(),
            map: self.inner.clone(),
            _held: lock.lock_owned().await,
        }
    }

    /// Keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        let mut map = self.map.lock().unwrap();
        // the map and this guard are the only owners: nobody is waiting
        if map
            .get(&self.key)
            .is_some_and(|m| Arc::strong_count(m) == 2)
        {
            map.remove(&self.key);
        }
    }
}
