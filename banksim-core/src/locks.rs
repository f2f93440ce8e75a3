//! Per-key exclusive locks
//!
//! Locks are created lazily per key and never removed. Multi-key acquisition
//! always happens in ascending key order, so two transfers over the same pair
//! of accounts in opposite directions cannot deadlock.

use crate::{Error, Result};
use dashmap::DashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Duration;

/// Table of async mutexes keyed by `K`
pub struct LockTable<K> {
    locks: DashMap<K, Arc<Mutex<()>>>,
    timeout: Duration,
}

impl<K: Eq + Hash> fmt::Debug for LockTable<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockTable")
            .field("keys", &self.locks.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Held locks; released on drop
pub struct LockGuard<K> {
    keys: Vec<K>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl<K: fmt::Debug> fmt::Debug for LockGuard<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard").field("keys", &self.keys).finish()
    }
}

impl<K: PartialEq> LockGuard<K> {
    /// Whether this guard holds the lock for `key`
    pub fn covers(&self, key: &K) -> bool {
        self.keys.contains(key)
    }
}

impl<K> LockTable<K>
where
    K: Eq + Hash + Ord + Clone + fmt::Display,
{
    /// Create table whose acquisitions give up after `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            timeout,
        }
    }

    fn slot(&self, key: &K) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Lock a single key
    pub async fn acquire(&self, key: &K) -> Result<LockGuard<K>> {
        self.acquire_all(std::slice::from_ref(key)).await
    }

    /// Lock every key in `keys`, in ascending order, within one timeout window
    pub async fn acquire_all(&self, keys: &[K]) -> Result<LockGuard<K>> {
        let mut ordered = keys.to_vec();
        ordered.sort();
        ordered.dedup();

        let slots: Vec<_> = ordered.iter().map(|k| self.slot(k)).collect();

        let acquire = async move {
            let mut guards = Vec::with_capacity(slots.len());
            for slot in slots {
                guards.push(slot.lock_owned().await);
            }
            guards
        };

        match tokio::time::timeout(self.timeout, acquire).await {
            Ok(guards) => Ok(LockGuard {
                keys: ordered,
                _guards: guards,
            }),
            Err(_) => {
                let label = ordered
                    .iter()
                    .map(|k| k.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                tracing::warn!(keys = %label, "Lock acquisition timed out");
                Err(Error::LockTimeout(label))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_covers_keys() {
        let table = LockTable::new(Duration::from_millis(100));
        let guard = table
            .acquire_all(&["b".to_string(), "a".to_string(), "b".to_string()])
            .await
            .unwrap();

        assert!(guard.covers(&"a".to_string()));
        assert!(guard.covers(&"b".to_string()));
        assert!(!guard.covers(&"c".to_string()));
        assert_eq!(guard.keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_timeout_when_held() {
        let table = LockTable::new(Duration::from_millis(20));
        let _held = table.acquire(&"a".to_string()).await.unwrap();

        let result = table.acquire_all(&["a".to_string(), "b".to_string()]).await;
        assert!(matches!(result, Err(Error::LockTimeout(_))));

        // "b" must not stay locked after the failed attempt
        assert!(table.acquire(&"b".to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn test_release_on_drop() {
        let table = LockTable::new(Duration::from_millis(20));
        {
            let _guard = table.acquire(&"a".to_string()).await.unwrap();
        }
        assert!(table.acquire(&"a".to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn test_opposite_order_does_not_deadlock() {
        let table = Arc::new(LockTable::new(Duration::from_secs(5)));
        let mut handles = Vec::new();

        for i in 0..50 {
            let table = table.clone();
            handles.push(tokio::spawn(async move {
                let keys = if i % 2 == 0 {
                    ["x".to_string(), "y".to_string()]
                } else {
                    ["y".to_string(), "x".to_string()]
                };
                let _guard = table.acquire_all(&keys).await.unwrap();
                tokio::task::yield_now().await;
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
    }
}
