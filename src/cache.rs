use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::MasteryError;

struct Slots<K, V> {
    values: HashMap<K, Arc<V>>,
    /// Bumped per key on invalidation so a load that raced a write is not kept.
    generations: HashMap<K, u64>,
}

pub struct KeyedCache<K, V> {
    slots: Mutex<Slots<K, V>>,
}

impl<K, V> Default for KeyedCache<K, V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(Slots {
                values: HashMap::new(),
                generations: HashMap::new(),
            }),
        }
    }
}

impl<K, V> KeyedCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    pub async fn get_or_load<F, Fut>(&self, key: &K, load: F) -> Result<Arc<V>, MasteryError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, MasteryError>>,
    {
        let generation = {
            let slots = self.slots.lock().await;
            if let Some(value) = slots.values.get(key) {
                debug!(?key, "cache hit");
                return Ok(Arc::clone(value));
            }
            slots.generations.get(key).copied().unwrap_or(0)
        };

        debug!(?key, "cache miss, loading");
        let value = Arc::new(load().await?);

        let mut slots = self.slots.lock().await;
        if slots.generations.get(key).copied().unwrap_or(0) == generation {
            slots.values.insert(key.clone(), Arc::clone(&value));
        }
        Ok(value)
    }

    pub async fn invalidate(&self, key: &K) {
        let mut slots = self.slots.lock().await;
        slots.values.remove(key);
        *slots.generations.entry(key.clone()).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn loads_once_until_invalidated() {
        let cache: KeyedCache<String, usize> = KeyedCache::default();
        let loads = AtomicUsize::new(0);
        let key = "Lily/3".to_string();

        for _ in 0..3 {
            let value = cache
                .get_or_load(&key, || async {
                    Ok(loads.fetch_add(1, Ordering::SeqCst) + 1)
                })
                .await
                .unwrap();
            assert_eq!(*value, 1);
        }

        cache.invalidate(&key).await;
        let value = cache
            .get_or_load(&key, || async { Ok(loads.fetch_add(1, Ordering::SeqCst) + 1) })
            .await
            .unwrap();
        assert_eq!(*value, 2);
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_loads_are_not_cached() {
        let cache: KeyedCache<&'static str, usize> = KeyedCache::default();
        let err = cache
            .get_or_load(&"Lily/3", || async {
                Err(MasteryError::Storage("connection reset".into()))
            })
            .await;
        assert!(err.is_err());

        let value = cache
            .get_or_load(&"Lily/3", || async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(*value, 7);
    }

    #[tokio::test]
    async fn load_racing_an_invalidation_is_dropped() {
        let cache: KeyedCache<&'static str, usize> = KeyedCache::default();
        let value = cache
            .get_or_load(&"Lily/3", || async {
                cache.invalidate(&"Lily/3").await;
                Ok(1)
            })
            .await
            .unwrap();
        assert_eq!(*value, 1);

        let reloaded = cache
            .get_or_load(&"Lily/3", || async { Ok(2) })
            .await
            .unwrap();
        assert_eq!(*reloaded, 2);
    }
}
