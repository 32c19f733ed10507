use redmood_core::CoreError;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;

type Slot<V> = Arc<OnceCell<Arc<V>>>;

/// Memoizes fallible async computations by key.
///
/// Every key owns a write-once cell, so concurrent callers of one key share
/// a single in-flight computation and all read its result. Failures are not
/// stored: the slot is dropped and the next caller computes again. Callers
/// already waiting on a computation that fails do not share its error; each
/// of them retries in turn.
pub struct MemoCache<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> MemoCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.lock().get(key).and_then(|slot| slot.get().cloned())
    }

    pub async fn get_or_try_init<F, Fut>(&self, key: &K, init: F) -> Result<Arc<V>, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, CoreError>>,
    {
        let slot = self.slot(key);
        let result = slot
            .get_or_try_init(|| async move { init().await.map(Arc::new) })
            .await
            .cloned();

        if result.is_err() {
            self.evict_empty(key, &slot);
        }
        result
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn slot(&self, key: &K) -> Slot<V> {
        self.lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    fn evict_empty(&self, key: &K, slot: &Slot<V>) {
        let mut slots = self.lock();
        let stale = slots
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && !current.initialized());
        if stale {
            slots.remove(key);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Slot<V>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> Default for MemoCache<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
