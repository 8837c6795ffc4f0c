//! ResourceRegistry — concurrent id → resource mapping.
//!
//! The single shared-mutation point for every live resource the server
//! owns (terminal handles, watch handles, task records, connections).
//! `remove` is an atomic take: exactly one caller gets the entry back and
//! with it the responsibility to release the underlying resource. A caller
//! that observes `None` must treat the resource as already handled. This
//! is what makes destroy-vs-exit and destroy-vs-disconnect races resolve
//! to at-most-once teardown without special-casing who got there first.

use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Concurrent mapping from generated identifiers to live resources.
///
/// Resources are `Clone`: handle types wrap their process/watcher state
/// in an `Arc`, task records are plain values. Reads take the shared lock;
/// `insert`/`remove`/`update` serialize on the write lock.
#[derive(Debug)]
pub struct ResourceRegistry<R> {
    entries: RwLock<HashMap<Uuid, R>>,
}

impl<R: Clone> ResourceRegistry<R> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a resource under `id`, replacing any previous entry.
    pub async fn insert(&self, id: Uuid, resource: R) {
        self.entries.write().await.insert(id, resource);
    }

    /// Look up a resource by id.
    pub async fn get(&self, id: Uuid) -> Option<R> {
        self.entries.read().await.get(&id).cloned()
    }

    /// Atomically take an entry out of the registry.
    ///
    /// Whichever caller receives `Some` owns the release of the underlying
    /// resource; `None` means another path already took it and no release
    /// must be performed.
    pub async fn remove(&self, id: Uuid) -> Option<R> {
        self.entries.write().await.remove(&id)
    }

    /// Mutate an entry in place under the write lock.
    ///
    /// Returns a clone of the entry after mutation, or `None` if the id is
    /// not registered.
    pub async fn update<F>(&self, id: Uuid, f: F) -> Option<R>
    where
        F: FnOnce(&mut R),
    {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&id)?;
        f(entry);
        Some(entry.clone())
    }

    /// Atomically drain every entry matching `pred`.
    ///
    /// Used for cascade teardown: all of a connection's resources leave
    /// the registry in one critical section, so events racing the drain
    /// observe them as already gone.
    pub async fn remove_where<F>(&self, pred: F) -> Vec<(Uuid, R)>
    where
        F: Fn(&R) -> bool,
    {
        let mut entries = self.entries.write().await;
        let ids: Vec<Uuid> = entries
            .iter()
            .filter(|(_, r)| pred(r))
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter()
            .filter_map(|id| entries.remove(&id).map(|r| (id, r)))
            .collect()
    }

    /// Whether `id` is currently registered.
    pub async fn contains(&self, id: Uuid) -> bool {
        self.entries.read().await.contains_key(&id)
    }

    /// Snapshot of all registered resources.
    pub async fn values(&self) -> Vec<R> {
        self.entries.read().await.values().cloned().collect()
    }

    /// Snapshot of all registered ids.
    pub async fn ids(&self) -> Vec<Uuid> {
        self.entries.read().await.keys().copied().collect()
    }

    /// Number of registered entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl<R: Clone> Default for ResourceRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_insert_get_remove() {
        let registry = ResourceRegistry::new();
        let id = Uuid::new_v4();

        registry.insert(id, "terminal".to_string()).await;
        assert_eq!(registry.get(id).await, Some("terminal".to_string()));
        assert_eq!(registry.len().await, 1);

        assert_eq!(registry.remove(id).await, Some("terminal".to_string()));
        assert_eq!(registry.get(id).await, None);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_absent_is_none() {
        let registry: ResourceRegistry<String> = ResourceRegistry::new();
        assert_eq!(registry.remove(Uuid::new_v4()).await, None);
    }

    #[tokio::test]
    async fn test_concurrent_remove_takes_once() {
        // The at-most-once property: many racing removers, exactly one
        // receives the entry.
        let registry = Arc::new(ResourceRegistry::new());
        let id = Uuid::new_v4();
        registry.insert(id, "resource".to_string()).await;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(
                async move { registry.remove(id).await.is_some() },
            ));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_in_place() {
        let registry = ResourceRegistry::new();
        let id = Uuid::new_v4();
        registry.insert(id, 1u32).await;

        let updated = registry.update(id, |v| *v += 1).await;
        assert_eq!(updated, Some(2));
        assert_eq!(registry.get(id).await, Some(2));

        assert_eq!(registry.update(Uuid::new_v4(), |v| *v += 1).await, None);
    }

    #[tokio::test]
    async fn test_remove_where_drains_matching() {
        let registry = ResourceRegistry::new();
        let keep = Uuid::new_v4();
        registry.insert(Uuid::new_v4(), ("a", 1)).await;
        registry.insert(Uuid::new_v4(), ("a", 2)).await;
        registry.insert(keep, ("b", 3)).await;

        let drained = registry.remove_where(|(owner, _)| *owner == "a").await;
        assert_eq!(drained.len(), 2);
        assert_eq!(registry.len().await, 1);
        assert!(registry.contains(keep).await);

        // Draining again finds nothing.
        let drained = registry.remove_where(|(owner, _)| *owner == "a").await;
        assert!(drained.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_iteration() {
        let registry = ResourceRegistry::new();
        for i in 0..5u32 {
            registry.insert(Uuid::new_v4(), i).await;
        }

        let mut values = registry.values().await;
        values.sort_unstable();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
        assert_eq!(registry.ids().await.len(), 5);
    }
}
