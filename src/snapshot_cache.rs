use std::sync::Arc;
use tokio::sync::Mutex;

/// Holder for the most recent batch of records of one type
///
/// The batch is replaced wholesale on every ingestion cycle and readers always
/// receive their own copy, so filtering and decoding never run under the lock
/// and a reader can never observe half of one batch and half of the next.
pub struct SnapshotCache<T> {
    data: Mutex<Arc<Vec<T>>>,
}

impl<T: Clone> SnapshotCache<T> {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(Arc::new(Vec::new())),
        }
    }

    /// Replace the cached batch with a new one
    pub async fn set(&self, items: Vec<T>) {
        let batch = Arc::new(items);
        let mut data = self.data.lock().await;
        *data = batch;
    }

    /// Get a copy of up to `limit` cached items in stored order (0 = all)
    pub async fn get(&self, limit: usize) -> Vec<T> {
        // Only the pointer is copied under the lock; the clone of the items
        // happens on a batch no writer can touch anymore
        let batch = Arc::clone(&*self.data.lock().await);
        let take = if limit == 0 {
            batch.len()
        } else {
            limit.min(batch.len())
        };
        batch[..take].to_vec()
    }

    /// Number of items in the cached batch
    pub async fn len(&self) -> usize {
        self.data.lock().await.len()
    }

    /// True if no batch was ever set or the last batch was empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop the cached batch
    pub async fn clear(&self) {
        self.set(Vec::new()).await;
    }
}

impl<T: Clone> Default for SnapshotCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_cache_is_empty() {
        let cache: SnapshotCache<u32> = SnapshotCache::new();
        assert!(cache.is_empty().await);
        assert_eq!(cache.get(0).await, Vec::<u32>::new());
    }

    #[tokio::test]
    async fn test_get_returns_batch_in_order() {
        let cache = SnapshotCache::new();
        cache.set(vec![3, 1, 2]).await;
        assert_eq!(cache.get(0).await, vec![3, 1, 2]);
        assert_eq!(cache.len().await, 3);
        assert!(!cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_get_with_limit() {
        let cache = SnapshotCache::new();
        cache.set(vec![1, 2, 3, 4]).await;
        assert_eq!(cache.get(2).await, vec![1, 2]);
        assert_eq!(cache.get(10).await, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_mutating_copy_does_not_change_cache() {
        let cache = SnapshotCache::new();
        cache.set(vec!["a".to_string(), "b".to_string()]).await;

        let mut copy = cache.get(0).await;
        copy[0].push_str("-changed");
        copy.push("c".to_string());

        assert_eq!(cache.get(0).await, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_set_replaces_instead_of_merging() {
        let cache = SnapshotCache::new();
        cache.set(vec![1, 2, 3]).await;
        let before = cache.get(0).await;
        cache.set(vec![9]).await;

        assert_eq!(cache.get(0).await, vec![9]);
        // Copies taken earlier keep the old batch
        assert_eq!(before, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_empty_batch_marks_cache_empty() {
        let cache = SnapshotCache::new();
        cache.set(vec![1]).await;
        cache.set(Vec::new()).await;
        assert!(cache.is_empty().await);

        cache.set(vec![1]).await;
        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_readers_see_whole_batches() {
        let cache = Arc::new(SnapshotCache::new());
        cache.set(vec![0u32; 100]).await;

        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for n in 1..50u32 {
                    cache.set(vec![n; 100]).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut readers = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let batch = cache.get(0).await;
                    assert_eq!(batch.len(), 100);
                    assert!(batch.iter().all(|v| *v == batch[0]));
                    tokio::task::yield_now().await;
                }
            }));
        }

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }
}
