//! 进程内缓存后端
//!
//! 未配置 Redis 时使用。基于 `dashmap` 分片，单个键的读写互不阻塞其他键。
//! 同时提供进程内的 [`DistributedLock`] 实现，语义与 Redis 版一致。

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use stockbridge_errors::{AppError, AppResult};
use stockbridge_ports::{CachePort, DistributedLock};

#[derive(Debug)]
struct Expiring<T> {
    value: T,
    expires_at: Option<Instant>,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|t| Instant::now() + t),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// 内存缓存
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    values: DashMap<String, Expiring<String>>,
    hashes: DashMap<String, Expiring<DashMap<String, String>>>,
    /// 锁键 -> 持有者
    locks: DashMap<String, Expiring<String>>,
    unavailable: AtomicBool,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟后端故障，之后的所有操作都返回 `AppError::Cache`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::cache("内存缓存被标记为不可用"));
        }
        Ok(())
    }

    fn purge_expired(&self, key: &str) {
        self.values.remove_if(key, |_, v| v.is_expired());
        self.hashes.remove_if(key, |_, v| v.is_expired());
    }
}

#[async_trait]
impl CachePort for MemoryCacheStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.check()?;
        self.purge_expired(key);
        Ok(self.values.get(key).map(|v| v.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        self.check()?;
        self.values
            .insert(key.to_string(), Expiring::new(value.to_string(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.check()?;
        self.values.remove(key);
        self.hashes.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        self.check()?;
        self.purge_expired(key);
        Ok(self.values.contains_key(key) || self.hashes.contains_key(key))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<()> {
        self.check()?;
        let at = Some(Instant::now() + ttl);
        if let Some(mut v) = self.values.get_mut(key) {
            v.expires_at = at;
        }
        if let Some(mut h) = self.hashes.get_mut(key) {
            h.expires_at = at;
        }
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> AppResult<Option<String>> {
        self.check()?;
        self.purge_expired(key);
        Ok(self
            .hashes
            .get(key)
            .and_then(|h| h.value.get(field).map(|v| v.value().clone())))
    }

    async fn hash_get_many(&self, key: &str, fields: &[String]) -> AppResult<Vec<Option<String>>> {
        self.check()?;
        self.purge_expired(key);
        let Some(hash) = self.hashes.get(key) else {
            return Ok(vec![None; fields.len()]);
        };
        Ok(fields
            .iter()
            .map(|f| hash.value.get(f).map(|v| v.value().clone()))
            .collect())
    }

    async fn hash_set_many(&self, key: &str, entries: &[(String, String)]) -> AppResult<()> {
        self.check()?;
        self.purge_expired(key);
        let hash = self
            .hashes
            .entry(key.to_string())
            .or_insert_with(|| Expiring::new(DashMap::new(), None));
        for (field, value) in entries {
            hash.value.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn hash_len(&self, key: &str) -> AppResult<u64> {
        self.check()?;
        self.purge_expired(key);
        Ok(self.hashes.get(key).map(|h| h.value.len() as u64).unwrap_or(0))
    }

    async fn ping(&self) -> AppResult<()> {
        self.check()
    }
}

#[async_trait]
impl DistributedLock for MemoryCacheStore {
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> AppResult<bool> {
        self.check()?;
        match self.locks.entry(key.to_string()) {
            Entry::Occupied(mut held) if held.get().is_expired() => {
                held.insert(Expiring::new(owner.to_string(), Some(ttl)));
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(Expiring::new(owner.to_string(), Some(ttl)));
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str, owner: &str) -> AppResult<bool> {
        self.check()?;
        Ok(self.locks.remove_if(key, |_, held| held.value == owner).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_operations() {
        let store = MemoryCacheStore::new();
        store
            .hash_set_many("h", &[("a".into(), "1".into()), ("b".into(), "2".into())])
            .await
            .unwrap();

        assert_eq!(store.hash_get("h", "a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(
            store
                .hash_get_many("h", &["b".into(), "z".into()])
                .await
                .unwrap(),
            vec![Some("2".to_string()), None]
        );
        assert_eq!(store.hash_len("h").await.unwrap(), 2);

        store.delete("h").await.unwrap();
        assert_eq!(store.hash_len("h").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_value_is_gone() {
        let store = MemoryCacheStore::new();
        store
            .set("k", "v", Some(Duration::from_millis(0)))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_and_owner_checked() {
        let store = MemoryCacheStore::new();
        let ttl = Duration::from_secs(30);

        assert!(store.try_acquire("ABC-1", "worker-a", ttl).await.unwrap());
        assert!(!store.try_acquire("ABC-1", "worker-b", ttl).await.unwrap());
        assert!(store.try_acquire("ABC-2", "worker-b", ttl).await.unwrap());

        // 非持有者不能释放
        assert!(!store.release("ABC-1", "worker-b").await.unwrap());
        assert!(store.release("ABC-1", "worker-a").await.unwrap());
        assert!(store.try_acquire("ABC-1", "worker-b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_lock_can_be_taken_over() {
        let store = MemoryCacheStore::new();
        assert!(store.try_acquire("ABC-1", "worker-a", Duration::ZERO).await.unwrap());
        assert!(store.try_acquire("ABC-1", "worker-b", Duration::from_secs(30)).await.unwrap());
        // 过期持有者的释放不影响新持有者
        assert!(!store.release("ABC-1", "worker-a").await.unwrap());
        assert!(!store.try_acquire("ABC-1", "worker-c", Duration::from_secs(30)).await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = MemoryCacheStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.ping().await, Err(AppError::Cache(_))));
    }
}
