//! 进程内存缓存

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};

use super::{capped_ttl_secs, CacheStore};
use crate::error::Result;

/// 内存缓存容量（键数）
const MEMORY_CAPACITY: u64 = 1024;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

/// 每个键使用写入时给定的 TTL，覆盖写入时重新计时
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// 基于 moka 的缓存，过期键由 moka 回收
#[derive(Clone)]
pub struct MemoryCacheStore {
    entries: Cache<String, Entry>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(MEMORY_CAPACITY)
                .expire_after(PerEntryTtl)
                .build(),
        }
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).await.map(|entry| entry.value))
    }

    async fn put(&self, key: &str, value: String, ttl_secs: u64) -> Result<()> {
        let ttl = Duration::from_secs(capped_ttl_secs(ttl_secs));
        self.entries.insert(key.to_string(), Entry { value, ttl }).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.invalidate(key).await;
        Ok(())
    }
}
