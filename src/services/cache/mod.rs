//! 键值缓存存储
//!
//! 运行中间状态（基金列表、批结果、进度）和最终报告都存放在这里。
//! 值统一为 JSON 字符串，带 TTL（秒）。

mod file;
mod memory;

pub use file::FileCacheStore;
pub use memory::MemoryCacheStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{PremiumError, Result};

/// 本轮运行的基金列表
pub const FUND_LIST_KEY: &str = "lof:fund_list";
/// 本轮运行累积的批处理结果
pub const BATCH_RESULTS_KEY: &str = "lof:batch_results";
/// 本轮运行的进度
pub const PROGRESS_KEY: &str = "lof:progress";
/// 最终计算报告
pub const REPORT_KEY: &str = "lof:premium_result";

/// TTL 上限（约 100 年），更大的值按上限处理
pub const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 3600;

pub(crate) fn capped_ttl_secs(ttl_secs: u64) -> u64 {
    ttl_secs.min(MAX_TTL_SECS)
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// 读取未过期的值
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn put(&self, key: &str, value: String, ttl_secs: u64) -> Result<()>;

    /// 删除键，键不存在时也返回成功
    async fn delete(&self, key: &str) -> Result<()>;
}

/// 读取并反序列化 JSON 值
pub async fn get_json<T: DeserializeOwned>(store: &dyn CacheStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| PremiumError::Cache(format!("反序列化 {} 失败: {}", key, e))),
        None => Ok(None),
    }
}

/// 序列化并写入 JSON 值
pub async fn put_json<T: Serialize + ?Sized>(
    store: &dyn CacheStore,
    key: &str,
    value: &T,
    ttl_secs: u64,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.put(key, raw, ttl_secs).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BatchProgress;

    #[tokio::test]
    async fn test_json_helpers_roundtrip_progress() {
        let store = MemoryCacheStore::new();
        let progress = BatchProgress::running(12, 10, chrono::Utc::now());

        put_json(&store, PROGRESS_KEY, &progress, 60).await.unwrap();
        let loaded: Option<BatchProgress> = get_json(&store, PROGRESS_KEY).await.unwrap();
        assert_eq!(loaded, Some(progress));
    }

    #[tokio::test]
    async fn test_get_json_rejects_garbage() {
        let store = MemoryCacheStore::new();
        store.put(PROGRESS_KEY, "not json".to_string(), 60).await.unwrap();

        let result: Result<Option<BatchProgress>> = get_json(&store, PROGRESS_KEY).await;
        assert!(matches!(result, Err(PremiumError::Cache(_))));
    }

    #[test]
    fn test_ttl_is_capped() {
        assert_eq!(capped_ttl_secs(60), 60);
        assert_eq!(capped_ttl_secs(u64::MAX), MAX_TTL_SECS);
    }
}
