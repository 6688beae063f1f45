//! JSON 文件缓存
//!
//! 每个键对应目录下的一个文件，内容为带过期时间的信封。
//! 适合多次独立进程调用之间保存运行进度。

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{capped_ttl_secs, CacheStore};
use crate::error::{PremiumError, Result};

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    expires_at: DateTime<Utc>,
    value: String,
}

#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    /// 创建存储目录（如不存在）
    pub async fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        log::info!("📁 文件缓存目录: {}", dir.display());
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

/// 写入时刻加上 TTL；TTL 过大时按上限截断
fn expiry_after(now: DateTime<Utc>, ttl_secs: u64) -> DateTime<Utc> {
    let secs = i64::try_from(capped_ttl_secs(ttl_secs)).unwrap_or(i64::MAX);
    Duration::try_seconds(secs)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(now)
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let envelope: Envelope = serde_json::from_str(&raw)
            .map_err(|e| PremiumError::Cache(format!("缓存文件 {} 损坏: {}", path.display(), e)))?;

        if envelope.expires_at <= Utc::now() {
            self.delete(key).await?;
            return Ok(None);
        }
        Ok(Some(envelope.value))
    }

    async fn put(&self, key: &str, value: String, ttl_secs: u64) -> Result<()> {
        let envelope = Envelope {
            expires_at: expiry_after(Utc::now(), ttl_secs),
            value,
        };
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");

        // 先写临时文件再 rename，避免读到半截内容
        tokio::fs::write(&tmp, serde_json::to_vec(&envelope)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
