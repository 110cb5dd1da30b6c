use anyhow::Result;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;

const CATEGORY: &str = "research";

/// 研究结果缓存
///
/// One JSON file per `(topic, request)` pair, keyed by the MD5 of
/// `"{topic}_{request}"`. Expired entries are removed on read.
#[derive(Debug, Clone)]
pub struct ResearchCache {
    config: CacheConfig,
}

/// 缓存条目
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: u64,
    pub cache_key: String,
    pub topic: String,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

impl ResearchCache {
    pub fn new(config: CacheConfig) -> Self {
        Self { config }
    }

    /// 生成缓存键
    pub fn cache_key(topic: &str, request: &str) -> String {
        let mut hasher = Md5::new();
        hasher.update(format!("{}_{}", topic, request).as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn cache_path(&self, key: &str) -> PathBuf {
        self.config
            .cache_dir
            .join(CATEGORY)
            .join(format!("{}.json", key))
    }

    fn is_expired(&self, timestamp: u64) -> bool {
        let expire_seconds = self.config.expire_hours * 3600;
        now_secs().saturating_sub(timestamp) > expire_seconds
    }

    /// 获取缓存；读取或反序列化失败视为未命中
    pub async fn get<T>(&self, topic: &str, request: &str) -> Result<Option<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        if !self.config.enabled {
            return Ok(None);
        }

        let key = Self::cache_key(topic, request);
        let path = self.cache_path(&key);
        if !path.exists() {
            debug!("缓存未命中: {}", key);
            return Ok(None);
        }

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("⚠️ 读取缓存文件失败: {}", e);
                return Ok(None);
            }
        };

        match serde_json::from_str::<CacheEntry<T>>(&content) {
            Ok(entry) if self.is_expired(entry.timestamp) => {
                match fs::remove_file(&path).await {
                    Ok(()) => info!("🗑️ 缓存已过期: {}", topic),
                    // 并发读取时可能已被其他任务删除
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => warn!("⚠️ 删除过期缓存失败: {}", e),
                }
                Ok(None)
            }
            Ok(entry) => {
                info!("💾 命中研究缓存: {}", topic);
                Ok(Some(entry.data))
            }
            Err(e) => {
                warn!("⚠️ 缓存反序列化失败: {}", e);
                Ok(None)
            }
        }
    }

    /// 写入缓存
    pub async fn set<T>(&self, topic: &str, request: &str, data: &T) -> Result<()>
    where
        T: Serialize,
    {
        if !self.config.enabled {
            return Ok(());
        }

        let key = Self::cache_key(topic, request);
        let path = self.cache_path(&key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let entry = CacheEntry {
            data,
            timestamp: now_secs(),
            cache_key: key,
            topic: topic.to_string(),
        };
        fs::write(&path, serde_json::to_string_pretty(&entry)?).await?;
        debug!("缓存已写入: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache(dir: &TempDir, enabled: bool) -> ResearchCache {
        ResearchCache::new(CacheConfig {
            enabled,
            cache_dir: dir.path().to_path_buf(),
            expire_hours: 24,
        })
    }

    #[test]
    fn test_cache_key_is_md5_of_topic_and_request() {
        assert_eq!(
            ResearchCache::cache_key("a", "b"),
            format!("{:x}", Md5::digest(b"a_b"))
        );
        assert_eq!(ResearchCache::cache_key("a", "b").len(), 32);
        assert_ne!(
            ResearchCache::cache_key("EV", "charging"),
            ResearchCache::cache_key("EV charging", "")
        );
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, true);

        cache
            .set("EV charging", "full report", &vec!["a".to_string()])
            .await
            .unwrap();

        let hit: Option<Vec<String>> = cache.get("EV charging", "full report").await.unwrap();
        assert_eq!(hit, Some(vec!["a".to_string()]));
        let miss: Option<Vec<String>> = cache.get("EV charging", "other").await.unwrap();
        assert_eq!(miss, None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_removed() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, true);
        let key = ResearchCache::cache_key("topic", "request");
        let path = cache.cache_path(&key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let entry = CacheEntry {
            data: "stale".to_string(),
            timestamp: now_secs() - 25 * 3600,
            cache_key: key,
            topic: "topic".to_string(),
        };
        std::fs::write(&path, serde_json::to_string(&entry).unwrap()).unwrap();

        let result: Option<String> = cache.get("topic", "request").await.unwrap();

        assert_eq!(result, None);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_concurrent_reads_of_expired_entry_are_misses() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, true);
        let key = ResearchCache::cache_key("topic", "request");
        let path = cache.cache_path(&key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();

        for _ in 0..20 {
            let entry = CacheEntry {
                data: "stale".to_string(),
                timestamp: now_secs() - 25 * 3600,
                cache_key: key.clone(),
                topic: "topic".to_string(),
            };
            std::fs::write(&path, serde_json::to_string(&entry).unwrap()).unwrap();

            let (first, second) = tokio::join!(
                cache.get::<String>("topic", "request"),
                cache.get::<String>("topic", "request")
            );

            assert_eq!(first.unwrap(), None);
            assert_eq!(second.unwrap(), None);
            assert!(!path.exists());
        }
    }

    #[tokio::test]
    async fn test_disabled_cache_never_hits() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, false);

        cache.set("topic", "request", &1u32).await.unwrap();
        let result: Option<u32> = cache.get("topic", "request").await.unwrap();

        assert_eq!(result, None);
        assert!(!dir.path().join(CATEGORY).exists());
    }

    #[tokio::test]
    async fn test_corrupted_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir, true);
        let path = cache.cache_path(&ResearchCache::cache_key("topic", "request"));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();

        let result: Option<u32> = cache.get("topic", "request").await.unwrap();
        assert_eq!(result, None);
    }
}
