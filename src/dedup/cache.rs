//! # 缩略图缓存模块
//!
//! ## 设计思路
//!
//! 每次查重都要把图库里的已有图片重新拉取、解码一遍，代价很高。
//! 这里按图片地址缓存已提取的 `PixelBuffer`，条目超过最大存活时间后视为不存在。
//!
//! ## 实现思路
//!
//! - 单个 `Mutex<HashMap>`，每次 `get` / `set` 都是一次加锁的单键操作。
//! - 条目之间没有关联约束，锁中毒时直接取回内部数据继续使用。
//! - 过期判断在读取时进行，命中过期条目顺带删除。
//! - 时间源使用 `tokio::time::Instant`，测试里可以暂停并快进时钟。
//! - 缓存是显式对象，由调用方构造一次后注入查重器，不做全局单例。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use super::source::PixelBuffer;

struct CacheEntry {
    created_at: Instant,
    data: Arc<PixelBuffer>,
}

/// 带过期时间的缩略图缓存。
pub struct ImageDataCache {
    max_age: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl Default for ImageDataCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(30 * 60))
    }
}

impl ImageDataCache {
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// 读取未过期的缓存；过期条目会被顺带删除。
    pub fn get(&self, key: &str) -> Option<Arc<PixelBuffer>> {
        let mut entries = self.lock_entries();

        let entry = entries.get(key)?;
        if entry.created_at.elapsed() < self.max_age {
            return Some(Arc::clone(&entry.data));
        }

        entries.remove(key);
        log::debug!("⌛ 缓存条目已过期并移除");
        None
    }

    /// 无条件写入（覆盖同键旧值），以当前时间为起点计算存活期。
    pub fn set(&self, key: &str, data: Arc<PixelBuffer>) {
        self.lock_entries().insert(
            key.to_string(),
            CacheEntry {
                created_at: Instant::now(),
                data,
            },
        );
    }

    /// 清空全部条目。
    pub fn clear(&self) {
        self.lock_entries().clear();
    }

    /// 主动清理全部过期条目，返回清理数量。
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.created_at.elapsed() < self.max_age);
        before - entries.len()
    }

    /// 当前条目数（包含尚未被读到的过期条目）。
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            log::warn!("⚠️ 缩略图缓存锁已中毒，继续使用内部数据");
            PoisonError::into_inner(poisoned)
        })
    }
}
