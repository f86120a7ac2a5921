//! # 预览句柄登记表
//!
//! ## 设计思路
//!
//! 上传弹窗在真正写入存储前需要先展示本地预览。预览字节由登记表持有，
//! 调用方只拿到一个不可克隆的 `PreviewHandle`，关闭弹窗时必须交还给
//! `release` 才会释放。句柄被丢弃并不会自动释放，泄漏可通过 `active()` 观察。

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use serde::Serialize;

use super::ImageError;

const PREVIEW_URL_PREFIX: &str = "blob:meme-dedup/";

/// 本地预览句柄。
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct PreviewHandle {
    id: u64,
    url: String,
}

impl PreviewHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// UI 可直接引用的本地地址。
    pub fn url(&self) -> &str {
        &self.url
    }
}

struct PreviewEntry {
    mime_type: String,
    bytes: Bytes,
}

/// 预览资源登记表。
pub struct PreviewRegistry {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, PreviewEntry>>,
}

impl Default for PreviewRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// 登记一份预览字节并返回句柄。
    pub fn create(&self, mime_type: &str, bytes: Bytes) -> Result<PreviewHandle, ImageError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ImageError::Internal("预览登记表锁已中毒".to_string()))?;

        entries.insert(
            id,
            PreviewEntry {
                mime_type: mime_type.to_string(),
                bytes,
            },
        );

        log::debug!("🖼️ 创建预览句柄 #{}（当前 {} 个）", id, entries.len());

        Ok(PreviewHandle {
            id,
            url: format!("{}{}", PREVIEW_URL_PREFIX, id),
        })
    }

    /// 读取句柄对应的字节与 MIME，供 UI 渲染。
    pub fn resolve(&self, handle: &PreviewHandle) -> Option<(String, Bytes)> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(&handle.id)
            .map(|entry| (entry.mime_type.clone(), entry.bytes.clone()))
    }

    /// 释放句柄，返回是否确实释放了资源。
    ///
    /// 未知句柄或锁异常只记日志，不向调用方报错。
    pub fn release(&self, handle: PreviewHandle) -> bool {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(_) => {
                log::error!("❌ 释放预览 {} 失败：登记表锁已中毒", handle.url);
                return false;
            }
        };

        if entries.remove(&handle.id).is_some() {
            log::debug!("🧹 已释放预览 {}", handle.url);
            true
        } else {
            log::warn!("⚠️ 预览 {} 不存在或已释放", handle.url);
            false
        }
    }

    /// 当前尚未释放的预览数量。
    pub fn active(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }
}
