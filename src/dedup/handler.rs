//! # 查重编排模块
//!
//! ## 设计思路
//!
//! `DuplicateChecker` 只负责流程编排与配置管理，不关心图库从哪里来、图片怎么存。
//! 处理链路固定为：
//! 1. 读取配置快照
//! 2. 校验上传文件（类型 / 非空 / 体积），失败直接返回，不解码不联网
//! 3. 提取上传图缩略图
//! 4. 按 `batch_size` 分批扫描图库：批内并发，批间串行
//! 5. 每批结束后按批内顺序取第一张命中的图，命中即停止后续批次
//!
//! ## 实现思路
//!
//! - 配置放在 `RwLock` 里支持运行时切档；单次扫描内使用同一份快照。
//! - 解码放到 `spawn_blocking`，不阻塞异步 worker。
//! - 候选图先查缓存（键含缩略参数），未命中再拉取；只对网络类错误做固定间隔重试。
//! - 单个候选图失败只记日志并跳过，不影响其他候选。
//! - 记录 `decode/scan/total` 阶段耗时与跳过数量，便于排查。

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::future::join_all;

use super::cache::ImageDataCache;
use super::compare::{MatchPolicy, compare};
use super::config::ALLOWED_MIME_TYPES;
use super::fetcher::{HttpImageFetcher, ImageFetcher, redact_url_for_log};
use super::source::{DuplicateCheckResult, ExistingImageRef, PixelBuffer, UploadFile};
use super::thumbnail::extract_thumbnail;
use super::{DuplicateCheckConfig, ImageError, MatchProfile};

/// 图库查重器。
///
/// 持有配置、缩略图缓存与候选图拉取实现。
pub struct DuplicateChecker<F> {
    config: RwLock<DuplicateCheckConfig>,
    cache: Arc<ImageDataCache>,
    fetcher: F,
}

impl DuplicateChecker<HttpImageFetcher> {
    /// 使用 HTTP 拉取与独立缓存创建查重器。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use meme_dedup::dedup::{DuplicateCheckConfig, DuplicateChecker};
    ///
    /// let checker = DuplicateChecker::with_http(DuplicateCheckConfig::default())?;
    /// # Ok::<(), meme_dedup::dedup::ImageError>(())
    /// ```
    pub fn with_http(config: DuplicateCheckConfig) -> Result<Self, ImageError> {
        let fetcher = HttpImageFetcher::new(&config)?;
        let cache = Arc::new(ImageDataCache::new(config.cache_max_age()));
        Self::new(config, cache, fetcher)
    }
}

impl<F: ImageFetcher> DuplicateChecker<F> {
    /// 注入缓存与拉取实现创建查重器；配置非法时直接拒绝。
    pub fn new(
        config: DuplicateCheckConfig,
        cache: Arc<ImageDataCache>,
        fetcher: F,
    ) -> Result<Self, ImageError> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(config),
            cache,
            fetcher,
        })
    }

    pub fn cache(&self) -> &Arc<ImageDataCache> {
        &self.cache
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// 获取配置快照，保证单次扫描使用一致参数。
    pub fn config_snapshot(&self) -> Result<DuplicateCheckConfig, ImageError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| ImageError::Internal("配置读取锁已中毒".to_string()))
    }

    /// 切换匹配档位。
    pub fn set_match_profile(&self, profile: MatchProfile) -> Result<(), ImageError> {
        let mut config = self
            .config
            .write()
            .map_err(|_| ImageError::Internal("配置写入锁已中毒".to_string()))?;
        config.apply_match_profile(profile);

        log::info!(
            "⚙️ 已切换匹配档位：{}（tolerance={}, threshold={}）",
            profile.as_str(),
            config.channel_tolerance,
            config.similarity_threshold
        );

        Ok(())
    }

    /// 获取当前生效档位。
    pub fn match_profile(&self) -> Result<MatchProfile, ImageError> {
        let config = self
            .config
            .read()
            .map_err(|_| ImageError::Internal("配置读取锁已中毒".to_string()))?;
        Ok(config.infer_match_profile())
    }

    /// 查重主入口：校验上传文件，再对图库分批扫描。
    ///
    /// 图库为空时直接返回未重复；命中时返回批扫描顺序中的第一张。
    pub async fn check_for_duplicates(
        &self,
        file: &UploadFile,
        existing: &[ExistingImageRef],
    ) -> Result<DuplicateCheckResult, ImageError> {
        let config = Arc::new(self.config_snapshot()?);
        validate_upload(file, &config)?;

        match config.scan_timeout_ms {
            Some(limit_ms) => tokio::time::timeout(
                Duration::from_millis(limit_ms),
                self.scan(file, existing, &config),
            )
            .await
            .map_err(|_| ImageError::Timeout(format!("查重扫描超时（{}毫秒）", limit_ms)))?,
            None => self.scan(file, existing, &config).await,
        }
    }

    async fn scan(
        &self,
        file: &UploadFile,
        existing: &[ExistingImageRef],
        config: &Arc<DuplicateCheckConfig>,
    ) -> Result<DuplicateCheckResult, ImageError> {
        let total_start = Instant::now();

        let decode_start = Instant::now();
        let upload = extract_off_thread(file.bytes.clone(), Arc::clone(config)).await?;
        let decode_elapsed = decode_start.elapsed();

        let policy = MatchPolicy::from(config.as_ref());
        let scan_start = Instant::now();
        let mut compared = 0usize;
        let mut skipped = 0usize;

        for (batch_index, batch) in existing.chunks(config.batch_size).enumerate() {
            let loaded = join_all(
                batch
                    .iter()
                    .map(|candidate| self.load_candidate(candidate, config)),
            )
            .await;

            let mut matched = None;
            for (candidate, data) in batch.iter().zip(loaded) {
                let Some(data) = data else {
                    skipped += 1;
                    continue;
                };
                compared += 1;
                if matched.is_none() && compare(&upload, &data, &policy) {
                    matched = Some(candidate);
                }
            }

            if let Some(candidate) = matched {
                log::info!(
                    "🔁 检测到重复 - 上传: {} 命中: {}（第 {} 批）decode={}ms scan={}ms total={}ms",
                    file.log_label(),
                    candidate.id,
                    batch_index + 1,
                    decode_elapsed.as_millis(),
                    scan_start.elapsed().as_millis(),
                    total_start.elapsed().as_millis()
                );
                return Ok(DuplicateCheckResult::duplicate(candidate.clone()));
            }
        }

        if skipped > 0 {
            log::warn!("⚠️ {} 张候选图无法获取，已跳过", skipped);
        }
        log::info!(
            "✅ 未发现重复 - 上传: {} 比较 {} 张 跳过 {} 张 decode={}ms scan={}ms total={}ms",
            file.log_label(),
            compared,
            skipped,
            decode_elapsed.as_millis(),
            scan_start.elapsed().as_millis(),
            total_start.elapsed().as_millis()
        );

        Ok(DuplicateCheckResult::clear())
    }

    /// 获取候选图缩略图：缓存 → 拉取（含重试）→ 解码 → 回填缓存。
    ///
    /// 任一环节失败返回 `None`，由调用方计入跳过。
    async fn load_candidate(
        &self,
        candidate: &ExistingImageRef,
        config: &Arc<DuplicateCheckConfig>,
    ) -> Option<Arc<PixelBuffer>> {
        let cache_key = config.thumbnail_cache_key(&candidate.source_url);
        if let Some(hit) = self.cache.get(&cache_key) {
            return Some(hit);
        }

        let bytes = match self.fetch_with_retry(&candidate.source_url, config).await {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!(
                    "⚠️ 候选图 {} 拉取失败，跳过：{} [{}]",
                    candidate.id,
                    err,
                    err.code()
                );
                return None;
            }
        };

        match extract_off_thread(bytes, Arc::clone(config)).await {
            Ok(buffer) => {
                let buffer = Arc::new(buffer);
                self.cache.set(&cache_key, Arc::clone(&buffer));
                Some(buffer)
            }
            Err(err) => {
                log::warn!("⚠️ 候选图 {} 解码失败，跳过：{}", candidate.id, err);
                None
            }
        }
    }

    /// 固定间隔重试；只有网络类错误才会重试，最后一次失败后不再等待。
    async fn fetch_with_retry(
        &self,
        url: &str,
        config: &DuplicateCheckConfig,
    ) -> Result<Bytes, ImageError> {
        let mut attempt = 1;
        loop {
            match self.fetcher.fetch(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(err) if err.is_retryable_fetch() && attempt < config.max_fetch_attempts => {
                    log::debug!(
                        "🔄 拉取失败，{}ms 后重试（{}/{}）- URL: {} 错误: {}",
                        config.fetch_retry_delay_ms,
                        attempt,
                        config.max_fetch_attempts,
                        redact_url_for_log(url),
                        err
                    );
                    tokio::time::sleep(config.fetch_retry_delay()).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// 上传文件校验：白名单 MIME、非空、体积上限。
pub fn validate_upload(file: &UploadFile, config: &DuplicateCheckConfig) -> Result<(), ImageError> {
    let mime = file.normalized_mime();
    if !ALLOWED_MIME_TYPES.contains(&mime.as_str()) {
        return Err(ImageError::InvalidType(file.mime_type.clone()));
    }
    if file.is_empty() {
        return Err(ImageError::EmptyFile);
    }
    if file.len() > config.max_file_size {
        return Err(ImageError::FileTooLarge {
            size: file.len(),
            limit: config.max_file_size,
        });
    }
    Ok(())
}

async fn extract_off_thread(
    bytes: Bytes,
    config: Arc<DuplicateCheckConfig>,
) -> Result<PixelBuffer, ImageError> {
    tokio::task::spawn_blocking(move || extract_thumbnail(&bytes, &config))
        .await
        .map_err(|e| ImageError::Internal(format!("解码任务异常退出：{}", e)))?
}
