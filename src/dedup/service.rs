//! # 上传服务层
//!
//! ## 设计思路
//!
//! `UploadService` 是上传弹窗面对的唯一入口，把查重器、预览登记表和当前图库快照
//! 组合在一起。服务层负责把内部错误翻译成用户能看懂的提示：
//! - 文件本身的问题（类型、为空、过大、无法解码）给出针对性提示
//! - 其他故障统一给出通用提示，根因只写日志
//!
//! ## 实现思路
//!
//! 对外仅暴露少量稳定 API：
//! - `upload_meme`：校验 + 查重 + 创建预览
//! - `cleanup`：释放预览句柄，永不失败
//! - `replace_gallery`：由外部元数据存储刷新图库快照
//! - `set_match_profile` / `match_profile`：切换与读取匹配档位

use std::sync::RwLock;

use bytes::Bytes;

use super::fetcher::{HttpImageFetcher, ImageFetcher};
use super::handler::DuplicateChecker;
use super::preview::{PreviewHandle, PreviewRegistry};
use super::source::{DuplicateCheckResult, ExistingImageRef, UploadFile, UploadOutcome};
use super::{DuplicateCheckConfig, ImageError, MatchProfile};

pub const DUPLICATE_MESSAGE: &str = "This meme has already been uploaded";
pub const INVALID_TYPE_MESSAGE: &str = "Invalid file type. Only images are allowed.";
pub const EMPTY_FILE_MESSAGE: &str = "File is empty";
pub const UNREADABLE_IMAGE_MESSAGE: &str =
    "Could not read image. The file may be corrupted or not a supported format.";
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to upload meme. Please try again.";

/// 上传服务状态。
pub struct UploadService<F> {
    checker: DuplicateChecker<F>,
    previews: PreviewRegistry,
    gallery: RwLock<Vec<ExistingImageRef>>,
}

impl UploadService<HttpImageFetcher> {
    /// 使用默认配置创建服务。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use meme_dedup::dedup::UploadService;
    ///
    /// let service = UploadService::new()?;
    /// # Ok::<(), meme_dedup::dedup::ImageError>(())
    /// ```
    pub fn new() -> Result<Self, ImageError> {
        Self::with_config(DuplicateCheckConfig::default())
    }

    /// 使用自定义配置创建服务。
    pub fn with_config(config: DuplicateCheckConfig) -> Result<Self, ImageError> {
        Ok(Self::from_checker(DuplicateChecker::with_http(config)?))
    }
}

impl<F: ImageFetcher> UploadService<F> {
    /// 基于已构建的查重器创建服务（测试可注入自定义拉取实现）。
    pub fn from_checker(checker: DuplicateChecker<F>) -> Self {
        Self {
            checker,
            previews: PreviewRegistry::new(),
            gallery: RwLock::new(Vec::new()),
        }
    }

    pub fn checker(&self) -> &DuplicateChecker<F> {
        &self.checker
    }

    /// 用外部存储的最新列表替换图库快照。
    pub fn replace_gallery(&self, images: Vec<ExistingImageRef>) -> Result<(), ImageError> {
        let mut gallery = self
            .gallery
            .write()
            .map_err(|_| ImageError::Internal("图库写入锁已中毒".to_string()))?;
        log::debug!("📚 图库快照已更新：{} -> {} 张", gallery.len(), images.len());
        *gallery = images;
        Ok(())
    }

    pub fn gallery(&self) -> Result<Vec<ExistingImageRef>, ImageError> {
        self.gallery
            .read()
            .map(|gallery| gallery.clone())
            .map_err(|_| ImageError::Internal("图库读取锁已中毒".to_string()))
    }

    /// 对当前图库快照执行查重。
    pub async fn check_for_duplicates(
        &self,
        file: &UploadFile,
    ) -> Result<DuplicateCheckResult, ImageError> {
        let gallery = self.gallery()?;
        self.checker.check_for_duplicates(file, &gallery).await
    }

    /// 上传前置流程：校验 + 查重 + 创建预览。
    ///
    /// 从不返回 `Err`，所有失败都折叠进 `UploadOutcome`。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use meme_dedup::dedup::{UploadFile, UploadService};
    ///
    /// # async fn demo() -> Result<(), meme_dedup::dedup::ImageError> {
    /// let service = UploadService::new()?;
    /// let outcome = service
    ///     .upload_meme(&UploadFile::new("image/png", std::fs::read("cat.png").unwrap_or_default()))
    ///     .await;
    /// if let Some(preview) = outcome.preview {
    ///     service.cleanup(preview);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn upload_meme(&self, file: &UploadFile) -> UploadOutcome {
        match self.check_for_duplicates(file).await {
            Ok(DuplicateCheckResult {
                duplicate_of: Some(existing),
                ..
            }) => {
                log::info!(
                    "🚫 上传被拒绝：{} 与已有图片 {} 重复",
                    file.log_label(),
                    existing.id
                );
                UploadOutcome::duplicate(existing)
            }
            Ok(_) => match self.previews.create(&file.normalized_mime(), file.bytes.clone()) {
                Ok(preview) => {
                    log::info!("📤 {} 通过查重，已创建预览 {}", file.log_label(), preview.url());
                    UploadOutcome::accepted(preview)
                }
                Err(err) => {
                    log::error!("❌ 创建预览失败：{}", err);
                    UploadOutcome::failed(GENERIC_FAILURE_MESSAGE, err.code())
                }
            },
            Err(err) => {
                if err.is_user_input_error() {
                    log::warn!(
                        "⚠️ 上传文件 {} 未通过校验 [{}@{}]：{}",
                        file.log_label(),
                        err.code(),
                        err.stage(),
                        err
                    );
                } else {
                    log::error!(
                        "❌ 上传查重失败 [{}@{}]：{}",
                        err.code(),
                        err.stage(),
                        err
                    );
                }
                UploadOutcome::failed(user_message(&err), err.code())
            }
        }
    }

    /// 释放预览句柄；未知句柄只记日志。
    pub fn cleanup(&self, handle: PreviewHandle) -> bool {
        self.previews.release(handle)
    }

    /// 读取预览对应的 MIME 与字节。
    pub fn preview_bytes(&self, handle: &PreviewHandle) -> Option<(String, Bytes)> {
        self.previews.resolve(handle)
    }

    /// 尚未释放的预览数量。
    pub fn active_previews(&self) -> usize {
        self.previews.active()
    }

    /// 按名称切换匹配档位（strict / balanced / lenient）。
    pub fn set_match_profile(&self, profile: &str) -> Result<(), ImageError> {
        let profile = MatchProfile::from_str(profile)?;
        self.checker.set_match_profile(profile)
    }

    pub fn match_profile(&self) -> Result<String, ImageError> {
        self.checker
            .match_profile()
            .map(|profile| profile.as_str().to_string())
    }
}

/// 将内部错误翻译为面向用户的提示。
fn user_message(err: &ImageError) -> String {
    match err {
        ImageError::InvalidType(_) => INVALID_TYPE_MESSAGE.to_string(),
        ImageError::EmptyFile => EMPTY_FILE_MESSAGE.to_string(),
        ImageError::FileTooLarge { limit, .. } => format!(
            "File is too large. Maximum size is {} MB.",
            limit / (1024 * 1024)
        ),
        ImageError::Decode(_) | ImageError::ResourceLimit(_) => {
            UNREADABLE_IMAGE_MESSAGE.to_string()
        }
        _ => GENERIC_FAILURE_MESSAGE.to_string(),
    }
}
