//! # 图片查重模块（dedup）
//!
//! ## 设计思路
//!
//! 该模块将“上传校验 → 缩略图提取 → 分批拉取图库 → 像素比较 → 预览管理”
//! 按职责拆分为多个子模块，避免单文件膨胀与耦合。
//!
//! - `service`：上传弹窗面对的服务入口（`UploadService`）
//! - `handler`：编排校验与分批扫描（`DuplicateChecker`）
//! - `fetcher`：候选图拉取抽象与 HTTP 实现
//! - `thumbnail`：解码、像素限制、降采样
//! - `compare`：容差 + 阈值的像素比较
//! - `cache`：按 URL 缓存缩略图，带过期时间
//! - `preview`：预览句柄登记与释放
//! - `config/error/source`：配置、错误、中间数据模型
//!
//! ## 新同事快速上手
//!
//! ```text
//! 上传弹窗
//!    ↓
//! service.rs（upload_meme / cleanup，错误翻译为用户提示）
//!    ↓
//! handler.rs（校验 + 分批扫描 + 阶段耗时日志）
//!    ├─ thumbnail.rs（解码 + 像素限制 + 降采样）
//!    ├─ cache.rs（命中则跳过拉取与解码）
//!    ├─ fetcher.rs（拉取候选图，失败由 handler 重试）
//!    └─ compare.rs（逐像素比较）
//!    ↓
//! UploadOutcome（含 PreviewHandle）
//! ```
//!
//! ## 分层职责建议
//!
//! - 阈值、批大小等策略变更优先改 `config.rs`
//! - 扫描顺序、重试、短路逻辑变更优先改 `handler.rs`
//! - 用户提示文案变更优先改 `service.rs`

mod cache;
mod compare;
mod config;
mod error;
mod fetcher;
mod handler;
mod preview;
mod service;
mod source;
mod thumbnail;

pub use cache::ImageDataCache;
pub use compare::{MatchPolicy, compare, similarity};
pub use config::{ALLOWED_MIME_TYPES, DuplicateCheckConfig, MatchProfile};
pub use error::ImageError;
pub use fetcher::{HttpImageFetcher, ImageFetcher};
pub use handler::{DuplicateChecker, validate_upload};
pub use preview::{PreviewHandle, PreviewRegistry};
pub use service::{
    DUPLICATE_MESSAGE,
    EMPTY_FILE_MESSAGE,
    GENERIC_FAILURE_MESSAGE,
    INVALID_TYPE_MESSAGE,
    UNREADABLE_IMAGE_MESSAGE,
    UploadService,
};
pub use source::{DuplicateCheckResult, ExistingImageRef, PixelBuffer, UploadFile, UploadOutcome};
pub use thumbnail::{extract_thumbnail, scaled_dimensions};
