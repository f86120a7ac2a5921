//! # 表情包图库查重 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │              上传弹窗 / 命令行（调用方）                  │
//! │                                                          │
//! │   UploadFile ── 图库快照 Vec<ExistingImageRef>           │
//! └───────┼──────────────────────────────────────────────────┘
//!         ↕ UploadOutcome / Result<T, AppError>
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            meme_dedup (Rust)                     │
//! │                                                          │
//! │  ┌─ error ────── AppError (统一错误类型)                  │
//! │  │                                                       │
//! │  ├─ settings ─── 查重配置 JSON 读写                       │
//! │  │                                                       │
//! │  └─ dedup ────── 上传校验·缩略图·分批比对·预览            │
//! │      ├─ handler      分批扫描 + 重试 + 短路               │
//! │      ├─ cache        缩略图过期缓存                       │
//! │      └─ preview      预览句柄登记与释放                   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError`，命令行与 UI 桥接层的返回类型 |
//! | [`dedup`] | 上传校验、缩略图提取、像素比较、缓存、分批查重、预览句柄 |
//! | [`settings`] | `DuplicateCheckConfig` 的 JSON 持久化 |

pub mod dedup;
pub mod error;
pub mod settings;
