//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入类型”和“流水线中间结果”解耦：
//! - `UploadFile` 表示用户刚选中的待上传文件（MIME + 原始字节）
//! - `ExistingImageRef` 表示图库中已有图片的最小视图
//! - `PixelBuffer` 表示缩略后的 RGBA 数据，仅用于比较
//! - `DuplicateCheckResult` / `UploadOutcome` 表示对外返回结果

use std::path::Path;

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::ImageError;
use super::preview::PreviewHandle;

/// 待上传文件。
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// 文件选择器给出的 MIME 类型。
    pub mime_type: String,
    /// 文件原始字节。
    pub bytes: Bytes,
    /// 原始文件名（仅用于日志）。
    pub name: Option<String>,
}

impl UploadFile {
    pub fn new(mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes: bytes.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 从 `data:image/...;base64,` 形式的 Data URL 构建上传文件。
    ///
    /// `max_file_size` 用于在真正解码前按 Base64 长度估算体积并拒绝超大输入。
    pub fn from_data_url(data_url: &str, max_file_size: u64) -> Result<Self, ImageError> {
        let normalized = data_url.trim();
        let rest = normalized
            .strip_prefix("data:")
            .ok_or_else(|| ImageError::InvalidFormat("缺少 data: 前缀".to_string()))?;
        let (mime_type, payload) = rest
            .split_once(";base64,")
            .ok_or_else(|| ImageError::InvalidFormat("缺少 base64 标记".to_string()))?;

        let estimated = estimate_base64_decoded_upper_bound_len(payload)?;
        if estimated > max_file_size {
            return Err(ImageError::FileTooLarge {
                size: estimated,
                limit: max_file_size,
            });
        }

        let bytes = general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| ImageError::InvalidFormat(format!("Base64 解码失败：{}", e)))?;

        Ok(Self::new(mime_type.trim(), bytes))
    }

    /// 读取本地文件；先按元数据检查体积，超限时不读入内容。
    ///
    /// MIME 按文件签名识别，识别不出时记为 `application/octet-stream`，交给上传校验拒绝。
    pub fn from_path(path: impl AsRef<Path>, max_file_size: u64) -> Result<Self, ImageError> {
        let path = path.as_ref();
        log::debug!("📁 读取本地图片 - 路径: {}", path.display());

        let metadata = std::fs::metadata(path)
            .map_err(|e| ImageError::FileSystem(format!("无法读取文件信息：{}", e)))?;
        if !metadata.is_file() {
            return Err(ImageError::FileSystem(format!("不是文件：{}", path.display())));
        }
        if metadata.len() > max_file_size {
            return Err(ImageError::FileTooLarge {
                size: metadata.len(),
                limit: max_file_size,
            });
        }

        let bytes = std::fs::read(path)
            .map_err(|e| ImageError::FileSystem(format!("无法读取文件：{}", e)))?;
        let mime_type = infer::get(&bytes)
            .map(|kind| kind.mime_type())
            .unwrap_or("application/octet-stream");

        Ok(Self::new(mime_type, bytes).with_name(path.display().to_string()))
    }

    /// 规范化后的 MIME（小写、去掉参数）。
    pub fn normalized_mime(&self) -> String {
        self.mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// 日志用标签：有文件名用文件名，否则用 MIME。
    pub(crate) fn log_label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.mime_type)
    }
}

fn estimate_base64_decoded_upper_bound_len(base64_data: &str) -> Result<u64, ImageError> {
    let len = base64_data.trim().len() as u64;
    let groups = len
        .checked_add(3)
        .ok_or_else(|| ImageError::ResourceLimit("Base64 输入长度溢出".to_string()))?
        / 4;

    groups
        .checked_mul(3)
        .ok_or_else(|| ImageError::ResourceLimit("Base64 解码体积估算溢出".to_string()))
}

/// 图库中已有图片的最小视图。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingImageRef {
    pub id: String,
    /// 可直接 GET 的图片地址，同时作为缓存键。
    pub source_url: String,
    /// 展示用标题（重复提示弹窗里显示）。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ExistingImageRef {
    pub fn new(id: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_url: source_url.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// 缩略后的 RGBA 像素数据。
///
/// 构造时强制 `pixels.len() == width * height * 4`，之后不可变。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, ImageError> {
        if width == 0 || height == 0 {
            return Err(ImageError::InvalidBuffer(format!(
                "尺寸必须为正：{}x{}",
                width, height
            )));
        }

        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| ImageError::InvalidBuffer("尺寸导致长度溢出".to_string()))?;

        if pixels.len() != expected_len {
            return Err(ImageError::InvalidBuffer(format!(
                "长度 {} 与 {}x{}x4={} 不一致",
                pixels.len(),
                width,
                height,
                expected_len
            )));
        }

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel_count(&self) -> usize {
        self.pixels.len() / 4
    }
}

/// 单次查重结果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateCheckResult {
    pub is_duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<ExistingImageRef>,
}

impl DuplicateCheckResult {
    pub fn clear() -> Self {
        Self {
            is_duplicate: false,
            duplicate_of: None,
        }
    }

    pub fn duplicate(of: ExistingImageRef) -> Self {
        Self {
            is_duplicate: true,
            duplicate_of: Some(of),
        }
    }
}

/// 上传流程结果。
///
/// 成功时携带 `preview`，调用方在不再展示预览时必须交还给 `cleanup`。
#[derive(Debug, Serialize)]
pub struct UploadOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_duplicate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<ExistingImageRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<PreviewHandle>,
}

impl UploadOutcome {
    pub(crate) fn accepted(preview: PreviewHandle) -> Self {
        Self {
            success: true,
            error: None,
            error_code: None,
            is_duplicate: Some(false),
            duplicate_of: None,
            preview: Some(preview),
        }
    }

    pub(crate) fn duplicate(of: ExistingImageRef) -> Self {
        Self {
            success: false,
            error: Some(super::service::DUPLICATE_MESSAGE.to_string()),
            error_code: Some("E_DUPLICATE"),
            is_duplicate: Some(true),
            duplicate_of: Some(of),
            preview: None,
        }
    }

    pub(crate) fn failed(message: impl Into<String>, code: &'static str) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            error_code: Some(code),
            is_duplicate: None,
            duplicate_of: None,
            preview: None,
        }
    }
}
