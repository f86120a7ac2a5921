//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `DuplicateCheckConfig`，保证运行时行为可观测、可调整、可测试。
//! 其中匹配档位（strict / balanced / lenient）作为高层语义，映射到
//! “单通道容差 + 相似度阈值”这一对底层参数。
//!
//! ## 实现思路
//!
//! - `Default` 提供与线上行为一致的配置（容差 5、阈值 0.99、批大小 5、重试 3 次间隔 1 秒）。
//! - `validate` 在配置落地前做范围校验，拒绝会让扫描失去意义的取值。
//! - `MatchProfile` 负责档位字符串解析与反向输出。
//! - `infer_match_profile` 用于从当前配置反推档位（给 UI 展示状态）。

use std::time::Duration;

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use super::ImageError;

/// 允许上传的 MIME 类型白名单。
pub const ALLOWED_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

/// 查重流水线配置。
///
/// 字段覆盖了上传校验、缩略图提取、像素比较、批量扫描与候选图拉取五个阶段。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateCheckConfig {
    /// 缩略图宽/高单边最大值（像素）。
    pub max_dimension: u32,
    /// 单通道（R/G/B）允许的绝对差值。
    pub channel_tolerance: u8,
    /// 判定为同一张图所需的最小匹配像素占比。
    pub similarity_threshold: f64,
    /// 每批并发处理的候选图数量。
    pub batch_size: usize,
    /// 单个候选图拉取的最大尝试次数。
    pub max_fetch_attempts: u32,
    /// 两次拉取尝试之间的固定间隔（毫秒）。
    pub fetch_retry_delay_ms: u64,
    /// 缓存条目最大存活时间（秒）。
    pub cache_max_age_secs: u64,
    /// 上传文件与候选图下载允许的最大体积（字节）。
    pub max_file_size: u64,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 候选图下载超时时间（秒）。
    pub download_timeout: u64,
    /// 建立连接（TCP/TLS）超时时间（秒）。
    pub connect_timeout: u64,
    /// 最大重定向次数。
    pub max_redirects: usize,
    /// 整次扫描的总超时（毫秒），`None` 表示不限制。
    pub scan_timeout_ms: Option<u64>,
    /// 降采样滤镜策略。
    #[serde(with = "filter_name")]
    pub resize_filter: FilterType,
}

impl Default for DuplicateCheckConfig {
    fn default() -> Self {
        Self {
            max_dimension: 100,
            channel_tolerance: 5,
            similarity_threshold: 0.99,
            batch_size: 5,
            max_fetch_attempts: 3,
            fetch_retry_delay_ms: 1_000,
            cache_max_age_secs: 30 * 60,
            max_file_size: 50 * 1024 * 1024,
            max_decoded_pixels: 40_000_000,
            download_timeout: 30,
            connect_timeout: 8,
            max_redirects: 5,
            scan_timeout_ms: None,
            resize_filter: FilterType::Triangle,
        }
    }
}

/// 匹配档位（面向产品/用户语义）。
///
/// - `Strict`：只认几乎逐像素一致的图（线上默认）
/// - `Balanced`：容忍轻度重压缩与小水印
/// - `Lenient`：容忍更明显的局部改动
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchProfile {
    Strict,
    Balanced,
    Lenient,
}

impl MatchProfile {
    /// 从外部字符串解析档位。
    ///
    /// # 示例
    /// ```rust
    /// use meme_dedup::dedup::MatchProfile;
    ///
    /// let p = MatchProfile::from_str("balanced")?;
    /// assert_eq!(p.as_str(), "balanced");
    /// # Ok::<(), meme_dedup::dedup::ImageError>(())
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(profile: &str) -> Result<Self, ImageError> {
        match profile.trim().to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "balanced" => Ok(Self::Balanced),
            "lenient" => Ok(Self::Lenient),
            other => Err(ImageError::Config(format!(
                "未知匹配档位：{}（可选：strict / balanced / lenient）",
                other
            ))),
        }
    }

    /// 将档位输出为稳定字符串，供 UI 展示与持久化。
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Balanced => "balanced",
            Self::Lenient => "lenient",
        }
    }

    /// 档位对应的（容差，阈值）。
    fn parameters(self) -> (u8, f64) {
        match self {
            Self::Strict => (5, 0.99),
            Self::Balanced => (8, 0.97),
            Self::Lenient => (10, 0.95),
        }
    }
}

impl DuplicateCheckConfig {
    /// 校验各字段取值范围。
    pub fn validate(&self) -> Result<(), ImageError> {
        if !(8..=1024).contains(&self.max_dimension) {
            return Err(ImageError::Config("max_dimension 必须在 8~1024 之间".to_string()));
        }
        if !(0.5..=1.0).contains(&self.similarity_threshold) {
            return Err(ImageError::Config("similarity_threshold 必须在 0.5~1.0 之间".to_string()));
        }
        if !(1..=64).contains(&self.batch_size) {
            return Err(ImageError::Config("batch_size 必须在 1~64 之间".to_string()));
        }
        if !(1..=10).contains(&self.max_fetch_attempts) {
            return Err(ImageError::Config("max_fetch_attempts 必须在 1~10 之间".to_string()));
        }
        if self.fetch_retry_delay_ms > 60_000 {
            return Err(ImageError::Config("fetch_retry_delay_ms 不能超过 60000 毫秒".to_string()));
        }
        if self.cache_max_age_secs == 0 {
            return Err(ImageError::Config("cache_max_age_secs 不能为 0".to_string()));
        }
        if self.max_file_size == 0 {
            return Err(ImageError::Config("max_file_size 不能为 0".to_string()));
        }
        if self.max_decoded_pixels == 0 {
            return Err(ImageError::Config("max_decoded_pixels 不能为 0".to_string()));
        }
        if !(1..=300).contains(&self.download_timeout) {
            return Err(ImageError::Config("download_timeout 必须在 1~300 秒之间".to_string()));
        }
        if !(1..=120).contains(&self.connect_timeout) {
            return Err(ImageError::Config("connect_timeout 必须在 1~120 秒之间".to_string()));
        }
        if self.scan_timeout_ms == Some(0) {
            return Err(ImageError::Config("scan_timeout_ms 不能为 0（不限制请留空）".to_string()));
        }
        Ok(())
    }

    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_secs)
    }

    pub fn fetch_retry_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_retry_delay_ms)
    }

    /// 基于当前参数反推匹配档位。
    ///
    /// 取与当前阈值最接近的档位；容差只作为平局时的参考。
    pub fn infer_match_profile(&self) -> MatchProfile {
        [MatchProfile::Strict, MatchProfile::Balanced, MatchProfile::Lenient]
            .into_iter()
            .min_by(|a, b| {
                let (ta, sa) = a.parameters();
                let (tb, sb) = b.parameters();
                let da = (sa - self.similarity_threshold).abs();
                let db = (sb - self.similarity_threshold).abs();
                da.total_cmp(&db).then_with(|| {
                    ta.abs_diff(self.channel_tolerance)
                        .cmp(&tb.abs_diff(self.channel_tolerance))
                })
            })
            .unwrap_or(MatchProfile::Strict)
    }

    /// 缩略图缓存键：同一地址在不同缩略参数下会得到不同形状的缓冲，需分开缓存。
    pub fn thumbnail_cache_key(&self, source_url: &str) -> String {
        format!(
            "{}#{}:{}",
            source_url,
            self.max_dimension,
            filter_name::as_str(self.resize_filter)
        )
    }

    /// 应用指定匹配档位到实际参数。
    pub fn apply_match_profile(&mut self, profile: MatchProfile) {
        let (tolerance, threshold) = profile.parameters();
        self.channel_tolerance = tolerance;
        self.similarity_threshold = threshold;
    }
}

/// `FilterType` 未实现 serde，按稳定名称读写。
mod filter_name {
    use image::imageops::FilterType;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn as_str(filter: FilterType) -> &'static str {
        match filter {
            FilterType::Nearest => "nearest",
            FilterType::Triangle => "triangle",
            FilterType::CatmullRom => "catmull_rom",
            FilterType::Gaussian => "gaussian",
            FilterType::Lanczos3 => "lanczos3",
        }
    }

    pub fn serialize<S: Serializer>(filter: &FilterType, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(as_str(*filter))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FilterType, D::Error> {
        let name = String::deserialize(deserializer)?;
        match name.as_str() {
            "nearest" => Ok(FilterType::Nearest),
            "triangle" => Ok(FilterType::Triangle),
            "catmull_rom" => Ok(FilterType::CatmullRom),
            "gaussian" => Ok(FilterType::Gaussian),
            "lanczos3" => Ok(FilterType::Lanczos3),
            other => Err(serde::de::Error::custom(format!("未知滤镜：{}", other))),
        }
    }
}
