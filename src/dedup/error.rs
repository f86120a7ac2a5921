//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载查重链路中的所有错误来源，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! `code()` / `stage()` 提供稳定的机器可读标识，供 UI 侧区分
//! “用户可修正的输入问题”和“内部临时故障”。

/// 查重链路统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("文件类型不支持：{0}")]
    InvalidType(String),

    #[error("文件内容为空")]
    EmptyFile,

    #[error("文件过大：{size} 字节（限制：{limit} 字节）")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("文件系统错误：{0}")]
    FileSystem(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("像素缓冲无效：{0}")]
    InvalidBuffer(String),

    #[error("网络错误：{0}")]
    Network(String),

    #[error("超时错误：{0}")]
    Timeout(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    #[error("配置错误：{0}")]
    Config(String),

    #[error("内部错误：{0}")]
    Internal(String),
}

impl ImageError {
    /// 稳定错误码，UI 侧按此分支展示文案。
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidType(_) => "E_INVALID_TYPE",
            Self::EmptyFile => "E_EMPTY_FILE",
            Self::FileTooLarge { .. } => "E_FILE_TOO_LARGE",
            Self::FileSystem(_) => "E_FILE_SYSTEM",
            Self::Decode(_) => "E_DECODE",
            Self::InvalidFormat(_) => "E_INVALID_FORMAT",
            Self::InvalidBuffer(_) => "E_INVALID_BUFFER",
            Self::Network(_) => "E_NETWORK",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
            Self::Config(_) => "E_CONFIG",
            Self::Internal(_) => "E_INTERNAL",
        }
    }

    /// 出错所在阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidType(_)
            | Self::EmptyFile
            | Self::FileTooLarge { .. }
            | Self::FileSystem(_) => "validate",
            Self::Decode(_) | Self::InvalidBuffer(_) | Self::ResourceLimit(_) => "decode",
            Self::Network(_) | Self::InvalidFormat(_) => "fetch",
            Self::Timeout(_) | Self::Internal(_) => "scan",
            Self::Config(_) => "config",
        }
    }

    /// 是否属于“用户上传的文件本身有问题”，可直接给出针对性提示。
    pub fn is_user_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidType(_)
                | Self::EmptyFile
                | Self::FileTooLarge { .. }
                | Self::Decode(_)
                | Self::ResourceLimit(_)
        )
    }

    /// 候选图拉取失败时是否值得重试。
    pub(crate) fn is_retryable_fetch(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}
