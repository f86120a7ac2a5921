//! 查重配置与图库快照的 JSON 读写。
//!
//! 配置文件缺失的字段回退为默认值；读入后立即校验，非法配置不会进入查重器。

use std::fs;
use std::path::Path;

use crate::dedup::{DuplicateCheckConfig, ExistingImageRef};
use crate::error::AppError;

/// 读取配置文件；文件不存在时返回默认配置。
pub fn load_config(path: &Path) -> Result<DuplicateCheckConfig, AppError> {
    if !path.exists() {
        log::info!("⚙️ 配置文件 {} 不存在，使用默认配置", path.display());
        return Ok(DuplicateCheckConfig::default());
    }

    let content = fs::read_to_string(path)?;
    let config = serde_json::from_str::<DuplicateCheckConfig>(&content)
        .map_err(|e| AppError::Settings(format!("解析配置文件失败: {}", e)))?;
    config.validate()?;

    Ok(config)
}

/// 写入配置文件（美化 JSON），必要时创建父目录。
pub fn save_config(path: &Path, config: &DuplicateCheckConfig) -> Result<(), AppError> {
    config.validate()?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| AppError::Settings(format!("序列化配置失败: {}", e)))?;
    fs::write(path, content)?;
    Ok(())
}

/// 读取图库快照（`ExistingImageRef` 数组）。
pub fn load_gallery(path: &Path) -> Result<Vec<ExistingImageRef>, AppError> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| AppError::Settings(format!("解析图库文件失败: {}", e)))
}
