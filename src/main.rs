//! # 表情包查重 — 命令行入口
//!
//! 本文件仅负责参数解析、日志初始化与结果输出。
//! 业务逻辑分布在 `dedup` 子模块中，详见 `lib.rs` 架构文档。

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use meme_dedup::dedup::{UploadFile, UploadService};
use meme_dedup::error::AppError;
use meme_dedup::settings;

const EXIT_DUPLICATE: u8 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about = "检查待上传的表情包是否已存在于图库中")]
struct Args {
    /// 待上传的图片文件
    file: PathBuf,

    /// 图库快照（ExistingImageRef 数组的 JSON 文件）
    #[arg(short, long)]
    gallery: PathBuf,

    /// 查重配置文件（缺失字段使用默认值）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 匹配档位：strict / balanced / lenient
    #[arg(short, long)]
    profile: Option<String>,

    /// 覆盖 MIME 类型（默认按文件签名识别）
    #[arg(short, long)]
    mime: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            log::error!("❌ 查重失败 [{}]：{}", err.code(), err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode, AppError> {
    let config = match &args.config {
        Some(path) => settings::load_config(path)?,
        None => Default::default(),
    };
    let service = UploadService::with_config(config)?;
    if let Some(profile) = &args.profile {
        service.set_match_profile(profile)?;
    }

    let gallery = settings::load_gallery(&args.gallery)?;
    log::info!("📚 已加载图库 {} 张（档位：{}）", gallery.len(), service.match_profile()?);
    service.replace_gallery(gallery)?;

    let max_file_size = service.checker().config_snapshot()?.max_file_size;
    let mut file = UploadFile::from_path(&args.file, max_file_size)?;
    if let Some(mime) = &args.mime {
        file.mime_type = mime.clone();
    }

    let mut outcome = service.upload_meme(&file).await;
    let rendered = serde_json::to_string_pretty(&outcome)
        .map_err(|e| AppError::Settings(format!("序列化结果失败: {}", e)))?;
    println!("{}", rendered);

    if let Some(preview) = outcome.preview.take() {
        service.cleanup(preview);
    }

    let code = if outcome.success {
        ExitCode::SUCCESS
    } else if outcome.is_duplicate == Some(true) {
        ExitCode::from(EXIT_DUPLICATE)
    } else {
        ExitCode::FAILURE
    };
    Ok(code)
}
