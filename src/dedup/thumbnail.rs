//! # 缩略图提取流水线
//!
//! ## 设计思路
//!
//! 将“字节 → 图像 → 小尺寸 RGBA”的过程集中管理，并在关键节点增加资源上限控制。
//! 优先做格式与尺寸检查，再进行完整解码，降低恶意输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 猜测格式，只接受 JPEG / PNG / GIF / WEBP
//! 2. 读取 header 尺寸，按像素上限快速拒绝
//! 3. 完整解码
//! 4. 保持宽高比把长边缩到 `max_dimension` 以内
//! 5. 转换 RGBA，构造 `PixelBuffer`（长度不一致即报错）

use fast_image_resize as fr;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageBuffer, ImageFormat, Rgba};
use std::io::Cursor;

use super::source::PixelBuffer;
use super::{DuplicateCheckConfig, ImageError};

const SUPPORTED_FORMATS: [ImageFormat; 4] = [
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::WebP,
];

/// 从图片字节提取用于比较的缩略图。
pub fn extract_thumbnail(
    bytes: &[u8],
    config: &DuplicateCheckConfig,
) -> Result<PixelBuffer, ImageError> {
    let format = image::guess_format(bytes)
        .map_err(|e| ImageError::Decode(format!("无法识别图片格式：{}", e)))?;
    if !SUPPORTED_FORMATS.contains(&format) {
        return Err(ImageError::Decode(format!("不支持的图片格式：{:?}", format)));
    }

    let (header_width, header_height) = inspect_dimensions_from_memory(bytes)?;
    validate_pixel_limits(config, header_width, header_height)?;

    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| ImageError::Decode(format!("图片解码失败：{}", e)))?;

    let (raw_width, raw_height) = decoded.dimensions();
    validate_pixel_limits(config, raw_width, raw_height)?;

    let (target_width, target_height) =
        scaled_dimensions(raw_width, raw_height, config.max_dimension);
    let thumbnail = if (target_width, target_height) == (raw_width, raw_height) {
        decoded
    } else {
        downscale(decoded, target_width, target_height, config.resize_filter)
    };

    let (width, height) = thumbnail.dimensions();
    let buffer = PixelBuffer::new(width, height, thumbnail.to_rgba8().into_raw())?;

    log::debug!(
        "🔍 缩略图提取完成 - 格式: {:?} 原始尺寸: {}x{} 输出尺寸: {}x{}",
        format,
        raw_width,
        raw_height,
        width,
        height
    );

    Ok(buffer)
}

/// 保持宽高比计算目标尺寸：长边不超过 `max_dimension`，短边四舍五入，最小为 1。
pub fn scaled_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    if width <= max_dimension && height <= max_dimension {
        return (width, height);
    }

    let ratio = width as f64 / height as f64;
    if width > height {
        let scaled = (max_dimension as f64 / ratio).round() as u32;
        (max_dimension, scaled.max(1))
    } else {
        let scaled = (max_dimension as f64 * ratio).round() as u32;
        (scaled.max(1), max_dimension)
    }
}

/// 仅通过内存中的图片头信息读取宽高。
fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::Decode(format!("无法识别图片格式：{}", e)))?;

    reader
        .into_dimensions()
        .map_err(|e| ImageError::Decode(format!("无法读取图片尺寸：{}", e)))
}

fn validate_pixel_limits(
    config: &DuplicateCheckConfig,
    width: u32,
    height: u32,
) -> Result<(), ImageError> {
    if width == 0 || height == 0 {
        return Err(ImageError::Decode(format!("图片尺寸无效：{}x{}", width, height)));
    }

    let pixels = (width as u64)
        .checked_mul(height as u64)
        .ok_or_else(|| ImageError::ResourceLimit("图片像素数溢出".to_string()))?;

    if pixels > config.max_decoded_pixels {
        return Err(ImageError::ResourceLimit(format!(
            "图片像素过大：{} 像素（限制：{} 像素）",
            pixels, config.max_decoded_pixels
        )));
    }

    Ok(())
}

fn downscale(image: DynamicImage, width: u32, height: u32, filter: FilterType) -> DynamicImage {
    match resize_with_fast_image_resize(&image, width, height, filter) {
        Ok(resized) => resized,
        Err(err) => {
            log::warn!(
                "⚠️ fast_image_resize 降采样失败，回退 image::resize_exact：{}",
                err
            );
            image.resize_exact(width, height, filter)
        }
    }
}

fn resize_with_fast_image_resize(
    image: &DynamicImage,
    target_width: u32,
    target_height: u32,
    filter: FilterType,
) -> Result<DynamicImage, ImageError> {
    let src = image.to_rgba8();
    let (src_width, src_height) = src.dimensions();

    let src_image =
        fr::images::Image::from_vec_u8(src_width, src_height, src.into_raw(), fr::PixelType::U8x4)
            .map_err(|e| ImageError::Decode(format!("构建源图像缓冲失败：{}", e)))?;

    let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

    let mut resizer = fr::Resizer::new();
    let options =
        fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(to_fast_filter(filter)));

    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| ImageError::Decode(format!("fast_image_resize 执行失败：{}", e)))?;

    let rgba = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(
        target_width,
        target_height,
        dst_image.into_vec(),
    )
    .ok_or_else(|| ImageError::Decode("fast_image_resize 输出缓冲长度异常".to_string()))?;

    Ok(DynamicImage::ImageRgba8(rgba))
}

fn to_fast_filter(filter: FilterType) -> fr::FilterType {
    match filter {
        FilterType::Nearest => fr::FilterType::Box,
        FilterType::Triangle => fr::FilterType::Bilinear,
        FilterType::CatmullRom => fr::FilterType::CatmullRom,
        FilterType::Gaussian => fr::FilterType::Mitchell,
        FilterType::Lanczos3 => fr::FilterType::Lanczos3,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let r = (x % 255) as u8;
            let g = (y % 255) as u8;
            let b = ((x + y) % 255) as u8;
            Rgba([r, g, b, 255])
        });

        let dyn_img = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(img).to_rgb8()),
            _ => DynamicImage::ImageRgba8(img),
        };
        let mut cursor = Cursor::new(Vec::new());
        dyn_img
            .write_to(&mut cursor, format)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    #[test]
    fn scaled_dimensions_keeps_small_images() {
        assert_eq!(scaled_dimensions(80, 60, 100), (80, 60));
        assert_eq!(scaled_dimensions(100, 100, 100), (100, 100));
    }

    #[test]
    fn scaled_dimensions_bounds_longer_side() {
        assert_eq!(scaled_dimensions(400, 200, 100), (100, 50));
        assert_eq!(scaled_dimensions(200, 400, 100), (50, 100));
        assert_eq!(scaled_dimensions(300, 300, 100), (100, 100));
        assert_eq!(scaled_dimensions(1000, 333, 100), (100, 33));
    }

    #[test]
    fn scaled_dimensions_never_returns_zero() {
        assert_eq!(scaled_dimensions(10_000, 1, 100), (100, 1));
        assert_eq!(scaled_dimensions(1, 10_000, 100), (1, 100));
    }

    #[test]
    fn extract_downscales_large_png() {
        let config = DuplicateCheckConfig::default();
        let png = encode(640, 480, ImageFormat::Png);

        let buffer = extract_thumbnail(&png, &config).expect("extract should succeed");

        assert_eq!(buffer.dimensions(), (100, 75));
        assert_eq!(buffer.pixels().len(), 100 * 75 * 4);
    }

    #[test]
    fn extract_keeps_small_image_pixels() {
        let config = DuplicateCheckConfig::default();
        let png = encode(16, 8, ImageFormat::Png);

        let buffer = extract_thumbnail(&png, &config).expect("extract should succeed");

        assert_eq!(buffer.dimensions(), (16, 8));
        assert_eq!(&buffer.pixels()[4..8], &[1, 0, 1, 255]);
    }

    #[test]
    fn extract_accepts_all_supported_formats() {
        let config = DuplicateCheckConfig::default();
        for format in [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Gif, ImageFormat::WebP] {
            let bytes = encode(120, 60, format);
            let buffer = extract_thumbnail(&bytes, &config)
                .unwrap_or_else(|e| panic!("{:?} should decode: {}", format, e));
            assert_eq!(buffer.dimensions(), (100, 50));
        }
    }

    #[test]
    fn extract_rejects_unsupported_format() {
        let config = DuplicateCheckConfig::default();
        let bmp = encode(8, 8, ImageFormat::Bmp);

        assert!(matches!(extract_thumbnail(&bmp, &config), Err(ImageError::Decode(_))));
    }

    #[test]
    fn extract_rejects_garbage_bytes() {
        let config = DuplicateCheckConfig::default();
        let result = extract_thumbnail(b"<html>not an image</html>", &config);

        assert!(matches!(result, Err(ImageError::Decode(_))));
    }

    #[test]
    fn extract_rejects_too_many_pixels() {
        let config = DuplicateCheckConfig {
            max_decoded_pixels: 1_000,
            ..DuplicateCheckConfig::default()
        };
        let png = encode(100, 100, ImageFormat::Png);

        assert!(matches!(
            extract_thumbnail(&png, &config),
            Err(ImageError::ResourceLimit(_))
        ));
    }

    #[test]
    fn same_source_extracts_identically() {
        let config = DuplicateCheckConfig::default();
        let png = encode(300, 200, ImageFormat::Png);

        let first = extract_thumbnail(&png, &config).expect("png extract");
        let second = extract_thumbnail(&png, &config).expect("png extract");

        assert_eq!(first, second);
    }
}
