//! # 候选图拉取模块
//!
//! ## 设计思路
//!
//! 查重器只依赖 `ImageFetcher` 这一抽象：给一个地址，返回图片原始字节。
//! 生产环境使用基于 reqwest 的 `HttpImageFetcher`，测试里可以替换为可计数、可注入失败的实现。
//!
//! ## 实现思路
//!
//! - 客户端按配置构建一次并复用（总超时 + 连接超时 + 有限重定向）。
//! - 非 2xx 统一映射为 `Network`，调用方据此决定是否重试。
//! - 内容类型 + Content-Length + 流式累计体积三道校验，尽早拒绝非图片或超大响应。
//! - 最后用文件签名（magic bytes）确认确实是图片，避免把 HTML 错误页交给解码器。
//! - 重试不在这里做，由查重器统一编排。

use std::future::Future;
use std::time::Duration;

use bytes::{Bytes, BytesMut};

use super::{DuplicateCheckConfig, ImageError};

const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;

/// 按地址获取图片原始字节的能力。
pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Bytes, ImageError>> + Send;
}

/// 基于 reqwest 的候选图拉取实现。
pub struct HttpImageFetcher {
    client: reqwest::Client,
    max_file_size: u64,
    download_timeout: u64,
}

impl HttpImageFetcher {
    pub fn new(config: &DuplicateCheckConfig) -> Result<Self, ImageError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| ImageError::Network(format!("无法创建 HTTP 客户端：{}", e)))?;

        Ok(Self {
            client,
            max_file_size: config.max_file_size,
            download_timeout: config.download_timeout,
        })
    }

    async fn download(&self, url: &str) -> Result<Bytes, ImageError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| ImageError::InvalidFormat(format!("URL 格式错误：{}", e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ImageError::InvalidFormat("仅支持 HTTP/HTTPS".to_string()));
        }

        log::debug!("🌐 拉取候选图 - URL: {}", redact_url_for_log(url));

        let mut response = self
            .client
            .get(parsed)
            .header(
                reqwest::header::ACCEPT,
                "image/avif,image/webp,image/apng,image/*,*/*;q=0.8",
            )
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e, url))?;

        if !response.status().is_success() {
            return Err(ImageError::Network(format!(
                "HTTP {}: {}",
                response.status().as_u16(),
                status_message(response.status().as_u16())
            )));
        }

        if let Some(ct) = response.headers().get(reqwest::header::CONTENT_TYPE) {
            if let Ok(ct_str) = ct.to_str() {
                if !is_image_content_type(ct_str) {
                    return Err(ImageError::InvalidFormat(format!("不是图片类型：{}", ct_str)));
                }
            }
        }

        let total_len = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|cl| cl.to_str().ok())
            .and_then(|cl| cl.parse::<u64>().ok());

        if let Some(size) = total_len {
            if size > self.max_file_size {
                return Err(ImageError::ResourceLimit(format!(
                    "文件过大：{:.2} MB（限制：{:.2} MB）",
                    size as f64 / 1024.0 / 1024.0,
                    self.max_file_size as f64 / 1024.0 / 1024.0
                )));
            }
        }

        let initial_capacity = total_len
            .map(|len| len.min(self.max_file_size) as usize)
            .filter(|len| *len > 0)
            .unwrap_or(BUFFER_INITIAL_CAPACITY);
        let mut buffer = BytesMut::with_capacity(initial_capacity);

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.map_reqwest_error(e, url))?
        {
            if (buffer.len() + chunk.len()) as u64 > self.max_file_size {
                return Err(ImageError::ResourceLimit("下载后文件超过大小限制".to_string()));
            }
            buffer.extend_from_slice(&chunk);
        }

        validate_image_signature(&buffer)?;
        log::debug!("✅ 候选图下载完成 - {} bytes", buffer.len());

        Ok(buffer.freeze())
    }

    /// 统一映射 reqwest 错误到业务错误。
    fn map_reqwest_error(&self, e: reqwest::Error, url: &str) -> ImageError {
        let err_msg = e.to_string().replace(url, &redact_url_for_log(url));

        if e.is_timeout() {
            ImageError::Timeout(format!("下载超时（{}秒）", self.download_timeout))
        } else if e.is_connect() {
            ImageError::Network(format!("无法连接：{}", err_msg))
        } else {
            ImageError::Network(format!("请求失败：{}", err_msg))
        }
    }
}

impl ImageFetcher for HttpImageFetcher {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Bytes, ImageError>> + Send {
        self.download(url)
    }
}

/// 去掉 query 与 fragment，避免签名参数进日志。
pub(crate) fn redact_url_for_log(url: &str) -> String {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return "<invalid-url>".to_string();
    };

    let host = parsed.host_str().unwrap_or("<unknown-host>");
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
    let path = parsed.path();

    format!("{}://{}{}{}", parsed.scheme(), host, port, path)
}

fn is_image_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|base| base.trim().to_ascii_lowercase().starts_with("image/"))
        .unwrap_or(false)
}

fn status_message(code: u16) -> &'static str {
    match code {
        404 => "未找到",
        403 => "访问被拒绝",
        500..=599 => "服务器错误",
        _ => "请求失败",
    }
}

/// 通过文件签名（magic bytes）校验内容是否为图片。
fn validate_image_signature(bytes: &[u8]) -> Result<(), ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::InvalidFormat("图片内容为空".to_string()));
    }

    let kind = infer::get(bytes)
        .ok_or_else(|| ImageError::InvalidFormat("无法识别图片类型".to_string()))?;

    if kind.matcher_type() != infer::MatcherType::Image {
        return Err(ImageError::InvalidFormat(format!(
            "文件签名不是图片类型：{}",
            kind.mime_type()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::thumbnail::tests::encode;
    use image::ImageFormat;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn serve_once(
        status_line: &'static str,
        content_type: &'static str,
        body: Vec<u8>,
    ) -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let addr = listener.local_addr().expect("read local addr failed");

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept failed");

            let mut req_buf = [0u8; 1024];
            let _ = stream.read(&mut req_buf);

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status_line,
                content_type,
                body.len()
            );

            // 客户端可能在读完响应头后就断开，写入失败不算测试失败。
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.write_all(&body);
            let _ = stream.flush();
        });

        (format!("http://127.0.0.1:{}/meme.png", addr.port()), server)
    }

    #[tokio::test]
    async fn fetch_returns_image_bytes() {
        let png = encode(12, 12, ImageFormat::Png);
        let (url, server) = serve_once("200 OK", "image/png", png.clone());

        let fetcher = HttpImageFetcher::new(&DuplicateCheckConfig::default()).expect("fetcher init");
        let bytes = fetcher.fetch(&url).await.expect("fetch should succeed");

        server.join().expect("server thread failed");
        assert_eq!(&bytes[..], &png[..]);
    }

    #[tokio::test]
    async fn fetch_maps_http_error_to_network() {
        let (url, server) = serve_once("404 Not Found", "text/plain", b"missing".to_vec());

        let fetcher = HttpImageFetcher::new(&DuplicateCheckConfig::default()).expect("fetcher init");
        let result = fetcher.fetch(&url).await;

        server.join().expect("server thread failed");
        assert!(matches!(result, Err(ImageError::Network(_))));
    }

    #[tokio::test]
    async fn fetch_rejects_non_image_body_even_when_content_type_is_image() {
        let (url, server) = serve_once("200 OK", "image/png", b"hello world".to_vec());

        let fetcher = HttpImageFetcher::new(&DuplicateCheckConfig::default()).expect("fetcher init");
        let result = fetcher.fetch(&url).await;

        server.join().expect("server thread failed");
        assert!(matches!(result, Err(ImageError::InvalidFormat(_))));
    }

    #[tokio::test]
    async fn fetch_rejects_html_content_type() {
        let (url, server) = serve_once("200 OK", "text/html; charset=utf-8", b"<html></html>".to_vec());

        let fetcher = HttpImageFetcher::new(&DuplicateCheckConfig::default()).expect("fetcher init");
        let result = fetcher.fetch(&url).await;

        server.join().expect("server thread failed");
        assert!(matches!(result, Err(ImageError::InvalidFormat(_))));
    }

    #[tokio::test]
    async fn fetch_rejects_oversized_content_length() {
        let png = encode(32, 32, ImageFormat::Png);
        let (url, server) = serve_once("200 OK", "image/png", png);

        let config = DuplicateCheckConfig {
            max_file_size: 16,
            ..DuplicateCheckConfig::default()
        };
        let fetcher = HttpImageFetcher::new(&config).expect("fetcher init");
        let result = fetcher.fetch(&url).await;

        server.join().expect("server thread failed");
        assert!(matches!(result, Err(ImageError::ResourceLimit(_))));
    }

    #[tokio::test]
    async fn fetch_rejects_non_http_scheme() {
        let fetcher = HttpImageFetcher::new(&DuplicateCheckConfig::default()).expect("fetcher init");
        let result = fetcher.fetch("file:///etc/passwd").await;

        assert!(matches!(result, Err(ImageError::InvalidFormat(_))));
    }

    #[test]
    fn content_type_parser_accepts_image_with_params() {
        assert!(is_image_content_type("image/png; charset=utf-8"));
        assert!(is_image_content_type("IMAGE/JPEG"));
        assert!(!is_image_content_type("text/html; charset=utf-8"));
    }

    #[test]
    fn redact_url_for_log_removes_query_and_fragment() {
        let redacted =
            redact_url_for_log("https://example.com:8443/path/img.png?token=abc123#hash");

        assert_eq!(redacted, "https://example.com:8443/path/img.png");
    }
}
