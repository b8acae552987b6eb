//! 文件下载：Range 解析、响应头构建，以及带背压与取消的分块传输。
//!
//! The response body pulls the next chunk from the backend only when the
//! HTTP writer polls for it, so the backend is at most one chunk ahead of
//! the body. Bytes already handed to hyper may still sit in its write
//! buffer. When the body is dropped before the end, the backend read is
//! stopped instead of drained.

use axum::body::Body as AxumBody;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use bytes::Bytes;
use futures_util::stream::{self, Stream};
use std::io;
use tracing::{debug, info, warn};

use crate::backend::ChunkSource;
use crate::connection::ConnectionHandle;
use crate::error::GatewayError;
use crate::http::same_origin_path;

/// An inclusive byte range (`start..=end`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(self) -> u64 {
        self.end - self.start + 1
    }
}

pub struct DownloadRequest<'a> {
    /// Raw request path, used for the trailing-slash redirect.
    pub request_path: &'a str,
    pub method: &'a Method,
    pub range: Option<&'a HeaderValue>,
}

/// 下载文件。请求头尚未发送前的后端错误以错误页返回；之后的错误只会中断响应体。
pub async fn serve_file(
    handle: &ConnectionHandle,
    file_path: &str,
    request: DownloadRequest<'_>,
) -> Result<Response, GatewayError> {
    if request.request_path.len() > 1 && request.request_path.ends_with('/') {
        let trimmed = same_origin_path(request.request_path.trim_end_matches('/'));
        return Ok(Redirect::to(&trimmed).into_response());
    }

    let reader = handle.open_read(file_path).await?;
    let file_size = reader.size();
    let range = parse_range(request.range, file_size);
    let mime = mime_guess::from_path(file_path).first_or_octet_stream();

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(mime.essence_str()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    let (status, start, length) = match range {
        Some(range) => {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(range.len()));
            if let Ok(value) = HeaderValue::from_str(&format!(
                "bytes {}-{}/{}",
                range.start, range.end, file_size
            )) {
                headers.insert(header::CONTENT_RANGE, value);
            }
            (StatusCode::PARTIAL_CONTENT, range.start, range.len())
        }
        None => {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(file_size));
            headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
            (StatusCode::OK, 0, file_size)
        }
    };

    if *request.method == Method::HEAD || length == 0 {
        debug!(path = file_path, size = file_size, "download headers only");
        return Ok((status, headers, AxumBody::empty()).into_response());
    }

    let source = reader.read(start, length).await?;
    info!(
        share = handle.share(),
        user = handle.username(),
        path = file_path,
        start,
        length,
        size = file_size,
        "download started"
    );

    let body = chunk_stream(source, file_path.to_string());
    Ok((status, headers, AxumBody::from_stream(body)).into_response())
}

/// 下载中的后端读取；未读完就被丢弃时通知后端停止。
struct ActiveRead {
    source: Option<Box<dyn ChunkSource>>,
    path: String,
}

impl ActiveRead {
    /// 读取结束（完成或出错），后端无需再停止。
    fn finish(&mut self) {
        self.source = None;
    }
}

impl Drop for ActiveRead {
    fn drop(&mut self) {
        let Some(source) = self.source.take() else {
            return;
        };
        info!(path = %self.path, "download cancelled by client");
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(source.stop());
            }
            Err(_) => warn!(path = %self.path, "no runtime to stop backend read"),
        }
    }
}

/// 把后端分块读取包装为响应体流，每次轮询只拉取一个分块。
pub fn chunk_stream(
    source: Box<dyn ChunkSource>,
    path: String,
) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static {
    let read = ActiveRead {
        source: Some(source),
        path,
    };
    stream::unfold(read, |mut read| async move {
        let next = read.source.as_mut()?.next_chunk().await;
        match next {
            Some(Ok(chunk)) => Some((Ok(chunk), read)),
            None => {
                debug!(path = %read.path, "download finished");
                read.finish();
                None
            }
            Some(Err(err)) => {
                warn!(path = %read.path, error = %err, "download aborted");
                read.finish();
                Some((Err(io::Error::other(err.to_string())), read))
            }
        }
    })
}

/// 解析 Range 头，取第一个可满足的字节范围；无效或不可满足时返回 `None`。
pub fn parse_range(value: Option<&HeaderValue>, file_size: u64) -> Option<ByteRange> {
    let value = value?.to_str().ok()?.trim();
    let (unit, specs) = value.split_once('=')?;
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return None;
    }
    specs
        .split(',')
        .find_map(|spec| resolve_range_spec(spec.trim(), file_size))
}

fn resolve_range_spec(spec: &str, file_size: u64) -> Option<ByteRange> {
    if file_size == 0 {
        return None;
    }
    let (start_part, end_part) = spec.split_once('-')?;
    let (start_part, end_part) = (start_part.trim(), end_part.trim());
    let last = file_size - 1;

    if start_part.is_empty() {
        let suffix: u64 = end_part.parse().ok()?;
        if suffix == 0 {
            return None;
        }
        return Some(ByteRange {
            start: file_size.saturating_sub(suffix),
            end: last,
        });
    }

    let start: u64 = start_part.parse().ok()?;
    let end = if end_part.is_empty() {
        last
    } else {
        end_part.parse::<u64>().ok()?.min(last)
    };
    if start > end {
        return None;
    }
    Some(ByteRange { start, end })
}
