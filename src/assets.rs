//! 嵌入式静态资源（样式表）。

use axum::body::Body as AxumBody;
use axum::extract::Path;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "assets/"]
/// 编译期嵌入的页面资源。
pub struct PageAssets;

/// `/assets/{*path}` 处理器。
pub async fn serve_asset(Path(path): Path<String>) -> Response {
    load_embedded_asset(&path).unwrap_or_else(|| StatusCode::NOT_FOUND.into_response())
}

fn load_embedded_asset(path: &str) -> Option<Response> {
    let asset = PageAssets::get(path)?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(mime.essence_str()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=3600"),
    );
    Some((headers, AxumBody::from(asset.data.into_owned())).into_response())
}
