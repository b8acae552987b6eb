//! 统一的网关错误类型与错误页渲染。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::backend::BackendError;
use crate::pages::{self, PageContext};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Too many failed login attempts. Try again later.")]
    RateLimited,
    /// Unknown share names and unresolvable share links both end up here.
    #[error("If you are trying to access a shared link, it may have expired.")]
    ShareNotFound,
    #[error("Only files can be shared.")]
    NotAFile,
}

impl GatewayError {
    /// 后端错误仅映射拒绝访问与不存在，其余保持默认状态码。
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Backend(BackendError::AccessDenied) => StatusCode::FORBIDDEN,
            GatewayError::Backend(BackendError::NotFound) => StatusCode::NOT_FOUND,
            GatewayError::Backend(_) => StatusCode::OK,
            GatewayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::ShareNotFound => StatusCode::NOT_FOUND,
            GatewayError::NotAFile => StatusCode::BAD_REQUEST,
        }
    }

    /// 带请求上下文渲染错误页。
    pub fn into_page(self, ctx: &PageContext) -> Response {
        (self.status(), pages::error(ctx, &self.to_string())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_map_to_status_codes() {
        assert_eq!(
            GatewayError::from(BackendError::AccessDenied).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            GatewayError::from(BackendError::NotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::from(BackendError::Other("io".into())).status(),
            StatusCode::OK
        );
    }
}
