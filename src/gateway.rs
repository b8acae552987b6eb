//! 请求路由：登录、登出、共享总览、分享令牌、目录浏览与文件下载。
//!
//! Every path except `/assets/*` lands in one of two handlers. The first
//! path segment is either a configured share name or a share-link token.

use axum::Router;
use axum::extract::{ConnectInfo, Extension, Form, Query};
use axum::http::{HeaderMap, Method, Uri, header};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::assets;
use crate::backend::{BackendError, Credentials};
use crate::config::{AUTH_COOKIE_NAME, Settings};
use crate::download::{DownloadRequest, serve_file};
use crate::error::GatewayError;
use crate::http::{
    RequestScheme, decode_path, encode_segment, external_base_url, is_https_request,
    resolve_client_ip, same_origin_path,
};
use crate::pages::{self, PageContext};
use crate::rate_limit::{RateKey, RateLimiter};
use crate::session::SessionStore;
use crate::token::TokenStore;

pub fn routes() -> Router {
    Router::new()
        .route("/assets/{*path}", get(assets::serve_asset))
        .route("/", get(browse).post(login))
        .route("/{*path}", get(browse).post(login))
}

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub share: String,
}

/// 查询串中出现的键（值一律忽略）。
struct QueryFlags(Vec<String>);

impl QueryFlags {
    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self(pairs.into_iter().map(|(key, _)| key).collect())
    }

    fn has(&self, key: &str) -> bool {
        self.0.iter().any(|existing| existing == key)
    }

    /// 在原查询键后追加 `failed` 标记。
    fn with_failed(&self) -> String {
        let mut keys: Vec<String> = self.0.iter().map(|key| encode_segment(key)).collect();
        if !self.has("failed") {
            keys.push("failed".to_string());
        }
        keys.join("&")
    }
}

fn session_cookie(jar: &CookieJar) -> Option<String> {
    jar.get(AUTH_COOKIE_NAME)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

fn path_and_query(uri: &Uri) -> &str {
    uri.path_and_query()
        .map(|value| value.as_str())
        .unwrap_or_else(|| uri.path())
}

async fn page_context(
    settings: &Settings,
    sessions: &SessionStore,
    session_id: Option<&str>,
    path: String,
) -> PageContext {
    let logged_in = match session_id {
        Some(id) => sessions.contains(id).await,
        None => false,
    };
    PageContext {
        path,
        logged_in,
        legal_notice_url: settings.legal_notice_url.clone(),
        privacy_url: settings.privacy_url.clone(),
    }
}

/// GET/HEAD 入口。
#[allow(clippy::too_many_arguments)]
pub async fn browse(
    Extension(settings): Extension<Arc<Settings>>,
    Extension(sessions): Extension<Arc<SessionStore>>,
    Extension(tokens): Extension<Arc<TokenStore>>,
    Extension(scheme): Extension<RequestScheme>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
    jar: CookieJar,
) -> Response {
    let query = QueryFlags::from_pairs(query);
    let raw_path = uri.path();
    let session_id = session_cookie(&jar);

    if query.has("logout") {
        let Some(session_id) = session_id else {
            return Redirect::to(&same_origin_path(raw_path)).into_response();
        };
        sessions.logout(&session_id).await;
        let jar = jar.remove(Cookie::build(AUTH_COOKIE_NAME).path("/").build());
        return (jar, Redirect::to(&same_origin_path(raw_path))).into_response();
    }

    let ctx = page_context(
        &settings,
        &sessions,
        session_id.as_deref(),
        decode_path(raw_path),
    )
    .await;

    let trimmed = raw_path.trim_start_matches('/');
    let Some((raw_share, raw_rest)) = trimmed.split_once('/') else {
        let unlocked = match session_id.as_deref() {
            Some(id) => sessions.logged_in_shares(id).await,
            None => Default::default(),
        };
        let shares: Vec<(String, bool)> = settings
            .shares
            .keys()
            .map(|name| (name.clone(), unlocked.contains(name)))
            .collect();
        return pages::overview(&ctx, &shares).into_response();
    };
    let share = decode_path(raw_share);
    let rest = format!("/{}", decode_path(raw_rest));

    let download = DownloadRequest {
        request_path: raw_path,
        method: &method,
        range: headers.get(header::RANGE),
    };

    if let Some(resolved) = tokens.resolve(&sessions, &share, &rest).await {
        info!(
            share = %resolved.grant.share,
            path = %resolved.grant.file_path,
            "share link download"
        );
        return serve_file(&resolved.handle, &resolved.grant.file_path, download)
            .await
            .unwrap_or_else(|err| err.into_page(&ctx));
    }

    if !settings.shares.contains_key(&share) {
        return GatewayError::ShareNotFound.into_page(&ctx);
    }

    let handle = match session_id.as_deref() {
        Some(id) => sessions.resolve(id, &share).await.ok(),
        None => None,
    };
    let (Some(session_id), Some(handle)) = (session_id, handle) else {
        let title = if query.has("failed") {
            "Login failed".to_string()
        } else {
            format!("Please login for {share}")
        };
        return pages::login(
            &ctx,
            &title,
            path_and_query(&uri),
            &settings.share_names(),
            &share,
        )
        .into_response();
    };

    let dir = rest.trim_end_matches('/');

    if query.has("share") && settings.allow_sharing {
        return match handle.list_entries(dir).await {
            Err(BackendError::NotADirectory) => {
                let token = tokens.issue(&session_id, &share, dir).await;
                let file_name = dir.rsplit('/').next().unwrap_or_default();
                let link = format!(
                    "{}/{}/{}",
                    external_base_url(&headers, scheme, settings.external_url.as_deref()),
                    token,
                    encode_segment(file_name)
                );
                pages::share_link(&ctx, &link).into_response()
            }
            Ok(_) => GatewayError::NotAFile.into_page(&ctx),
            Err(err) => GatewayError::from(err).into_page(&ctx),
        };
    }

    match handle.list_entries(dir).await {
        Ok(entries) => {
            if !raw_path.ends_with('/') {
                return Redirect::to(&format!("{}/", same_origin_path(raw_path))).into_response();
            }
            pages::directory(&ctx, entries).into_response()
        }
        Err(BackendError::NotADirectory) => serve_file(&handle, dir, download)
            .await
            .unwrap_or_else(|err| err.into_page(&ctx)),
        Err(err) => {
            warn!(share = %share, path = dir, error = %err, "listing failed");
            GatewayError::from(err).into_page(&ctx)
        }
    }
}

/// 登录表单提交。
#[allow(clippy::too_many_arguments)]
pub async fn login(
    Extension(settings): Extension<Arc<Settings>>,
    Extension(sessions): Extension<Arc<SessionStore>>,
    Extension(limiter): Extension<Arc<RateLimiter>>,
    Extension(scheme): Extension<RequestScheme>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let query = QueryFlags::from_pairs(query);
    let raw_path = uri.path();
    let session_id = session_cookie(&jar);
    let client_ip = resolve_client_ip(&headers, Some(addr.ip())).unwrap_or_else(|| addr.ip());

    let address_key = RateKey::Address(client_ip);
    let user_key = RateKey::User(form.user.clone());
    let by_address = limiter.check(&address_key).await;
    let by_user = limiter.check(&user_key).await;
    if by_address.is_blocked() || by_user.is_blocked() {
        let ctx = page_context(
            &settings,
            &sessions,
            session_id.as_deref(),
            decode_path(raw_path),
        )
        .await;
        return GatewayError::RateLimited.into_page(&ctx);
    }

    let failed = || {
        let location = format!("{}?{}", same_origin_path(raw_path), query.with_failed());
        Redirect::to(&location).into_response()
    };

    let Some(target) = settings.shares.get(&form.share) else {
        warn!(share = %form.share, "login for unknown share");
        return failed();
    };
    let credentials = Credentials {
        domain: settings.domain.clone(),
        username: form.user.clone(),
        password: form.password,
    };
    let auth = match sessions
        .authenticate(session_id.as_deref(), &form.share, target, &credentials)
        .await
    {
        Ok(auth) => auth,
        Err(err) => {
            info!(share = %form.share, user = %form.user, error = %err, "login failed");
            return failed();
        }
    };

    limiter.clear(&address_key).await;
    limiter.clear(&user_key).await;

    let share_prefix = format!("/{}/", form.share);
    let location = if decode_path(raw_path).starts_with(&share_prefix) {
        path_and_query(&uri).to_string()
    } else {
        format!("/{}/", encode_segment(&form.share))
    };

    if !auth.created {
        return Redirect::to(&location).into_response();
    }
    let cookie = Cookie::build((AUTH_COOKIE_NAME, auth.session_id))
        .path("/")
        .http_only(true)
        .secure(is_https_request(&headers, scheme))
        .same_site(SameSite::Lax)
        .build();
    (jar.add(cookie), Redirect::to(&location)).into_response()
}
