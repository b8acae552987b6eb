//! AxoShare gateway binary.
//!
//! Serves browser sessions in front of a stateful file backend: one backend
//! connection per (browser session, share), revocable share links for
//! single files, login rate limiting and streamed Range downloads. The main
//! entry point loads settings, builds the Axum router and starts the
//! HTTP and optional HTTPS listeners.

mod assets;
mod background;
mod backend;
mod config;
mod connection;
mod download;
mod error;
mod gateway;
mod http;
mod ids;
mod logging;
mod pages;
mod rate_limit;
mod session;
mod tls;
mod token;

use axum::extract::{Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::middleware;
use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info, info_span};

use crate::background::spawn_background_tasks;
use crate::backend::LocalConnector;
use crate::config::{Args, Settings};
use crate::http::{RequestScheme, resolve_client_ip};
use crate::rate_limit::RateLimiter;
use crate::session::SessionStore;
use crate::token::TokenStore;

shadow!(build);

/// Starts the gateway and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let settings = match Settings::load(&args.config) {
        Ok(settings) => Arc::new(settings),
        Err(err) => {
            error!(error = %err, "failed to load settings");
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                err.to_string(),
            ));
        }
    };
    info!(
        shares = settings.shares.len(),
        allow_sharing = settings.allow_sharing,
        "settings loaded"
    );

    let sessions = Arc::new(SessionStore::new(Arc::new(LocalConnector)));
    let tokens = Arc::new(TokenStore::new());
    let limiter = Arc::new(RateLimiter::new(
        settings.failed_requests,
        settings.block_window(),
    ));
    spawn_background_tasks(limiter.clone(), sessions.clone(), tokens.clone());

    let app = gateway::routes()
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip());
                    let client_ip = resolve_client_ip(request.headers(), connect_ip)
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(settings.clone()))
        .layer(Extension(sessions))
        .layer(Extension(tokens))
        .layer(Extension(limiter));

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let http_addr = SocketAddr::new(host, args.port.unwrap_or(settings.server_port));
    let handle = Handle::new();

    info!("🚀 Starting HTTP server at {}", http_addr);
    let http_app = app.clone().layer(Extension(RequestScheme::Http));
    let http_server = axum_server::bind(http_addr)
        .handle(handle.clone())
        .serve(http_app.into_make_service_with_connect_info::<SocketAddr>());

    match args.https_port {
        Some(https_port) => {
            let https_addr = SocketAddr::new(host, https_port);
            let tls_config = tls::build_rustls_config(&args, host).await?;
            info!("🔒 Starting HTTPS server at {}", https_addr);
            let https_app = app.layer(Extension(RequestScheme::Https));
            let https_server = axum_server::bind_rustls(https_addr, tls_config)
                .handle(handle.clone())
                .serve(https_app.into_make_service_with_connect_info::<SocketAddr>());
            tokio::select! {
                result = http_server => result?,
                result = https_server => result?,
                _ = shutdown_signal(handle) => {}
            }
        }
        None => {
            tokio::select! {
                result = http_server => result?,
                _ = shutdown_signal(handle) => {}
            }
        }
    }

    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal, shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
