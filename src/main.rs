//! AxoUpload server binary.
//!
//! A small upload backend: liveness and health endpoints plus a multipart
//! batch upload handler that stores files on local disk, logs the declared
//! directory tree of each batch, and optionally notifies a webhook.

mod atomic;
mod background;
mod config;
mod error;
mod health;
mod http;
mod logging;
mod notify;
mod storage;
mod tree;
mod upload;

use axum::extract::{DefaultBodyLimit, Extension};
use axum::http::Request;
use axum::routing::{get, post};
use axum::{Router, middleware};
use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span};

use crate::background::spawn_background_tasks;
use crate::config::{Args, SHUTDOWN_GRACE_SECS};
use crate::health::StartedAt;
use crate::http::{build_cors_layer, client_ip};
use crate::notify::Notifier;
use crate::storage::Storage;
use crate::upload::UploadConfig;

shadow!(build);

/// Shared handles injected into every request.
#[derive(Clone)]
struct AppState {
    storage: Arc<Storage>,
    upload: Arc<UploadConfig>,
    notifier: Arc<Notifier>,
    started: StartedAt,
    max_body: u64,
    cors_origins: Option<String>,
}

/// Starts the AxoUpload server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();
    let started = StartedAt(Instant::now());

    let args = Args::parse();
    let storage = Arc::new(Storage::new(PathBuf::from(&args.storage_dir)));
    storage.ensure_root().await?;
    info!("📁 Storage root ready at {}", storage.root_path().display());

    let upload_config = Arc::new(UploadConfig {
        max_files: args.upload_max_files,
        temp_ttl: Duration::from_secs(args.upload_temp_ttl_secs),
    });
    let notifier = Arc::new(Notifier::new(
        args.notify_url.clone(),
        Duration::from_secs(args.notify_timeout_secs),
    )?);
    if notifier.is_enabled() {
        info!("upload webhook notifications enabled");
    }

    let state = AppState {
        storage: storage.clone(),
        upload: upload_config.clone(),
        notifier,
        started,
        max_body: args.upload_max_body,
        cors_origins: args.cors_origins.clone(),
    };
    let app = build_router(state);

    let bind = args
        .bind
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let http_addr = SocketAddr::new(bind, args.port);
    let handle = Handle::new();

    info!("✅ Server is running at http://{}", http_addr);

    let http_server = axum_server::bind(http_addr)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

    spawn_background_tasks(storage, upload_config);
    tokio::select! {
        result = http_server => result?,
        _ = shutdown_signal(handle) => {}
    }

    Ok(())
}

fn build_router(state: AppState) -> Router {
    let body_limit = match usize::try_from(state.max_body) {
        Ok(0) => DefaultBodyLimit::disable(),
        Ok(limit) => DefaultBodyLimit::max(limit),
        Err(_) => DefaultBodyLimit::disable(),
    };

    Router::new()
        .route("/", get(health::root))
        .route("/ping", get(health::ping))
        .route("/health", get(health::health))
        .route("/upload", post(upload::upload_files).layer(body_limit))
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip = client_ip(request),
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(build_cors_layer(state.cors_origins.as_deref()))
        .layer(Extension(state.storage))
        .layer(Extension(state.upload))
        .layer(Extension(state.notifier))
        .layer(Extension(state.started))
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(SHUTDOWN_GRACE_SECS)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{StatusCode, header};
    use serde_json::Value;
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::config::DEFAULT_UPLOAD_MAX_FILES;

    fn make_state(root: PathBuf, max_body: u64) -> AppState {
        AppState {
            storage: Arc::new(Storage::new(root)),
            upload: Arc::new(UploadConfig {
                max_files: DEFAULT_UPLOAD_MAX_FILES,
                temp_ttl: Duration::ZERO,
            }),
            notifier: Arc::new(Notifier::disabled()),
            started: StartedAt(Instant::now()),
            max_body,
            cors_origins: None,
        }
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn root_and_ping_are_routed() {
        let temp = tempdir().expect("tempdir");
        let app = build_router(make_state(temp.path().to_path_buf(), 0));

        let response = app
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).expect("request"))
            .await
            .expect("call root");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::X_CONTENT_TYPE_OPTIONS),
            Some(&header::HeaderValue::from_static("nosniff"))
        );

        let response = app
            .oneshot(Request::get("/ping").body(Body::empty()).expect("request"))
            .await
            .expect("call ping");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["message"], "pong");
    }

    #[tokio::test]
    async fn health_is_routed() {
        let temp = tempdir().expect("tempdir");
        let app = build_router(make_state(temp.path().to_path_buf(), 0));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("call health");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "✅ healthy");
        assert!(body.get("runtimeVersion").is_some());
    }

    #[tokio::test]
    async fn oversized_upload_body_is_rejected_as_json() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("uploads");
        std::fs::create_dir_all(&root).expect("create root");
        let app = build_router(make_state(root.clone(), 64));

        let boundary = "limit-boundary";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"big.bin\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend(std::iter::repeat_n(b'x', 4096));
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let request = Request::post("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .expect("request");
        let response = app.oneshot(request).await.expect("call upload");
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json_body(response).await["success"], false);
        assert_eq!(std::fs::read_dir(&root).expect("read root").count(), 0);
    }
}
