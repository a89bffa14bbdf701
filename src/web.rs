//! HTTP transport. Every request lands in a single fallback handler which
//! converts it to a [`RawRequest`] and hands it to the backend pipeline; the
//! routing table itself lives in [`crate::router`].
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use miette::IntoDiagnostic;
use serde_json::{json, Value};
use tokio_util::io::ReaderStream;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::backend::Backend;
use crate::errors::{BackendError, Result};
use crate::request::{FileDownload, Payload, RawRequest};
use crate::settings::{Server, Settings};

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
struct AppState {
    backend: Arc<Backend>,
    trust_forwarded_for: bool,
}

async fn security_headers(request: Request<Body>, next: Next) -> impl IntoResponse {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );
    if !headers.contains_key(header::CACHE_CONTROL) {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    }

    response
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Build the HTTP router over `backend`.
pub fn router(backend: Arc<Backend>, server: &Server) -> Router {
    let state = AppState {
        backend,
        trust_forwarded_for: server.trust_forwarded_for,
    };
    Router::new()
        .fallback(dispatch)
        .layer(middleware::from_fn(security_headers))
        .layer(cors_layer(&server.cors_origins))
        .with_state(state)
}

pub async fn serve(settings: &Settings, backend: Arc<Backend>) -> miette::Result<()> {
    let app = router(backend.clone(), &settings.server);

    let addr: SocketAddr = settings.bind_addr().parse().into_diagnostic()?;
    tracing::info!(%addr, "Public API listening");

    let listener = tokio::net::TcpListener::bind(addr).await.into_diagnostic()?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(backend))
    .await
    .into_diagnostic()?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal(backend: Arc<Backend>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    backend.shutdown();
}

async fn dispatch(State(state): State<AppState>, request: Request<Body>) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    match handle(&state, request).await {
        Ok(response) => {
            tracing::debug!(%method, %path, status = %response.status(), "Request served");
            response
        }
        Err(e) => {
            tracing::debug!(%method, %path, code = e.code(), "Request failed: {}", e);
            e.into_response()
        }
    }
}

async fn handle(state: &AppState, request: Request<Body>) -> Result<Response> {
    let raw = into_raw_request(request, state.trust_forwarded_for).await?;
    let req = state.backend.execute(raw).await?;
    render(req.into_result()).await
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Client address. The first `X-Forwarded-For` hop is used only when
/// `trust_forwarded_for` is set, otherwise the peer address.
fn client_origin(request: &Request<Body>, trust_forwarded_for: bool) -> Option<String> {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .filter(|_| trust_forwarded_for)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    forwarded.or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    })
}

async fn into_raw_request(request: Request<Body>, trust_forwarded_for: bool) -> Result<RawRequest> {
    let query = Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .map(|Query(query)| query)
        .unwrap_or_default();
    let jwt = bearer_token(request.headers());
    let origin = client_origin(&request, trust_forwarded_for);
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let bytes = axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|_| BackendError::InvalidBody)?;
    let body = if bytes.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).map_err(|_| BackendError::InvalidBody)?
    };

    Ok(RawRequest {
        method,
        path,
        query,
        jwt,
        origin,
        body,
    })
}

async fn render(result: Option<Payload>) -> Result<Response> {
    match result {
        None => Ok(Json(json!({ "result": Value::Null })).into_response()),
        Some(Payload::Json(value)) => Ok(Json(json!({ "result": value })).into_response()),
        Some(Payload::File(file)) => file_response(file).await,
    }
}

async fn file_response(file: FileDownload) -> Result<Response> {
    let handle = tokio::fs::File::open(&file.path)
        .await
        .map_err(|_| BackendError::FileNotFound(file.filename.clone()))?;
    let disposition = format!("attachment; filename=\"{}\"", file.filename);

    Ok((
        [
            (header::CONTENT_TYPE, file.content_type),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, file.length.to_string()),
        ],
        Body::from_stream(ReaderStream::new(handle)),
    )
        .into_response())
}
