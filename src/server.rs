use std::{fs::Metadata, net::SocketAddr, path::Path, sync::Arc};

use axum::{
    Json, Router,
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use sha2::{Digest, Sha256};
use tokio::fs;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{Level, Span, debug, error, info_span, warn};

use crate::{
    config::AppConfig,
    error::ShareError,
    listing::DirectoryListing,
    path_guard::{locate, resolve_request_path},
    policy::EntryKind,
};

/// Served from the assets directory, never from the share root.
pub const FAVICON_PATH: &str = "/~favicon.ico";

const FAVICON_FILE: &str = "sharedir.ico";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(FAVICON_PATH, get(favicon).fallback(method_not_allowed))
        .fallback(get(share).fallback(method_not_allowed))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

fn request_span(request: &Request) -> Span {
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string());
    info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        remote = %remote,
    )
}

async fn method_not_allowed(method: Method, uri: Uri) -> Response {
    reject(uri.path(), ShareError::MethodNotAllowed(method))
}

async fn favicon(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let result = match &state.config.assets_dir {
        Some(dir) => serve_asset(&dir.join(FAVICON_FILE), &headers).await,
        None => Err(ShareError::NotFound(
            "no assets directory configured".to_string(),
        )),
    };
    result.unwrap_or_else(|err| reject(FAVICON_PATH, err))
}

async fn share(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> Response {
    serve_request(&state.config, uri.path(), &headers)
        .await
        .unwrap_or_else(|err| reject(uri.path(), err))
}

fn reject(path: &str, err: ShareError) -> Response {
    if err.is_internal() {
        error!("{path}: {err}");
    } else {
        warn!("{path}: {err}");
    }
    err.into_response()
}

/// Resolve, contain, stat, authorize, then hand the entry to the file or listing responder.
async fn serve_request(
    config: &AppConfig,
    raw_path: &str,
    headers: &HeaderMap,
) -> Result<Response, ShareError> {
    if raw_path.len() > config.max_path_length {
        return Err(ShareError::PathTooLong {
            len: raw_path.len(),
            limit: config.max_path_length,
        });
    }

    let requested = resolve_request_path(&config.root, raw_path)?;
    let located = locate(&config.root, &requested).await?;
    config.policy().authorize(located.kind, &located.path)?;

    match located.kind {
        EntryKind::File => {
            file_response(
                located.path.absolute(),
                requested.relative(),
                &located.metadata,
                headers,
                config.max_file_size_bytes,
            )
            .await
        }
        EntryKind::Directory => {
            directory_response(located.path.absolute(), requested.relative(), headers).await
        }
    }
}

async fn serve_asset(path: &Path, headers: &HeaderMap) -> Result<Response, ShareError> {
    let metadata = fs::metadata(path)
        .await
        .map_err(|err| ShareError::NotFound(format!("{FAVICON_FILE}: {err}")))?;
    if !metadata.is_file() {
        return Err(ShareError::NotFound(format!(
            "{FAVICON_FILE} is not a file"
        )));
    }
    file_response(path, FAVICON_FILE, &metadata, headers, None).await
}

/// `name` is what the client asked for; the media type is guessed from it.
async fn file_response(
    path: &Path,
    name: &str,
    metadata: &Metadata,
    headers: &HeaderMap,
    max_size: Option<u64>,
) -> Result<Response, ShareError> {
    if let Some(limit) = max_size
        && metadata.len() > limit
    {
        return Err(ShareError::FileTooLarge {
            size: metadata.len(),
            limit,
        });
    }

    let bytes = fs::read(path)
        .await
        .map_err(|err| ShareError::Internal(format!("read {name}: {err}")))?;

    let etag = format!("\"{}\"", hex::encode(Sha256::digest(&bytes)));
    if headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|client| etag_matches(client, &etag))
    {
        return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
    }

    let content_type = mime_guess::from_path(name).first_or_octet_stream();
    let mut builder = http::Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type.as_ref())
        .header(header::ETAG, etag.as_str());
    if let Ok(modified) = metadata.modified() {
        builder = builder.header(header::LAST_MODIFIED, httpdate::fmt_http_date(modified));
    }

    let size = bytes.len();
    let response = builder
        .body(Body::from(bytes))
        .map_err(|err| ShareError::Internal(format!("build response for {name}: {err}")))?;
    debug!("served {size} bytes as {content_type}");

    Ok(response)
}

async fn directory_response(
    dir: &Path,
    relative: &str,
    headers: &HeaderMap,
) -> Result<Response, ShareError> {
    let listing = DirectoryListing::read(dir, relative).await?;
    debug!("listed {} entries", listing.entries.len());

    if wants_json(headers) {
        return Ok(Json(listing).into_response());
    }
    Ok(Html(listing.render_html()).into_response())
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"))
}

/// Weak comparison: a `W/` prefix on either side is ignored.
fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    let etag = etag.strip_prefix("W/").unwrap_or(etag);
    if_none_match
        .split(',')
        .map(str::trim)
        .any(|candidate| {
            candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
        })
}
