//! `GET /api/image-proxy` — the sole bridge between client code and the
//! blob store. Hides credentials, eliminates CORS ambiguity, and streams
//! the upstream body through rather than buffering it in memory.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use imageflow_core::error::PipelineError;
use serde::Deserialize;
use utoipa::{IntoParams, OpenApi};

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_image_proxy))]
pub struct ImageProxyApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/image-proxy", get(get_image_proxy))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ImageProxyQuery {
    key: Option<String>,
    url: Option<String>,
}

/// Fetch an object from the blob store by `key` or `url` and stream it
/// back with immutable cache headers.
#[utoipa::path(
    get,
    path = "/api/image-proxy",
    tag = "image-proxy",
    params(ImageProxyQuery),
    responses(
        (status = 200, description = "Image bytes"),
        (status = 400, description = "Neither key nor url provided"),
        (status = 403, description = "url outside the configured storage base"),
    )
)]
pub async fn get_image_proxy(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ImageProxyQuery>,
) -> Result<Response, PipelineError> {
    let base = state.config.s3_public_link.trim_end_matches('/');

    let resolved_url = match (query.key, query.url) {
        (Some(_), Some(_)) => {
            return Err(PipelineError::validation("exactly one of key or url must be provided"));
        }
        (Some(key), None) => format!("{base}/{key}"),
        (None, Some(url)) => {
            if !url.starts_with(base) {
                return Err(PipelineError::UnauthorizedSource(url));
            }
            url
        }
        (None, None) => {
            return Err(PipelineError::validation("exactly one of key or url must be provided"));
        }
    };

    let upstream = reqwest::get(&resolved_url)
        .await
        .map_err(|e| PipelineError::Transport(e.to_string()))?;

    let status = upstream.status();
    let content_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .cloned();

    if !status.is_success() {
        let body = upstream.text().await.unwrap_or_default();
        return Ok((
            StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
            body,
        )
            .into_response());
    }

    let stream = upstream.bytes_stream();
    let mut response = Response::new(Body::from_stream(stream));
    if let Some(ct) = content_type {
        response.headers_mut().insert(axum::http::header::CONTENT_TYPE, ct);
    }
    response.headers_mut().insert(
        axum::http::header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );
    response.headers_mut().insert(
        axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );

    Ok(response)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn url_outside_base_is_rejected() {
        let base = "https://cdn.example.test";
        let url = "https://evil.example.test/secret";
        assert!(!url.starts_with(base));
    }
}
