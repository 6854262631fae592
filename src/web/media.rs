//! `/media?url=…`: serves uploaded images from the public storage prefix only.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use reqwest::Url;
use serde::Deserialize;
use tracing::{error, warn};

use crate::{
    config::MediaConfig,
    models::Bucket,
    web::{ApiError, AppState},
};

/// Applied to every proxied image so inline SVG cannot run scripts.
const MEDIA_CSP: &str = "script-src 'none'; frame-src 'none'; sandbox;";

#[derive(Deserialize)]
pub struct MediaQuery {
    pub url: String,
}

/// Accepts only `https://<allowed host>/storage/v1/object/public/<bucket>/<key>`
/// for one of the app's buckets.
pub fn allowed_media_url(raw: &str, config: &MediaConfig) -> Option<Url> {
    let url = Url::parse(raw).ok()?;
    if url.scheme() != "https" || url.port().is_some() {
        return None;
    }
    if !url.username().is_empty() || url.password().is_some() {
        return None;
    }
    if url.host_str()? != config.allowed_host {
        return None;
    }

    let rest = url.path().strip_prefix(MediaConfig::PUBLIC_PATH_PREFIX)?;
    let (bucket, key) = rest.split_once('/')?;
    if !Bucket::ALL.iter().any(|known| known.as_str() == bucket) {
        return None;
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == ".." || segment == ".")
    {
        return None;
    }
    Some(url)
}

fn is_svg(content_type: &str, url: &Url) -> bool {
    content_type
        .parse::<mime::Mime>()
        .map(|parsed| parsed.type_() == mime::IMAGE && parsed.subtype() == mime::SVG)
        .unwrap_or(false)
        || url.path().to_ascii_lowercase().ends_with(".svg")
}

/// Response headers for an image fetched from storage.
pub fn media_headers(
    content_type: &str,
    url: &Url,
    cache_ttl_secs: u64,
) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    let content_type_value = HeaderValue::from_str(content_type)
        .map_err(|_| ApiError::bad_gateway("invalid upstream content type"))?;
    headers.insert(header::CONTENT_TYPE, content_type_value);

    let cache_control = HeaderValue::from_str(&format!("public, max-age={cache_ttl_secs}"))
        .map_err(|_| ApiError::internal("invalid cache header"))?;
    headers.insert(header::CACHE_CONTROL, cache_control);
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(MEDIA_CSP),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );

    if is_svg(content_type, url) {
        let filename = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(sanitize_filename::sanitize)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "image.svg".to_string());
        let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
            .map_err(|_| ApiError::internal("invalid download header"))?;
        headers.insert(header::CONTENT_DISPOSITION, disposition);
    }

    Ok(headers)
}

/// Reads at most `limit` bytes of the upstream body.
async fn read_capped(
    mut upstream: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, ApiError> {
    let too_large = || ApiError::new(StatusCode::PAYLOAD_TOO_LARGE, "image is too large");
    if upstream
        .content_length()
        .is_some_and(|declared| declared > limit as u64)
    {
        return Err(too_large());
    }

    let mut body = Vec::new();
    while let Some(chunk) = upstream.chunk().await.map_err(|err| {
        error!(?err, "failed to read media body");
        ApiError::bad_gateway("failed to fetch image")
    })? {
        if body.len() + chunk.len() > limit {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

pub async fn media_proxy(
    State(state): State<AppState>,
    Query(params): Query<MediaQuery>,
) -> Result<Response, ApiError> {
    let config = state.media_config();
    let Some(url) = allowed_media_url(&params.url, config) else {
        warn!(url = %params.url, "refused media URL outside the allow-list");
        return Err(ApiError::bad_request("url is not allowed"));
    };

    let upstream = state
        .http_client()
        .get(url.clone())
        .send()
        .await
        .map_err(|err| {
            error!(?err, %url, "failed to fetch media");
            ApiError::bad_gateway("failed to fetch image")
        })?;

    let status = upstream.status();
    if !status.is_success() {
        warn!(status = status.as_u16(), %url, "storage returned an error for media");
        let code = if status == reqwest::StatusCode::NOT_FOUND {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::BAD_GATEWAY
        };
        return Err(ApiError::new(code, "image unavailable"));
    }

    let content_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if !content_type.starts_with("image/") {
        return Err(ApiError::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "upstream response is not an image",
        ));
    }

    let headers = media_headers(&content_type, &url, config.cache_ttl_secs)?;
    let bytes = read_capped(upstream, state.config().max_upload_bytes).await?;

    Ok((headers, bytes).into_response())
}
