//! Feed routes: the filtered playlist and guide.

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tracing::warn;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::proxy::{Feed, FeedResponse};

pub const PLAYLIST_PATH: &str = "/lebanon.m3u";
pub const GUIDE_PATH: &str = "/epg.xml";

/// Create the feeds router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(PLAYLIST_PATH, get(playlist))
        .route(GUIDE_PATH, get(guide))
}

async fn playlist(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let response = state
        .playlist
        .serve(if_none_match(&headers))
        .await
        .map_err(|e| unavailable(Feed::Playlist, e))?;
    Ok(render(Feed::Playlist, response))
}

async fn guide(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let response = state
        .guide
        .serve(if_none_match(&headers))
        .await
        .map_err(|e| unavailable(Feed::Guide, e))?;
    Ok(render(Feed::Guide, response))
}

/// The raw `If-None-Match` value; non-ASCII values never match anything.
fn if_none_match(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
}

fn unavailable(feed: Feed, err: crate::Error) -> ApiError {
    warn!(%feed, error = %err, "Failed to refresh feed");
    ApiError::bad_gateway(feed.unavailable_message())
}

fn render(feed: Feed, response: FeedResponse) -> Response {
    match response {
        FeedResponse::NotModified => StatusCode::NOT_MODIFIED.into_response(),
        FeedResponse::Ok(artifact) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, feed.content_type()),
                (header::ETAG, artifact.validator()),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            artifact.body().clone(),
        )
            .into_response(),
    }
}
