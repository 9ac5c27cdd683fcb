//! Health check route.

use axum::{Json, Router, routing::get};
use serde::Serialize;

use crate::api::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Liveness only: never touches the origin or the caches.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_body() {
        let Json(response) = health_check().await;
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"status":"ok"}"#
        );
    }
}
