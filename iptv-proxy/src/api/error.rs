//! API error handling.

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// HTTP-facing error, rendered as a plain-text body.
///
/// The message is sent to clients verbatim, so it must never carry origin
/// details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Create a 502 Bad Gateway error.
    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.message,
        )
            .into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn test_bad_gateway_response() {
        let response = ApiError::bad_gateway("Upstream M3U unavailable").into_response();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Upstream M3U unavailable");
    }

    #[test]
    fn test_display() {
        let err = ApiError::bad_gateway("Upstream EPG unavailable");
        assert_eq!(err.to_string(), "502 Bad Gateway: Upstream EPG unavailable");
    }
}
