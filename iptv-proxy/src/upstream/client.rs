use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use tracing::{debug, trace};

use super::{Origin, OriginResponse, UpstreamError};

const USER_AGENT: &str = concat!("iptv-proxy/", env!("CARGO_PKG_VERSION"));

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Safe to ignore: can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the shared origin client.
///
/// `request_timeout` bounds the whole request, body included.
pub fn build_client(request_timeout: Duration) -> crate::Result<reqwest::Client> {
    install_rustls_provider();

    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(request_timeout)
        .connect_timeout(request_timeout)
        .tcp_nodelay(true)
        .build()
        .map_err(|e| crate::Error::Other(format!("Failed to build HTTP client: {e}")))
}

/// [`Origin`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpOrigin {
    client: reqwest::Client,
}

impl HttpOrigin {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Origin for HttpOrigin {
    async fn fetch(
        &self,
        url: &str,
        validator: Option<&str>,
    ) -> Result<OriginResponse, UpstreamError> {
        let mut request = self.client.get(url);
        if let Some(validator) = validator.filter(|v| !v.is_empty()) {
            request = request.header(IF_NONE_MATCH, validator);
        }

        let response = request.send().await?;
        let status = response.status();
        trace!(%url, %status, conditional = validator.is_some(), "Origin responded");

        match status {
            StatusCode::NOT_MODIFIED => Ok(OriginResponse::NotModified),
            StatusCode::OK => {
                let validator = response
                    .headers()
                    .get(ETAG)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let body = response.bytes().await?;
                Ok(OriginResponse::Modified { validator, body })
            }
            status => Err(UpstreamError::status(status, url)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, HeaderValue};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use tokio::net::TcpListener;

    async fn conditional(headers: HeaderMap) -> Response {
        if headers.get(IF_NONE_MATCH).and_then(|v| v.to_str().ok()) == Some("\"v1\"") {
            return StatusCode::NOT_MODIFIED.into_response();
        }
        let mut response = "body".into_response();
        response
            .headers_mut()
            .insert(ETAG, HeaderValue::from_static("\"v1\""));
        response
    }

    async fn spawn_upstream() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/feed", get(conditional))
            .route("/plain", get(|| async { "no validator" }))
            .route(
                "/broken",
                get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
            );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn origin() -> HttpOrigin {
        HttpOrigin::new(build_client(Duration::from_secs(5)).unwrap())
    }

    #[tokio::test]
    async fn test_fetch_returns_body_and_validator() {
        let base = spawn_upstream().await;

        let response = origin().fetch(&format!("{base}/feed"), None).await.unwrap();

        assert_eq!(
            response,
            OriginResponse::Modified {
                validator: "\"v1\"".to_string(),
                body: bytes::Bytes::from_static(b"body"),
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_sends_validator() {
        let base = spawn_upstream().await;
        let origin = origin();

        let matching = origin
            .fetch(&format!("{base}/feed"), Some("\"v1\""))
            .await
            .unwrap();
        assert_eq!(matching, OriginResponse::NotModified);

        // An empty validator is never sent.
        let empty = origin.fetch(&format!("{base}/feed"), Some("")).await.unwrap();
        assert!(matches!(empty, OriginResponse::Modified { .. }));
    }

    #[tokio::test]
    async fn test_missing_etag_is_empty_validator() {
        let base = spawn_upstream().await;

        let response = origin().fetch(&format!("{base}/plain"), None).await.unwrap();

        match response {
            OriginResponse::Modified { validator, body } => {
                assert!(validator.is_empty());
                assert_eq!(&body[..], b"no validator");
            }
            OriginResponse::NotModified => panic!("expected a body"),
        }
    }

    #[tokio::test]
    async fn test_unexpected_status_is_an_error() {
        let base = spawn_upstream().await;

        let err = origin()
            .fetch(&format!("{base}/broken"), None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            UpstreamError::UnexpectedStatus { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_a_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let origin = HttpOrigin::new(build_client(Duration::from_millis(200)).unwrap());
        let err = origin
            .fetch(&format!("http://{addr}/slow"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, UpstreamError::Network { .. }));
    }
}
