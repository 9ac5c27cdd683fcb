//! Origin access.
//!
//! The feed proxies talk to the origin through the [`Origin`] trait so that
//! the conditional-fetch protocol can be driven by an in-memory origin in
//! tests. [`HttpOrigin`] is the production implementation.

mod client;

pub use client::{HttpOrigin, build_client, install_rustls_provider};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;

/// Errors raised while talking to the origin.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} for {url}")]
    UnexpectedStatus { status: StatusCode, url: String },
}

impl UpstreamError {
    pub fn status(status: StatusCode, url: impl Into<String>) -> Self {
        Self::UnexpectedStatus {
            status,
            url: url.into(),
        }
    }
}

/// Outcome of a successful origin request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginResponse {
    /// The origin answered `304 Not Modified` to our validator.
    NotModified,
    /// The origin answered `200 OK`.
    Modified {
        /// The response `ETag`, empty when the origin sent none.
        validator: String,
        body: Bytes,
    },
}

/// An upstream server that supports conditional GET.
#[async_trait]
pub trait Origin: Send + Sync {
    /// Fetch `url`, sending `validator` as `If-None-Match` when present.
    ///
    /// Any status other than 200 and 304 is an error.
    async fn fetch(
        &self,
        url: &str,
        validator: Option<&str>,
    ) -> Result<OriginResponse, UpstreamError>;
}
