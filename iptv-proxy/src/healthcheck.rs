//! Probes against a running proxy: the container health check and the
//! end-to-end endpoint check.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use tracing::debug;

use crate::upstream::install_rustls_provider;
use crate::{Error, Result};

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
pub const ENDPOINT_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Health endpoint of a proxy listening on `port` on this host.
pub fn default_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}/health")
}

/// Base URL of a proxy listening on `port` on this host.
pub fn default_base_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}")
}

fn probe_client(timeout: Duration) -> Result<reqwest::Client> {
    install_rustls_provider();
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Other(format!("Failed to build HTTP client: {e}")))
}

/// Succeeds when `url` answers 200 with a body that mentions `status`.
pub async fn run(url: &str) -> Result<()> {
    let client = probe_client(PROBE_TIMEOUT)?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::Other(format!("Health request to {url} failed: {e}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::Other(format!("Failed to read health response: {e}")))?;
    debug!(%status, %body, "Health response");

    if status != StatusCode::OK || !body.contains("status") {
        return Err(Error::Other(format!("Unhealthy: {status} {body}")));
    }
    Ok(())
}

/// Exercise both feed endpoints of the proxy at `base_url`.
///
/// Each feed must answer 200 with the expected markers for `channel_id` and an
/// `ETag`, and must answer 304 when that `ETag` is sent back.
pub async fn check_endpoints(base_url: &str, channel_id: &str) -> Result<()> {
    let client = probe_client(ENDPOINT_CHECK_TIMEOUT)?;
    let base = base_url.trim_end_matches('/');

    check_feed(
        &client,
        "M3U",
        &format!("{base}/lebanon.m3u"),
        &["#EXTM3U".to_string(), format!("tvg-id=\"{channel_id}\"")],
    )
    .await?;
    check_feed(
        &client,
        "EPG",
        &format!("{base}/epg.xml"),
        &[
            format!("<channel id=\"{channel_id}\""),
            format!("channel=\"{channel_id}\""),
        ],
    )
    .await
}

async fn check_feed(
    client: &reqwest::Client,
    label: &str,
    url: &str,
    markers: &[String],
) -> Result<()> {
    let failed = |what: String| Error::Other(format!("{label} {what}"));

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| failed(format!("request failed: {e}")))?;
    let status = response.status();
    if status != StatusCode::OK {
        return Err(failed(format!("request failed: {status}")));
    }
    let etag = response.headers().get(ETAG).cloned();
    let body = response
        .text()
        .await
        .map_err(|e| failed(format!("request failed: {e}")))?;

    if let Some(marker) = markers.iter().find(|marker| !body.contains(marker.as_str())) {
        return Err(failed(format!("response missing {marker}")));
    }
    let etag = etag.ok_or_else(|| failed("response missing ETag".to_string()))?;

    let cached = client
        .get(url)
        .header(IF_NONE_MATCH, etag)
        .send()
        .await
        .map_err(|e| failed(format!("ETag cache check failed: {e}")))?;
    if cached.status() != StatusCode::NOT_MODIFIED {
        return Err(failed(format!(
            "ETag cache check failed: {}",
            cached.status()
        )));
    }

    debug!(%url, "Endpoint check passed");
    Ok(())
}
