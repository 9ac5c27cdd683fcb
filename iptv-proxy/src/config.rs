//! Validated runtime configuration.

use std::time::Duration;

use feed_filter::ChannelTarget;
use regex::Regex;
use url::Url;

use crate::cli::ServeArgs;
use crate::{Error, Result};

/// Everything the feed proxies need, checked once at startup.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub playlist_url: Url,
    pub guide_url: Url,
    pub channel_pattern: Regex,
    pub target: ChannelTarget,
    pub guide_refresh: Duration,
    pub request_timeout: Duration,
}

impl ProxyConfig {
    pub fn from_args(args: &ServeArgs) -> Result<Self> {
        let channel_pattern = Regex::new(&args.channel_regex)
            .map_err(|e| Error::config(format!("Invalid channel regex: {e}")))?;

        if args.tvg_id.trim().is_empty() {
            return Err(Error::config("Channel id must not be empty"));
        }

        let request_timeout = Duration::try_from_secs_f64(args.request_timeout_seconds)
            .ok()
            .filter(|timeout| !timeout.is_zero())
            .ok_or_else(|| {
                Error::config(format!(
                    "Request timeout must be a positive number of seconds, got {}",
                    args.request_timeout_seconds
                ))
            })?;

        Ok(Self {
            playlist_url: parse_origin_url("M3U", &args.m3u_url)?,
            guide_url: parse_origin_url("EPG", &args.epg_url)?,
            channel_pattern,
            target: ChannelTarget::new(args.tvg_id.as_str(), args.tvg_name.as_str()),
            guide_refresh: Duration::from_secs(args.epg_refresh_seconds),
            request_timeout,
        })
    }
}

fn parse_origin_url(feed: &str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| Error::config(format!("Invalid {feed} URL {raw:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(Error::config(format!(
            "Unsupported {feed} URL scheme {scheme:?}, expected http or https"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn args() -> ServeArgs {
        ServeArgs {
            m3u_url: "https://origin.example/lb.m3u".to_string(),
            epg_url: "http://origin.example/epg.xml".to_string(),
            channel_regex: crate::cli::DEFAULT_CHANNEL_REGEX.to_string(),
            tvg_id: "mtvlebanon.lb".to_string(),
            tvg_name: "MTV Lebanon".to_string(),
            epg_refresh_seconds: 3600,
            request_timeout_seconds: 15.0,
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            log_dir: None,
        }
    }

    #[test]
    fn test_valid_config() {
        let config = ProxyConfig::from_args(&args()).unwrap();

        assert_eq!(config.playlist_url.as_str(), "https://origin.example/lb.m3u");
        assert_eq!(config.guide_refresh, Duration::from_secs(3600));
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.target.id, "mtvlebanon.lb");
        assert!(config.channel_pattern.is_match("MTV Lebanon HD"));
    }

    #[test]
    fn test_fractional_timeout() {
        let mut args = args();
        args.request_timeout_seconds = 0.5;
        let config = ProxyConfig::from_args(&args).unwrap();
        assert_eq!(config.request_timeout, Duration::from_millis(500));
    }

    #[rstest]
    #[case::zero(0.0)]
    #[case::negative(-1.0)]
    #[case::nan(f64::NAN)]
    #[case::infinite(f64::INFINITY)]
    fn test_invalid_timeout(#[case] seconds: f64) {
        let mut args = args();
        args.request_timeout_seconds = seconds;
        assert!(matches!(
            ProxyConfig::from_args(&args),
            Err(Error::Configuration(_))
        ));
    }

    #[rstest]
    #[case::not_a_url("not a url")]
    #[case::ftp("ftp://origin.example/lb.m3u")]
    #[case::file("file:///tmp/lb.m3u")]
    fn test_invalid_playlist_url(#[case] url: &str) {
        let mut args = args();
        args.m3u_url = url.to_string();
        assert!(matches!(
            ProxyConfig::from_args(&args),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_invalid_regex_is_fatal() {
        let mut args = args();
        args.channel_regex = "(unclosed".to_string();
        let err = ProxyConfig::from_args(&args).unwrap_err();
        assert!(err.to_string().contains("Invalid channel regex"));
    }

    #[test]
    fn test_empty_channel_id() {
        let mut args = args();
        args.tvg_id = "  ".to_string();
        assert!(ProxyConfig::from_args(&args).is_err());
    }
}
