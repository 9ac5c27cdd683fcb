//! Command-line interface.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

pub const DEFAULT_M3U_URL: &str = "https://iptv-org.github.io/iptv/countries/lb.m3u";
pub const DEFAULT_EPG_URL: &str = "https://mdag9904.github.io/lebanon-epg/epg.xml";
pub const DEFAULT_CHANNEL_REGEX: &str = r"(?i)\bmtv\b.*\blebanon\b|mtv\s*lebanon|mtvlebanon";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub serve: ServeArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the proxy (default)
    Serve,
    /// Probe a running proxy's health endpoint; exits non-zero if it is unhealthy
    Healthcheck(HealthcheckArgs),
    /// Fetch both feeds from a running proxy and verify their content and ETag handling
    CheckEndpoints(CheckEndpointsArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    /// Upstream M3U playlist
    #[arg(long, env = "M3U_URL", default_value = DEFAULT_M3U_URL)]
    pub m3u_url: String,

    /// Upstream XMLTV guide
    #[arg(long, env = "EPG_URL", default_value = DEFAULT_EPG_URL)]
    pub epg_url: String,

    /// Regular expression selecting playlist entries
    #[arg(long, env = "MTV_REGEX", default_value = DEFAULT_CHANNEL_REGEX)]
    pub channel_regex: String,

    /// Channel identifier written into the outputs
    #[arg(long, env = "MTV_TVG_ID", default_value = "mtvlebanon.lb")]
    pub tvg_id: String,

    /// Channel display name written into the outputs
    #[arg(long, env = "MTV_TVG_NAME", default_value = "MTV Lebanon")]
    pub tvg_name: String,

    /// Seconds a cached guide is served without asking the origin
    #[arg(long, env = "EPG_REFRESH_SECONDS", default_value_t = 3600)]
    pub epg_refresh_seconds: u64,

    /// Timeout for each origin request, in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECONDS", default_value_t = 15.0)]
    pub request_timeout_seconds: f64,

    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Also write daily-rotated log files to this directory
    #[arg(long, env = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct HealthcheckArgs {
    /// Health endpoint to probe [default: http://127.0.0.1:<port>/health]
    #[arg(long)]
    pub url: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct CheckEndpointsArgs {
    /// Proxy to check [default: http://127.0.0.1:<port>]
    pub base_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::try_parse_from([
            "iptv-proxy",
            "--m3u-url",
            "http://origin/lb.m3u",
            "--port",
            "9000",
            "--request-timeout-seconds",
            "2.5",
        ])
        .unwrap();

        assert!(args.command.is_none());
        assert_eq!(args.serve.m3u_url, "http://origin/lb.m3u");
        assert_eq!(args.serve.port, 9000);
        assert_eq!(args.serve.request_timeout_seconds, 2.5);
    }

    #[test]
    fn test_healthcheck_subcommand() {
        let args =
            Args::try_parse_from(["iptv-proxy", "healthcheck", "--url", "http://x/health"])
                .unwrap();

        match args.command {
            Some(Command::Healthcheck(check)) => {
                assert_eq!(check.url.as_deref(), Some("http://x/health"))
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_check_endpoints_subcommand() {
        let args = Args::try_parse_from([
            "iptv-proxy",
            "--tvg-id",
            "lbci.lb",
            "check-endpoints",
            "http://proxy:8080",
        ])
        .unwrap();

        assert_eq!(args.serve.tvg_id, "lbci.lb");
        match args.command {
            Some(Command::CheckEndpoints(check)) => {
                assert_eq!(check.base_url.as_deref(), Some("http://proxy:8080"))
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        assert!(Args::try_parse_from(["iptv-proxy", "--port", "http"]).is_err());
    }
}
