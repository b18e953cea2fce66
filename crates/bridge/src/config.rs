//! Command line / environment configuration.

use crate::error::{BridgeError, Result};
use crate::schema::ApiInfo;
use crate::session::SessionSettings;
use clap::{Parser, ValueEnum};
use reqwest::header::{HeaderName, HeaderValue};
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "mcp-openapi-bridge", version, about, long_about = None)]
pub struct Args {
    /// Upstream MCP endpoint (streamable HTTP), e.g. `http://127.0.0.1:3000/mcp`
    #[arg(long, env = "BRIDGE_UPSTREAM_URL")]
    pub upstream_url: Option<String>,

    /// Credential sent to the upstream
    #[arg(long, env = "BRIDGE_UPSTREAM_TOKEN", hide_env_values = true)]
    pub upstream_token: Option<String>,

    /// Header carrying the credential. `Authorization` sends `Bearer <token>`; any other
    /// header gets the raw token.
    #[arg(long, env = "BRIDGE_UPSTREAM_AUTH_HEADER", default_value = "authorization")]
    pub upstream_auth_header: String,

    /// Listen address
    #[arg(long, env = "BRIDGE_BIND", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    /// Timeout for connect + handshake + tool discovery
    #[arg(long, env = "BRIDGE_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub connect_timeout_secs: u64,

    /// Timeout for a single tool call
    #[arg(long, env = "BRIDGE_CALL_TIMEOUT_SECS", default_value_t = 60)]
    pub call_timeout_secs: u64,

    /// Bound on concurrent upstream tool calls (1 serializes them). Unbounded if unset.
    #[arg(long, env = "BRIDGE_MAX_IN_FLIGHT_CALLS")]
    pub max_in_flight_calls: Option<usize>,

    /// OpenAPI `info.title` (defaults to the upstream server name)
    #[arg(long, env = "BRIDGE_TITLE")]
    pub title: Option<String>,

    /// OpenAPI `info.version` (defaults to the upstream server version)
    #[arg(long, env = "BRIDGE_API_VERSION")]
    pub api_version: Option<String>,

    /// OpenAPI `info.description`
    #[arg(long, env = "BRIDGE_DESCRIPTION")]
    pub description: Option<String>,

    /// Log filter (`RUST_LOG` takes precedence)
    #[arg(long, env = "BRIDGE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "BRIDGE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamAuth {
    Bearer { token: String },
    Header { name: String, value: String },
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub url: Url,
    pub auth: Option<UpstreamAuth>,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub upstream: UpstreamConfig,
    pub bind: SocketAddr,
    pub session: SessionSettings,
    pub info: ApiInfo,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Validate parsed arguments.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Config` if the upstream URL is missing or invalid, a timeout or
    /// the in-flight bound is zero, or the credential header is malformed.
    pub fn from_args(args: Args) -> Result<Self> {
        let raw_url = args
            .upstream_url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                BridgeError::Config(
                    "upstream MCP endpoint is required (--upstream-url / BRIDGE_UPSTREAM_URL)"
                        .to_string(),
                )
            })?;
        let url = Url::parse(raw_url.trim())
            .map_err(|e| BridgeError::Config(format!("invalid upstream URL '{raw_url}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(BridgeError::Config(format!(
                "upstream URL must use http or https, got '{}'",
                url.scheme()
            )));
        }

        let auth = args
            .upstream_token
            .map(|token| upstream_auth(&args.upstream_auth_header, token))
            .transpose()?;

        if args.connect_timeout_secs == 0 || args.call_timeout_secs == 0 {
            return Err(BridgeError::Config(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        if args.max_in_flight_calls == Some(0) {
            return Err(BridgeError::Config(
                "--max-in-flight-calls must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            upstream: UpstreamConfig { url, auth },
            bind: args.bind,
            session: SessionSettings {
                connect_timeout: Duration::from_secs(args.connect_timeout_secs),
                call_timeout: Duration::from_secs(args.call_timeout_secs),
                max_in_flight_calls: args.max_in_flight_calls,
            },
            info: ApiInfo {
                title: args.title,
                version: args.api_version,
                description: args.description,
            },
            log_level: args.log_level,
            log_format: args.log_format,
        })
    }
}

fn upstream_auth(header: &str, token: String) -> Result<UpstreamAuth> {
    let name = HeaderName::from_bytes(header.trim().as_bytes())
        .map_err(|e| BridgeError::Config(format!("invalid auth header name '{header}': {e}")))?;

    let auth = if name == reqwest::header::AUTHORIZATION {
        UpstreamAuth::Bearer { token }
    } else {
        UpstreamAuth::Header {
            name: name.as_str().to_string(),
            value: token,
        }
    };

    let value = match &auth {
        UpstreamAuth::Bearer { token } => format!("Bearer {token}"),
        UpstreamAuth::Header { value, .. } => value.clone(),
    };
    HeaderValue::from_str(&value)
        .map_err(|_| BridgeError::Config("upstream token is not a valid header value".to_string()))?;

    Ok(auth)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Config> {
        let argv = std::iter::once("mcp-openapi-bridge").chain(args.iter().copied());
        let args = Args::try_parse_from(argv).expect("clap parse");
        Config::from_args(args)
    }

    #[test]
    fn defaults() {
        let cfg = parse(&["--upstream-url", "http://127.0.0.1:3000/mcp"]).expect("valid");
        assert_eq!(cfg.upstream.url.as_str(), "http://127.0.0.1:3000/mcp");
        assert!(cfg.upstream.auth.is_none());
        assert_eq!(cfg.bind, "127.0.0.1:8000".parse::<SocketAddr>().expect("addr"));
        assert_eq!(cfg.session.connect_timeout, Duration::from_secs(10));
        assert_eq!(cfg.session.call_timeout, Duration::from_secs(60));
        assert_eq!(cfg.session.max_in_flight_calls, None);
        assert_eq!(cfg.log_format, LogFormat::Text);
    }

    #[test]
    fn missing_upstream_is_fatal() {
        let err = parse(&[]).expect_err("missing upstream");
        assert!(matches!(err, BridgeError::Config(_)));

        let err = parse(&["--upstream-url", "  "]).expect_err("blank upstream");
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn invalid_upstream_is_fatal() {
        assert!(parse(&["--upstream-url", "not a url"]).is_err());
        assert!(parse(&["--upstream-url", "ftp://host/mcp"]).is_err());
    }

    #[test]
    fn token_defaults_to_bearer() {
        let cfg = parse(&[
            "--upstream-url",
            "https://mcp.example.com/mcp",
            "--upstream-token",
            "abc",
        ])
        .expect("valid");
        assert_eq!(
            cfg.upstream.auth,
            Some(UpstreamAuth::Bearer {
                token: "abc".to_string()
            })
        );
    }

    #[test]
    fn token_in_custom_header() {
        let cfg = parse(&[
            "--upstream-url",
            "https://mcp.example.com/mcp",
            "--upstream-token",
            "abc",
            "--upstream-auth-header",
            "X-Api-Key",
        ])
        .expect("valid");
        assert_eq!(
            cfg.upstream.auth,
            Some(UpstreamAuth::Header {
                name: "x-api-key".to_string(),
                value: "abc".to_string()
            })
        );

        assert!(
            parse(&[
                "--upstream-url",
                "https://mcp.example.com/mcp",
                "--upstream-token",
                "abc",
                "--upstream-auth-header",
                "bad header",
            ])
            .is_err()
        );
    }

    #[test]
    fn zero_limits_are_rejected() {
        let base = ["--upstream-url", "http://localhost/mcp"];
        assert!(parse(&[&base[..], &["--call-timeout-secs", "0"][..]].concat()).is_err());
        assert!(parse(&[&base[..], &["--max-in-flight-calls", "0"][..]].concat()).is_err());

        let cfg = parse(&[&base[..], &["--max-in-flight-calls", "1"][..]].concat()).expect("valid");
        assert_eq!(cfg.session.max_in_flight_calls, Some(1));
    }
}
