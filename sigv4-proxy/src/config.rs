//! Command line and environment configuration.
//!
//! Every setting can be given as a flag or through its environment variable.
//! [`Args`] is the raw form parsed by clap, [`Config`] is the validated form
//! the proxy runs with.

use std::fmt::{self, Debug};
use std::str::FromStr;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Uri};
use sigv4_proxy_aws_v4::SigningAlgorithm;
use sigv4_proxy_core::{Error, Result};

/// MCP stdio proxy that signs every request with AWS SigV4
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "sigv4-proxy", about, version)]
pub struct Args {
    /// URL of the target MCP server
    #[arg(long, env = "MCP_TARGET_URL")]
    pub target_url: Option<String>,

    /// AWS region used in the credential scope
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// AWS service name used in the credential scope, e.g. `execute-api`
    #[arg(long = "service-name", env = "AWS_SERVICE_NAME")]
    pub service_name: Option<String>,

    /// Signature version, `v4` or `v4a`
    #[arg(long, env = "AWS_SIG_VERSION", default_value = "v4")]
    pub sig_version: String,

    /// AWS profile to read from the shared credential files
    #[arg(long, env = "AWS_PROFILE", default_value = "default")]
    pub profile: String,

    /// Request timeout, 0 disables it
    #[arg(long, env = "MCP_TIMEOUT", value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Accept `text/event-stream` responses as readily as plain JSON
    #[arg(
        long,
        env = "MCP_ENABLE_SSE",
        value_parser = BoolishValueParser::new(),
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true"
    )]
    pub enable_sse: bool,

    /// Extra headers added to every request, as `key=value,key2=value2`
    #[arg(long, env = "MCP_HEADERS", default_value = "")]
    pub headers: String,
}

/// Validated proxy configuration.
#[derive(Clone)]
pub struct Config {
    /// URL every message is POSTed to.
    pub target_url: Uri,
    /// AWS region for signing.
    pub region: String,
    /// AWS service name for signing.
    pub service_name: String,
    /// Signing algorithm.
    pub algorithm: SigningAlgorithm,
    /// Profile name for the shared credential files.
    pub profile: String,
    /// Timeout of a single request, if any.
    pub timeout: Option<Duration>,
    /// Whether event streams are preferred as much as plain JSON.
    pub enable_sse: bool,
    /// Extra headers added to every request.
    pub headers: HeaderMap,
}

impl Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("target_url", &self.target_url)
            .field("region", &self.region)
            .field("service_name", &self.service_name)
            .field("algorithm", &self.algorithm)
            .field("profile", &self.profile)
            .field("timeout", &self.timeout)
            .field("enable_sse", &self.enable_sse)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Args {
    /// Validate the arguments and build a [`Config`].
    ///
    /// All problems are reported at once in a single `ConfigInvalid` error,
    /// one per line.
    pub fn into_config(self) -> Result<Config> {
        let mut errors = Vec::new();

        let target_url = match non_empty(self.target_url) {
            None => {
                errors.push("target URL is required (set --target-url or MCP_TARGET_URL)".to_string());
                None
            }
            Some(v) => match parse_target_url(&v) {
                Ok(uri) => Some(uri),
                Err(err) => {
                    errors.push(err);
                    None
                }
            },
        };

        let region = non_empty(self.region);
        if region.is_none() {
            errors.push("region is required (set --region or AWS_REGION)".to_string());
        }

        let service_name = non_empty(self.service_name);
        if service_name.is_none() {
            errors.push(
                "service name is required (set --service-name or AWS_SERVICE_NAME)".to_string(),
            );
        }

        let algorithm = match SigningAlgorithm::from_str(self.sig_version.trim()) {
            Ok(v) => Some(v),
            Err(_) => {
                errors.push(format!(
                    "signature version must be 'v4' or 'v4a' (got '{}')",
                    self.sig_version
                ));
                None
            }
        };

        let headers = match parse_headers(&self.headers) {
            Ok(v) => Some(v),
            Err(err) => {
                errors.push(err);
                None
            }
        };

        match (target_url, region, service_name, algorithm, headers) {
            (Some(target_url), Some(region), Some(service_name), Some(algorithm), Some(headers))
                if errors.is_empty() =>
            {
                let profile = match self.profile.trim() {
                    "" => "default".to_string(),
                    v => v.to_string(),
                };
                Ok(Config {
                    target_url,
                    region,
                    service_name,
                    algorithm,
                    profile,
                    timeout: self.timeout.filter(|v| *v > 0).map(Duration::from_secs),
                    enable_sse: self.enable_sse,
                    headers,
                })
            }
            _ => Err(Error::config_invalid(format!(
                "invalid configuration:\n  {}",
                errors.join("\n  ")
            ))),
        }
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_target_url(v: &str) -> std::result::Result<Uri, String> {
    let uri = Uri::from_str(v).map_err(|err| format!("target URL is invalid: {err}"))?;
    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        _ => return Err("target URL must use http or https scheme".to_string()),
    }
    if uri.host().unwrap_or_default().is_empty() {
        return Err("target URL must include a host".to_string());
    }
    Ok(uri)
}

/// Parse `key=value` pairs separated by `,`.
///
/// Pairs are split on the first `=`, so values may contain `=`. Empty
/// entries are ignored.
fn parse_headers(v: &str) -> std::result::Result<HeaderMap, String> {
    let mut headers = HeaderMap::new();
    let mut errors = Vec::new();

    for token in v.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let Some((key, value)) = token.split_once('=') else {
            errors.push(format!("malformed header '{token}' (expected key=value)"));
            continue;
        };

        let name = match HeaderName::from_bytes(key.trim().as_bytes()) {
            Ok(name) => name,
            Err(_) => {
                errors.push(format!("invalid header name '{}'", key.trim()));
                continue;
            }
        };
        match HeaderValue::from_str(value.trim()) {
            Ok(value) => {
                headers.insert(name, value);
            }
            Err(_) => errors.push(format!("invalid value for header '{name}'")),
        }
    }

    if errors.is_empty() {
        Ok(headers)
    } else {
        Err(errors.join("\n  "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sigv4_proxy_core::ErrorKind;
    use test_case::test_case;

    const ENVS: [&str; 8] = [
        "MCP_TARGET_URL",
        "AWS_REGION",
        "AWS_SERVICE_NAME",
        "AWS_SIG_VERSION",
        "AWS_PROFILE",
        "MCP_TIMEOUT",
        "MCP_ENABLE_SSE",
        "MCP_HEADERS",
    ];

    fn valid() -> Args {
        Args {
            target_url: Some("https://abc123.execute-api.us-east-1.amazonaws.com/prod/mcp".into()),
            region: Some("us-east-1".into()),
            service_name: Some("execute-api".into()),
            sig_version: "v4".into(),
            profile: "default".into(),
            timeout: None,
            enable_sse: false,
            headers: String::new(),
        }
    }

    /// Parse `argv` with only the given variables set in the environment.
    fn parse_with_env(argv: &[&str], envs: &[(&str, &str)]) -> Args {
        let vars: Vec<(&str, Option<&str>)> = ENVS
            .iter()
            .map(|k| (*k, envs.iter().find(|(ek, _)| ek == k).map(|(_, v)| *v)))
            .collect();
        temp_env::with_vars(vars, || {
            Args::try_parse_from(argv).expect("arguments must parse")
        })
    }

    #[test]
    fn test_into_config_valid() -> anyhow::Result<()> {
        let cfg = valid().into_config()?;
        assert_eq!(
            cfg.target_url.to_string(),
            "https://abc123.execute-api.us-east-1.amazonaws.com/prod/mcp"
        );
        assert_eq!(cfg.region, "us-east-1");
        assert_eq!(cfg.service_name, "execute-api");
        assert_eq!(cfg.algorithm, SigningAlgorithm::V4);
        assert_eq!(cfg.profile, "default");
        assert_eq!(cfg.timeout, None);
        assert!(!cfg.enable_sse);
        assert!(cfg.headers.is_empty());
        Ok(())
    }

    #[test_case(|a: &mut Args| a.target_url = None, "target URL is required (set --target-url or MCP_TARGET_URL)"; "missing target url")]
    #[test_case(|a: &mut Args| a.target_url = Some("  ".into()), "target URL is required"; "blank target url")]
    #[test_case(|a: &mut Args| a.target_url = Some("ftp://example.com".into()), "target URL must use http or https scheme"; "ftp scheme")]
    #[test_case(|a: &mut Args| a.target_url = Some("/prod/mcp".into()), "target URL must use http or https scheme"; "relative url")]
    #[test_case(|a: &mut Args| a.target_url = Some("https://exa mple.com".into()), "target URL is invalid"; "unparsable url")]
    #[test_case(|a: &mut Args| a.region = None, "region is required (set --region or AWS_REGION)"; "missing region")]
    #[test_case(|a: &mut Args| a.service_name = Some(String::new()), "service name is required (set --service-name or AWS_SERVICE_NAME)"; "missing service")]
    #[test_case(|a: &mut Args| a.sig_version = "v5".into(), "signature version must be 'v4' or 'v4a' (got 'v5')"; "unknown version")]
    #[test_case(|a: &mut Args| a.headers = "x-api-key".into(), "malformed header 'x-api-key' (expected key=value)"; "header without value")]
    #[test_case(|a: &mut Args| a.headers = "bad header=v".into(), "invalid header name 'bad header'"; "invalid header name")]
    fn test_into_config_invalid(modify: fn(&mut Args), expected: &str) {
        let mut args = valid();
        modify(&mut args);

        let err = args.into_config().expect_err("config must be invalid");
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
        assert!(
            err.to_string().contains(expected),
            "error {err} must contain {expected}"
        );
    }

    #[test]
    fn test_into_config_reports_all_errors() {
        let args = Args {
            target_url: None,
            region: None,
            service_name: None,
            sig_version: "v3".into(),
            ..valid()
        };

        let msg = args.into_config().expect_err("config must be invalid").to_string();
        assert!(msg.contains("target URL is required"));
        assert!(msg.contains("region is required"));
        assert!(msg.contains("service name is required"));
        assert!(msg.contains("signature version must be 'v4' or 'v4a'"));
    }

    #[test]
    fn test_into_config_optional_fields() -> anyhow::Result<()> {
        let cfg = Args {
            sig_version: "v4a".into(),
            profile: "  ".into(),
            timeout: Some(30),
            enable_sse: true,
            headers: "x-api-key=abc, x-tenant = acme ,,x-query=a=b".into(),
            ..valid()
        }
        .into_config()?;

        assert_eq!(cfg.algorithm, SigningAlgorithm::V4a);
        assert_eq!(cfg.profile, "default");
        assert_eq!(cfg.timeout, Some(Duration::from_secs(30)));
        assert!(cfg.enable_sse);
        assert_eq!(cfg.headers.len(), 3);
        assert_eq!(cfg.headers["x-api-key"], "abc");
        assert_eq!(cfg.headers["x-tenant"], "acme");
        assert_eq!(cfg.headers["x-query"], "a=b");

        let cfg = Args {
            timeout: Some(0),
            ..valid()
        }
        .into_config()?;
        assert_eq!(cfg.timeout, None);
        Ok(())
    }

    #[test]
    fn test_parse_from_env() -> anyhow::Result<()> {
        let args = parse_with_env(
            &["sigv4-proxy"],
            &[
                ("MCP_TARGET_URL", "http://localhost:8080/mcp"),
                ("AWS_REGION", "eu-west-1"),
                ("AWS_SERVICE_NAME", "lambda"),
                ("AWS_PROFILE", "work"),
                ("MCP_TIMEOUT", "10"),
                ("MCP_ENABLE_SSE", "true"),
                ("MCP_HEADERS", "x-api-key=abc"),
            ],
        );

        let cfg = args.into_config()?;
        assert_eq!(cfg.target_url.to_string(), "http://localhost:8080/mcp");
        assert_eq!(cfg.region, "eu-west-1");
        assert_eq!(cfg.service_name, "lambda");
        assert_eq!(cfg.algorithm, SigningAlgorithm::V4);
        assert_eq!(cfg.profile, "work");
        assert_eq!(cfg.timeout, Some(Duration::from_secs(10)));
        assert!(cfg.enable_sse);
        assert_eq!(cfg.headers["x-api-key"], "abc");
        Ok(())
    }

    #[test]
    fn test_parse_flags_override_env() -> anyhow::Result<()> {
        let args = parse_with_env(
            &[
                "sigv4-proxy",
                "--target-url",
                "https://example.com/mcp",
                "--region",
                "us-west-2",
                "--service-name",
                "execute-api",
                "--sig-version",
                "v4a",
                "--enable-sse",
            ],
            &[("AWS_REGION", "eu-west-1"), ("MCP_ENABLE_SSE", "false")],
        );

        let cfg = args.into_config()?;
        assert_eq!(cfg.region, "us-west-2");
        assert_eq!(cfg.algorithm, SigningAlgorithm::V4a);
        assert_eq!(cfg.profile, "default");
        assert!(cfg.enable_sse);
        Ok(())
    }

    #[test]
    fn test_parse_defaults() {
        let args = parse_with_env(&["sigv4-proxy"], &[]);
        assert_eq!(args.target_url, None);
        assert_eq!(args.sig_version, "v4");
        assert_eq!(args.profile, "default");
        assert_eq!(args.timeout, None);
        assert!(!args.enable_sse);
        assert_eq!(args.headers, "");
    }
}
